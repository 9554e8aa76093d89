//! M2AP PDU model
//!
//! A PDU is one of three outcome classes (initiating / successful /
//! unsuccessful), each carrying one procedure-specific message. Handlers
//! route on the (procedure code, outcome class) pair, so both are
//! recoverable from every variant.

use num_enum::TryFromPrimitive;
use std::fmt;

use crate::procedures::{
    ErrorIndication, M2SetupFailure, M2SetupRequest, M2SetupResponse, OverloadNotification, Reset,
    ResetAcknowledge, SchedulingInformation, SchedulingInformationResponse, ServiceCountingFailure,
    ServiceCountingResponse, ServiceCountingResultsReport, SessionStartFailure,
    SessionStartRequest, SessionStartResponse, SessionStopRequest, SessionStopResponse,
    SessionUpdateFailure, SessionUpdateRequest, SessionUpdateResponse,
};

/// M2AP elementary procedure codes (3GPP TS 36.443 §9.3.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum ProcedureCode {
    /// MBMS Session Start
    SessionStart = 0,
    /// MBMS Session Stop
    SessionStop = 1,
    /// MBMS Scheduling Information
    MbmsSchedulingInformation = 2,
    /// Error Indication
    ErrorIndication = 3,
    /// Reset
    Reset = 4,
    /// M2 Setup
    M2Setup = 5,
    /// eNB Configuration Update
    EnbConfigurationUpdate = 6,
    /// MCE Configuration Update
    MceConfigurationUpdate = 7,
    /// MBMS Session Update
    SessionUpdate = 8,
    /// MBMS Service Counting
    MbmsServiceCounting = 9,
    /// MBMS Service Counting Results Report
    MbmsServiceCountingResultsReport = 10,
    /// MBMS Overload Notification
    MbmsOverloadNotification = 11,
}

/// Outcome class of a PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum PduType {
    /// Initiating message
    InitiatingMessage = 0,
    /// Successful outcome
    SuccessfulOutcome = 1,
    /// Unsuccessful outcome
    UnsuccessfulOutcome = 2,
}

/// Initiating messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiatingMessage {
    /// MBMS Session Start Request
    SessionStartRequest(SessionStartRequest),
    /// MBMS Session Stop Request
    SessionStopRequest(SessionStopRequest),
    /// MBMS Session Update Request
    SessionUpdateRequest(SessionUpdateRequest),
    /// MBMS Scheduling Information
    SchedulingInformation(SchedulingInformation),
    /// Error Indication
    ErrorIndication(ErrorIndication),
    /// Reset
    Reset(Reset),
    /// M2 Setup Request
    M2SetupRequest(M2SetupRequest),
    /// MBMS Service Counting Results Report
    ServiceCountingResultsReport(ServiceCountingResultsReport),
    /// MBMS Overload Notification
    OverloadNotification(OverloadNotification),
}

impl InitiatingMessage {
    /// Procedure code of the carried message.
    pub fn procedure_code(&self) -> ProcedureCode {
        match self {
            InitiatingMessage::SessionStartRequest(_) => ProcedureCode::SessionStart,
            InitiatingMessage::SessionStopRequest(_) => ProcedureCode::SessionStop,
            InitiatingMessage::SessionUpdateRequest(_) => ProcedureCode::SessionUpdate,
            InitiatingMessage::SchedulingInformation(_) => {
                ProcedureCode::MbmsSchedulingInformation
            }
            InitiatingMessage::ErrorIndication(_) => ProcedureCode::ErrorIndication,
            InitiatingMessage::Reset(_) => ProcedureCode::Reset,
            InitiatingMessage::M2SetupRequest(_) => ProcedureCode::M2Setup,
            InitiatingMessage::ServiceCountingResultsReport(_) => {
                ProcedureCode::MbmsServiceCountingResultsReport
            }
            InitiatingMessage::OverloadNotification(_) => {
                ProcedureCode::MbmsOverloadNotification
            }
        }
    }
}

/// Successful outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessfulOutcome {
    /// MBMS Session Start Response
    SessionStartResponse(SessionStartResponse),
    /// MBMS Session Stop Response
    SessionStopResponse(SessionStopResponse),
    /// MBMS Session Update Response
    SessionUpdateResponse(SessionUpdateResponse),
    /// MBMS Scheduling Information Response
    SchedulingInformationResponse(SchedulingInformationResponse),
    /// Reset Acknowledge
    ResetAcknowledge(ResetAcknowledge),
    /// M2 Setup Response
    M2SetupResponse(M2SetupResponse),
    /// MBMS Service Counting Response
    ServiceCountingResponse(ServiceCountingResponse),
}

impl SuccessfulOutcome {
    /// Procedure code of the carried message.
    pub fn procedure_code(&self) -> ProcedureCode {
        match self {
            SuccessfulOutcome::SessionStartResponse(_) => ProcedureCode::SessionStart,
            SuccessfulOutcome::SessionStopResponse(_) => ProcedureCode::SessionStop,
            SuccessfulOutcome::SessionUpdateResponse(_) => ProcedureCode::SessionUpdate,
            SuccessfulOutcome::SchedulingInformationResponse(_) => {
                ProcedureCode::MbmsSchedulingInformation
            }
            SuccessfulOutcome::ResetAcknowledge(_) => ProcedureCode::Reset,
            SuccessfulOutcome::M2SetupResponse(_) => ProcedureCode::M2Setup,
            SuccessfulOutcome::ServiceCountingResponse(_) => {
                ProcedureCode::MbmsServiceCounting
            }
        }
    }
}

/// Unsuccessful outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsuccessfulOutcome {
    /// MBMS Session Start Failure
    SessionStartFailure(SessionStartFailure),
    /// MBMS Session Update Failure
    SessionUpdateFailure(SessionUpdateFailure),
    /// M2 Setup Failure
    M2SetupFailure(M2SetupFailure),
    /// MBMS Service Counting Failure
    ServiceCountingFailure(ServiceCountingFailure),
}

impl UnsuccessfulOutcome {
    /// Procedure code of the carried message.
    pub fn procedure_code(&self) -> ProcedureCode {
        match self {
            UnsuccessfulOutcome::SessionStartFailure(_) => ProcedureCode::SessionStart,
            UnsuccessfulOutcome::SessionUpdateFailure(_) => ProcedureCode::SessionUpdate,
            UnsuccessfulOutcome::M2SetupFailure(_) => ProcedureCode::M2Setup,
            UnsuccessfulOutcome::ServiceCountingFailure(_) => {
                ProcedureCode::MbmsServiceCounting
            }
        }
    }
}

/// An M2AP PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum M2apPdu {
    /// Initiating message
    Initiating(InitiatingMessage),
    /// Successful outcome
    Successful(SuccessfulOutcome),
    /// Unsuccessful outcome
    Unsuccessful(UnsuccessfulOutcome),
}

impl M2apPdu {
    /// Outcome class of this PDU.
    pub fn pdu_type(&self) -> PduType {
        match self {
            M2apPdu::Initiating(_) => PduType::InitiatingMessage,
            M2apPdu::Successful(_) => PduType::SuccessfulOutcome,
            M2apPdu::Unsuccessful(_) => PduType::UnsuccessfulOutcome,
        }
    }

    /// Procedure code of the carried message.
    pub fn procedure_code(&self) -> ProcedureCode {
        match self {
            M2apPdu::Initiating(m) => m.procedure_code(),
            M2apPdu::Successful(m) => m.procedure_code(),
            M2apPdu::Unsuccessful(m) => m.procedure_code(),
        }
    }
}

impl fmt::Display for M2apPdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.procedure_code(), self.pdu_type())
    }
}
