//! M2AP protocol support for the embms MCE
//!
//! M2AP (3GPP TS 36.443) is the application protocol between an MCE and
//! its eNBs, carried over SCTP. This crate provides the structured PDU
//! model, per-procedure message definitions with typed cause values, and
//! the wire codec. Consumers never touch wire bytes directly; they build
//! and match PDU values and hand them to [`codec::encode`] /
//! [`codec::decode`].

pub mod codec;
pub mod pdu;
pub mod procedures;

pub use codec::{decode, encode, M2apCodecError};
pub use pdu::{InitiatingMessage, M2apPdu, PduType, ProcedureCode, SuccessfulOutcome, UnsuccessfulOutcome};

/// SCTP payload protocol identifier for M2AP (IANA).
pub const M2AP_PPID: u32 = 43;

/// SCTP stream carrying per-eNB signalling (Setup, Reset, scheduling).
pub const ENB_SIGNALLING_STREAM: u16 = 0;

/// SCTP stream carrying MBMS service traffic (Session Start/Update/Stop).
pub const MBMS_SERVICE_STREAM: u16 = 1;

/// Largest assignable MCE-MBMS-M2AP-ID (24-bit space, top value reserved).
pub const MCE_MBMS_M2AP_ID_MAX: u32 = 0x00FF_FFFE;

/// Reserved invalid MCE-MBMS-M2AP-ID sentinel.
pub const INVALID_MCE_MBMS_M2AP_ID: u32 = 0x00FF_FFFF;

/// Reserved invalid eNB-MBMS-M2AP-ID sentinel.
pub const INVALID_ENB_MBMS_M2AP_ID: u16 = 0xFFFF;
