//! M2AP procedure definitions
//!
//! One module per elementary procedure, plus the information elements
//! shared between them (TMGI, cause values, QoS, transport-layer
//! addressing). The structs here are the in-memory form of the wire
//! messages; the codec in [`crate::codec`] maps them to bytes.

pub mod error_indication;
pub mod m2_setup;
pub mod reset;
pub mod scheduling_info;
pub mod service_counting;
pub mod session_start;
pub mod session_stop;
pub mod session_update;

pub use error_indication::ErrorIndication;
pub use m2_setup::{EnbMbmsConfigItem, M2SetupFailure, M2SetupRequest, M2SetupResponse};
pub use reset::{Reset, ResetAcknowledge, ResetItem, ResetType};
pub use scheduling_info::{MbsfnAreaConfig, SchedulingInformation, SchedulingInformationResponse};
pub use service_counting::{
    CountingResultItem, OverloadNotification, OverloadStatus, ServiceCountingFailure,
    ServiceCountingResponse, ServiceCountingResultsReport,
};
pub use session_start::{SessionStartFailure, SessionStartRequest, SessionStartResponse};
pub use session_stop::{SessionStopRequest, SessionStopResponse};
pub use session_update::{SessionUpdateFailure, SessionUpdateRequest, SessionUpdateResponse};

use num_enum::TryFromPrimitive;
use std::fmt;
use std::net::IpAddr;
use std::net::Ipv4Addr;

// ============================================================================
// Identities
// ============================================================================

/// Temporary Mobile Group Identity: PLMN plus a 3-byte MBMS service id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tmgi {
    /// PLMN identity, 3GPP encoded (3 bytes)
    pub plmn: [u8; 3],
    /// MBMS service id (3 bytes)
    pub service_id: [u8; 3],
}

impl Tmgi {
    /// Creates a TMGI from an encoded PLMN and a numeric service id
    /// (lower 24 bits used).
    pub fn new(plmn: [u8; 3], service_id: u32) -> Self {
        Self {
            plmn,
            service_id: [
                ((service_id >> 16) & 0xFF) as u8,
                ((service_id >> 8) & 0xFF) as u8,
                (service_id & 0xFF) as u8,
            ],
        }
    }

    /// Serializes to the 6-byte wire form (PLMN then service id).
    pub fn to_bytes(&self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[..3].copy_from_slice(&self.plmn);
        out[3..].copy_from_slice(&self.service_id);
        out
    }

    /// Parses the 6-byte wire form.
    pub fn from_bytes(bytes: &[u8; 6]) -> Self {
        let mut plmn = [0u8; 3];
        let mut service_id = [0u8; 3];
        plmn.copy_from_slice(&bytes[..3]);
        service_id.copy_from_slice(&bytes[3..]);
        Self { plmn, service_id }
    }

    /// Numeric value of the service id.
    pub fn service_id_u32(&self) -> u32 {
        (u32::from(self.service_id[0]) << 16)
            | (u32::from(self.service_id[1]) << 8)
            | u32::from(self.service_id[2])
    }
}

impl fmt::Display for Tmgi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tmgi({:02x}{:02x}{:02x}/{:06x})",
            self.plmn[0],
            self.plmn[1],
            self.plmn[2],
            self.service_id_u32()
        )
    }
}

/// Global eNB identity: PLMN plus the 20-bit macro eNB id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalEnbId {
    /// PLMN identity, 3GPP encoded (3 bytes)
    pub plmn: [u8; 3],
    /// Macro eNB id (20 bits)
    pub enb_id: u32,
}

impl fmt::Display for GlobalEnbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "enb({:02x}{:02x}{:02x}/{:#07x})",
            self.plmn[0], self.plmn[1], self.plmn[2], self.enb_id
        )
    }
}

// ============================================================================
// Bearer QoS and transport addressing
// ============================================================================

/// Guaranteed-bit-rate part of the MBMS bearer QoS (downlink only; MBMS
/// bearers have no uplink).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GbrQosInfo {
    /// Maximum downlink bit rate (bit/s)
    pub mbr_dl: u64,
    /// Guaranteed downlink bit rate (bit/s)
    pub gbr_dl: u64,
}

/// MBMS bearer level QoS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BearerQos {
    /// QoS class identifier
    pub qci: u8,
    /// ARP priority level (1-15)
    pub priority_level: u8,
    /// ARP pre-emption capability
    pub preemption_capability: bool,
    /// ARP pre-emption vulnerability
    pub preemption_vulnerability: bool,
    /// GBR information, present for GBR QCIs
    pub gbr: Option<GbrQosInfo>,
}

/// Downlink transport-layer information for the MBMS data stream: the IP
/// multicast group the eNB joins, the source address, and the common GTP
/// tunnel endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TnlInformation {
    /// IP multicast distribution address
    pub ip_mc_address: IpAddr,
    /// IP source address for source-specific multicast
    pub ip_source_address: IpAddr,
    /// Downlink GTP tunnel endpoint identifier
    pub gtp_dl_teid: u32,
}

impl TnlInformation {
    /// A placeholder value for tests and defaults.
    pub fn unspecified() -> Self {
        Self {
            ip_mc_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ip_source_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            gtp_dl_teid: 0,
        }
    }
}

// ============================================================================
// Cause values
// ============================================================================

/// Radio network layer causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum RadioNetworkCause {
    /// Unspecified radio network failure
    Unspecified = 0,
    /// The MCE-MBMS-M2AP-ID is unknown or already allocated
    UnknownMceMbmsM2apId = 1,
    /// The eNB-MBMS-M2AP-ID is unknown or already allocated
    UnknownEnbMbmsM2apId = 2,
    /// The pair of MBMS M2AP ids is unknown
    UnknownPairOfMbmsM2apIds = 3,
    /// Radio resources are not available
    RadioResourcesNotAvailable = 4,
}

/// Transport layer causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum TransportCause {
    /// Unspecified transport failure
    Unspecified = 0,
    /// Transport resource unavailable
    TransportResourceUnavailable = 1,
}

/// Protocol causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ProtocolCause {
    /// Unspecified protocol error
    Unspecified = 0,
    /// Transfer syntax error
    TransferSyntaxError = 1,
    /// Abstract syntax error (reject)
    AbstractSyntaxErrorReject = 2,
    /// Message not compatible with receiver state
    MessageNotCompatibleWithReceiverState = 3,
    /// Semantic error
    SemanticError = 4,
}

/// Miscellaneous causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum MiscCause {
    /// Unspecified failure
    Unspecified = 0,
    /// Control processing overload
    ControlProcessingOverload = 1,
    /// Not enough user plane processing resources
    NotEnoughUserPlaneProcessingResources = 2,
    /// Hardware failure
    HardwareFailure = 3,
    /// Operation and maintenance intervention
    OmIntervention = 4,
}

/// M2AP cause, grouped as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// Radio network layer cause
    RadioNetwork(RadioNetworkCause),
    /// Transport layer cause
    Transport(TransportCause),
    /// Protocol cause
    Protocol(ProtocolCause),
    /// Miscellaneous cause
    Misc(MiscCause),
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::RadioNetwork(c) => write!(f, "radio-network/{c:?}"),
            Cause::Transport(c) => write!(f, "transport/{c:?}"),
            Cause::Protocol(c) => write!(f, "protocol/{c:?}"),
            Cause::Misc(c) => write!(f, "misc/{c:?}"),
        }
    }
}

/// Wait hint returned with a Setup-Failure before the eNB may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum TimeToWait {
    /// 1 second
    V1s = 0,
    /// 2 seconds
    V2s = 1,
    /// 5 seconds
    V5s = 2,
    /// 10 seconds
    V10s = 3,
    /// 20 seconds
    V20s = 4,
    /// 60 seconds
    V60s = 5,
}
