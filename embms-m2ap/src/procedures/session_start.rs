//! MBMS Session Start procedure
//!
//! The MCE asks an eNB to establish radio resources for one broadcast
//! bearer. The same request value is fanned out to every eNB serving the
//! target area; each eNB answers independently with a response carrying
//! the eNB-local MBMS id it allocated, or a failure with a cause.

use super::{BearerQos, Cause, TnlInformation, Tmgi};

/// MBMS Session Start Request (MCE -> eNB).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStartRequest {
    /// MCE allocated MBMS service id (24 bits)
    pub mce_mbms_m2ap_id: u32,
    /// Broadcast service identity
    pub tmgi: Tmgi,
    /// Target MBMS service area
    pub service_area: u16,
    /// Bearer level QoS
    pub qos: BearerQos,
    /// Downlink transport addressing
    pub tnl: TnlInformation,
}

/// MBMS Session Start Response (eNB -> MCE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStartResponse {
    /// Echoed MCE MBMS service id
    pub mce_mbms_m2ap_id: u32,
    /// eNB-local MBMS service id allocated for this session
    pub enb_mbms_m2ap_id: u16,
}

/// MBMS Session Start Failure (eNB -> MCE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStartFailure {
    /// Echoed MCE MBMS service id
    pub mce_mbms_m2ap_id: u32,
    /// Failure cause
    pub cause: Cause,
}
