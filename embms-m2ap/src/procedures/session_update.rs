//! MBMS Session Update procedure
//!
//! Mutates a running broadcast bearer on an eNB that already carries it:
//! new service area, QoS or transport addressing. eNBs that stop being
//! eligible for the new area get a Session Stop instead; newly eligible
//! ones get a Session Start.

use super::{BearerQos, Cause, TnlInformation, Tmgi};

/// MBMS Session Update Request (MCE -> eNB).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionUpdateRequest {
    /// MCE MBMS service id
    pub mce_mbms_m2ap_id: u32,
    /// eNB-local MBMS service id recorded from the Start response
    pub enb_mbms_m2ap_id: u16,
    /// Broadcast service identity
    pub tmgi: Tmgi,
    /// New MBMS service area
    pub service_area: u16,
    /// Bearer level QoS
    pub qos: BearerQos,
    /// Downlink transport addressing
    pub tnl: TnlInformation,
}

/// MBMS Session Update Response (eNB -> MCE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionUpdateResponse {
    /// Echoed MCE MBMS service id
    pub mce_mbms_m2ap_id: u32,
    /// Echoed eNB-local MBMS service id
    pub enb_mbms_m2ap_id: u16,
}

/// MBMS Session Update Failure (eNB -> MCE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionUpdateFailure {
    /// Echoed MCE MBMS service id
    pub mce_mbms_m2ap_id: u32,
    /// Echoed eNB-local MBMS service id
    pub enb_mbms_m2ap_id: u16,
    /// Failure cause
    pub cause: Cause,
}
