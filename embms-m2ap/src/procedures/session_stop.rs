//! MBMS Session Stop procedure
//!
//! Tears down one broadcast bearer on one eNB. Stop is best-effort: the
//! MCE forgets the session regardless of the per-eNB outcome, so both
//! messages carry only the id pair.

/// MBMS Session Stop Request (MCE -> eNB).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStopRequest {
    /// MCE MBMS service id
    pub mce_mbms_m2ap_id: u32,
    /// eNB-local MBMS service id recorded from the Start response
    pub enb_mbms_m2ap_id: u16,
}

/// MBMS Session Stop Response (eNB -> MCE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStopResponse {
    /// Echoed MCE MBMS service id
    pub mce_mbms_m2ap_id: u32,
    /// Echoed eNB-local MBMS service id
    pub enb_mbms_m2ap_id: u16,
}
