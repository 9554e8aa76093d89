//! Error Indication procedure
//!
//! Sent by an eNB when it received something it cannot process. No
//! response is defined; the MCE reacts only when the indication names a
//! live MBMS session.

use super::Cause;

/// Error Indication (eNB -> MCE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorIndication {
    /// MCE MBMS service id the error refers to, if any
    pub mce_mbms_m2ap_id: Option<u32>,
    /// eNB-local MBMS service id the error refers to, if any
    pub enb_mbms_m2ap_id: Option<u16>,
    /// Reported cause, if any
    pub cause: Option<Cause>,
}
