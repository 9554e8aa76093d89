//! Reset procedure
//!
//! An eNB asks the MCE to forget M2 state: everything (full reset) or an
//! itemized list of MBMS sessions (partial reset). The acknowledge echoes
//! the item list so the eNB can correlate; full resets are acknowledged
//! without items.

use super::Cause;

/// One logical connection named in a partial reset.
///
/// Either id may be absent; an item with neither id is unusable and is
/// skipped by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetItem {
    /// MCE MBMS service id, if known to the eNB
    pub mce_mbms_m2ap_id: Option<u32>,
    /// eNB-local MBMS service id, if known to the eNB
    pub enb_mbms_m2ap_id: Option<u16>,
}

/// Scope of a reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetType {
    /// Release every MBMS session on this association
    Full,
    /// Release only the listed sessions
    Partial(Vec<ResetItem>),
}

/// Reset (eNB -> MCE).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reset {
    /// Why the eNB is resetting
    pub cause: Cause,
    /// What to release
    pub reset_type: ResetType,
}

/// Reset Acknowledge (MCE -> eNB).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetAcknowledge {
    /// Echo of the partial reset item list; `None` for a full reset
    pub items: Option<Vec<ResetItem>>,
}
