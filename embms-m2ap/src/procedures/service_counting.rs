//! MBMS service counting and overload notification
//!
//! Inbound-only traffic at the MCE: counting outcomes and per-area
//! overload reports from eNBs. The MCE logs these; they carry no session
//! state.

use super::{Cause, Tmgi};
use num_enum::TryFromPrimitive;

/// MBMS Service Counting Response (eNB -> MCE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceCountingResponse;

/// MBMS Service Counting Failure (eNB -> MCE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceCountingFailure {
    /// Failure cause
    pub cause: Cause,
}

/// One counting result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountingResultItem {
    /// Counted broadcast service
    pub tmgi: Tmgi,
    /// Number of interested UEs reported by the eNB
    pub counting_result: u32,
}

/// MBMS Service Counting Results Report (eNB -> MCE).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCountingResultsReport {
    /// MBSFN area the results refer to
    pub mbsfn_area_id: u16,
    /// Counting results
    pub results: Vec<CountingResultItem>,
}

/// Overload state of an MBSFN area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum OverloadStatus {
    /// Normal load
    Normal = 0,
    /// Overloaded
    Overloaded = 1,
}

/// MBMS Overload Notification (eNB -> MCE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverloadNotification {
    /// MBSFN area the notification refers to
    pub mbsfn_area_id: u16,
    /// Reported load state
    pub status: OverloadStatus,
}
