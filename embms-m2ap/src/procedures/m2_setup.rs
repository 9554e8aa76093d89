//! M2 Setup procedure
//!
//! The first exchange on a new association: the eNB announces its global
//! id, an optional display name, and its per-cell MBMS configuration; the
//! MCE answers with its own identity and the MBSFN areas the eNB will
//! take part in, or rejects with a cause and an optional retry hint.

use super::{Cause, GlobalEnbId, TimeToWait};

/// Per-cell MBMS configuration advertised in the M2 Setup Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnbMbmsConfigItem {
    /// E-UTRAN cell identity (28 bits)
    pub ecgi_cell_id: u32,
    /// MBSFN synchronisation area of the cell
    pub mbsfn_sync_area: u16,
    /// MBMS service areas the cell can broadcast into
    pub service_areas: Vec<u16>,
}

/// M2 Setup Request (eNB -> MCE).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M2SetupRequest {
    /// Global eNB identity
    pub global_enb_id: GlobalEnbId,
    /// Human readable eNB name
    pub enb_name: Option<String>,
    /// Per-cell MBMS configuration list
    pub configured_cells: Vec<EnbMbmsConfigItem>,
}

impl M2SetupRequest {
    /// Returns the union of all advertised service areas across cells.
    pub fn advertised_service_areas(&self) -> impl Iterator<Item = u16> + '_ {
        self.configured_cells
            .iter()
            .flat_map(|cell| cell.service_areas.iter().copied())
    }
}

/// M2 Setup Response (MCE -> eNB).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M2SetupResponse {
    /// Numeric MCE id
    pub mce_id: u16,
    /// Human readable MCE name
    pub mce_name: Option<String>,
    /// MBSFN areas assigned to the eNB
    pub mbsfn_area_ids: Vec<u16>,
}

/// M2 Setup Failure (MCE -> eNB).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct M2SetupFailure {
    /// Reject cause
    pub cause: Cause,
    /// Retry hint; absent for permanent rejections
    pub time_to_wait: Option<TimeToWait>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertised_service_areas_spans_cells() {
        let request = M2SetupRequest {
            global_enb_id: GlobalEnbId {
                plmn: [0x02, 0xF8, 0x39],
                enb_id: 0x1234,
            },
            enb_name: Some("enb-1".into()),
            configured_cells: vec![
                EnbMbmsConfigItem {
                    ecgi_cell_id: 1,
                    mbsfn_sync_area: 1,
                    service_areas: vec![7, 9],
                },
                EnbMbmsConfigItem {
                    ecgi_cell_id: 2,
                    mbsfn_sync_area: 1,
                    service_areas: vec![11],
                },
            ],
        };

        let areas: Vec<u16> = request.advertised_service_areas().collect();
        assert_eq!(areas, vec![7, 9, 11]);
    }
}
