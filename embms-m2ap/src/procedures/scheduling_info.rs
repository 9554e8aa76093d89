//! MBMS Scheduling Information procedure
//!
//! After M2 Setup the MCE pushes the MCCH update time and the MBSFN area
//! configuration to the eNB on the signalling stream. The eNB answers
//! with an empty acknowledgement.

/// Configuration for one MBSFN area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbsfnAreaConfig {
    /// MBSFN area id
    pub mbsfn_area_id: u16,
    /// Common subframe allocation period (radio frames)
    pub csa_period_rf: u16,
}

/// MBMS Scheduling Information (MCE -> eNB).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingInformation {
    /// MCCH update time
    pub mcch_update_time: u8,
    /// Per-MBSFN-area configuration
    pub areas: Vec<MbsfnAreaConfig>,
}

/// MBMS Scheduling Information Response (eNB -> MCE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulingInformationResponse;
