//! Configuration structures for the MCE node
//!
//! The MCE is configured from a single YAML file: where to listen for M2
//! associations, which PLMNs and MBMS service areas it serves, and the
//! capacity limits applied during M2 Setup.

use std::fmt;
use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::Plmn;

/// Default SCTP port for M2AP (3GPP TS 36.443).
pub const DEFAULT_M2AP_PORT: u16 = 36443;

fn default_m2ap_port() -> u16 {
    DEFAULT_M2AP_PORT
}

fn default_max_enbs() -> usize {
    64
}

fn default_mcch_update_time() -> u8 {
    0
}

/// MCE node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MceConfig {
    /// Display name announced in M2 Setup Response
    pub name: String,
    /// Numeric MCE id carried in M2 Setup Response
    pub mce_id: u16,
    /// IP address the M2AP SCTP server binds to
    pub m2ap_ip: IpAddr,
    /// SCTP port for M2AP (default 36443)
    #[serde(default = "default_m2ap_port")]
    pub m2ap_port: u16,
    /// PLMNs served by this MCE
    pub plmns: Vec<Plmn>,
    /// MBMS service areas served by this MCE
    pub mbms_service_areas: Vec<u16>,
    /// MBSFN area ids handed to eNBs after M2 Setup
    pub mbsfn_area_ids: Vec<u16>,
    /// Maximum number of concurrently connected eNBs
    #[serde(default = "default_max_enbs")]
    pub max_enbs: usize,
    /// MCCH update time announced in scheduling information
    #[serde(default = "default_mcch_update_time")]
    pub mcch_update_time: u8,
}

impl MceConfig {
    /// Validates the configuration, returning a description of the first
    /// problem found.
    pub fn validate(&self) -> Result<(), Error> {
        if self.plmns.is_empty() {
            return Err(Error::Config("at least one PLMN must be served".into()));
        }
        if self.mbms_service_areas.is_empty() {
            return Err(Error::Config(
                "at least one MBMS service area must be served".into(),
            ));
        }
        if self.max_enbs == 0 {
            return Err(Error::Config("max_enbs must be greater than zero".into()));
        }
        Ok(())
    }
}

impl fmt::Display for MceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{}, {} PLMN(s), {} service area(s), max {} eNB(s))",
            self.name,
            self.m2ap_ip,
            self.m2ap_port,
            self.plmns.len(),
            self.mbms_service_areas.len(),
            self.max_enbs
        )
    }
}

/// Loads and validates an MCE configuration from a YAML file.
pub fn load_mce_config<P: AsRef<Path>>(path: P) -> Result<MceConfig, Error> {
    let contents = std::fs::read_to_string(path)?;
    let config: MceConfig = serde_yaml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
