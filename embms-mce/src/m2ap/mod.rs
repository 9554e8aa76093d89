//! M2AP protocol handling for the MCE
//!
//! This module owns all M2 protocol state: the eNB registry
//! ([`enb_context`]), the MBMS service registry ([`mbms_context`]), the
//! M2AP task with the inbound dispatcher and the Setup/Reset handlers
//! ([`task`]), and the session lifecycle orchestrator ([`session`]).

pub mod enb_context;
pub mod mbms_context;
pub mod session;
pub mod task;

#[cfg(test)]
pub(crate) mod test_support;

pub use enb_context::{EnbContextInfo, EnbRegistry, EnbRegistryError, EnbState, M2apEnbContext};
pub use mbms_context::{
    MbmsRegistryError, MbmsServiceContext, MbmsServiceInfo, MbmsServiceRegistry, MbmsServiceState,
    PendingActionKind, PendingSessionAction,
};
pub use task::M2apTask;
