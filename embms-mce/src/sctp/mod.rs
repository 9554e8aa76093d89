//! SCTP transport task for the M2 interface.

pub mod task;

pub use task::SctpTask;
