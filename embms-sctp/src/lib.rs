//! SCTP server transport for the embms MCE
//!
//! The MCE is the server side of the M2 interface: eNBs connect to it.
//! This crate wraps `sctp-proto`'s Sans-IO SCTP implementation with a
//! tokio UDP socket and exposes association lifecycle and per-stream
//! data as events. SCTP-over-UDP keeps the stack in user space while
//! preserving the multi-stream semantics M2AP relies on.

pub mod server;

pub use server::{ServerError, ServerEvent, SctpServer, SctpServerConfig};

/// SCTP payload protocol identifier for M2AP (IANA assigned).
pub const M2AP_PPID: u32 = 43;

/// Default number of SCTP streams per M2 association: stream 0 for eNB
/// signalling, stream 1 for MBMS service traffic.
pub const DEFAULT_NUM_STREAMS: u16 = 2;
