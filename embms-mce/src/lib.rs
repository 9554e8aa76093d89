//! embms MCE node library
//!
//! The MCE (MBMS Coordination Entity) terminates the M2 interface toward
//! eNBs: it accepts their associations, drives M2 Setup and Reset, and
//! orchestrates MBMS Session Start / Update / Stop across every eNB
//! serving a broadcast area. The node is a set of tokio tasks connected
//! by typed mailboxes: the SCTP task owns the transport, the M2AP task
//! owns all protocol state.

pub mod m2ap;
pub mod sctp;
pub mod tasks;

pub use m2ap::task::M2apTask;
pub use sctp::task::SctpTask;
pub use tasks::{
    M2apMessage, MceTaskBase, SctpMessage, SessionStartCommand, SessionStopCommand,
    SessionUpdateCommand, Task, TaskHandle, TaskMessage, DEFAULT_CHANNEL_CAPACITY,
};
