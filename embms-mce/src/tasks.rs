//! Task framework for the MCE node
//!
//! Each task is an async event loop reading one typed mailbox. Messages
//! are wrapped in a [`TaskMessage`] envelope so every task understands
//! the same shutdown signal. [`MceTaskBase`] carries the configuration
//! and the send handles every task needs to reach the others.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tokio::sync::mpsc;

use embms_common::MceConfig;
use embms_m2ap::procedures::{BearerQos, Tmgi, TnlInformation};

/// Default capacity for task mailboxes.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Task Message Envelope
// ============================================================================

/// Task message envelope wrapping typed messages with control signals.
#[derive(Debug)]
pub enum TaskMessage<T> {
    /// Regular message payload
    Message(T),
    /// Shutdown signal - task should terminate gracefully
    Shutdown,
}

impl<T> TaskMessage<T> {
    /// Returns the message payload if present, or None for shutdown.
    pub fn into_message(self) -> Option<T> {
        match self {
            TaskMessage::Message(msg) => Some(msg),
            TaskMessage::Shutdown => None,
        }
    }

    /// Returns true if this is a shutdown signal.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, TaskMessage::Shutdown)
    }
}

// ============================================================================
// Task Trait
// ============================================================================

/// A long-running task processing messages from its mailbox.
#[async_trait::async_trait]
pub trait Task: Send + 'static {
    /// The message type this task processes.
    type Message: Send;

    /// Runs the task's main loop, processing messages until shutdown.
    async fn run(&mut self, rx: mpsc::Receiver<TaskMessage<Self::Message>>);
}

// ============================================================================
// Task Handle
// ============================================================================

/// Send handle for a task mailbox.
pub struct TaskHandle<T> {
    tx: mpsc::Sender<TaskMessage<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> TaskHandle<T> {
    /// Creates a new task handle from a sender.
    pub fn new(tx: mpsc::Sender<TaskMessage<T>>) -> Self {
        Self { tx }
    }

    /// Sends a message to the task.
    ///
    /// Returns an error if the task has been dropped.
    pub async fn send(&self, msg: T) -> Result<(), mpsc::error::SendError<TaskMessage<T>>> {
        self.tx.send(TaskMessage::Message(msg)).await
    }

    /// Sends a shutdown signal to the task.
    pub async fn shutdown(&self) -> Result<(), mpsc::error::SendError<TaskMessage<T>>> {
        self.tx.send(TaskMessage::Shutdown).await
    }

    /// Returns true if the task mailbox is closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Upstream request to start an MBMS session.
#[derive(Debug, Clone)]
pub struct SessionStartCommand {
    /// Broadcast service identity
    pub tmgi: Tmgi,
    /// Target MBMS service area
    pub service_area: u16,
    /// Bearer level QoS
    pub qos: BearerQos,
    /// Downlink transport addressing
    pub tnl: TnlInformation,
    /// Absolute start time; `None` starts immediately
    pub start_time: Option<SystemTime>,
}

/// Upstream request to update an MBMS session.
#[derive(Debug, Clone)]
pub struct SessionUpdateCommand {
    /// Broadcast service identity
    pub tmgi: Tmgi,
    /// Service area the session currently uses
    pub old_service_area: u16,
    /// Service area the session moves to
    pub new_service_area: u16,
    /// Bearer level QoS
    pub qos: BearerQos,
    /// Downlink transport addressing
    pub tnl: TnlInformation,
    /// Absolute update time; `None` applies immediately
    pub update_time: Option<SystemTime>,
}

/// Upstream request to stop an MBMS session.
#[derive(Debug, Clone)]
pub struct SessionStopCommand {
    /// Broadcast service identity
    pub tmgi: Tmgi,
    /// Service area of the session to stop
    pub service_area: u16,
}

/// Messages for the M2AP task.
#[derive(Debug)]
pub enum M2apMessage {
    /// A new SCTP association with an eNB is up
    AssociationUp {
        /// Association id assigned by the transport
        assoc_id: u64,
        /// Negotiated inbound stream count
        in_streams: u16,
        /// Negotiated outbound stream count
        out_streams: u16,
    },
    /// An SCTP association was lost
    AssociationDown {
        /// Association id
        assoc_id: u64,
    },
    /// An M2AP PDU arrived from an eNB
    ReceivePdu {
        /// Association the PDU arrived on
        assoc_id: u64,
        /// SCTP stream the PDU arrived on
        stream: u16,
        /// Encoded PDU
        data: Bytes,
    },
    /// Upstream session start request
    SessionStart(SessionStartCommand),
    /// Upstream session update request
    SessionUpdate(SessionUpdateCommand),
    /// Upstream session stop request
    SessionStop(SessionStopCommand),
    /// A deferred session action timer fired
    ActionTimerExpired {
        /// Service the timer belongs to
        mce_mbms_m2ap_id: u32,
    },
}

/// Messages for the SCTP task.
#[derive(Debug)]
pub enum SctpMessage {
    /// Send an encoded PDU to an association
    SendPdu {
        /// Target association
        assoc_id: u64,
        /// SCTP stream to send on
        stream: u16,
        /// Encoded PDU
        data: Bytes,
    },
    /// Close an association
    CloseAssociation {
        /// Association to close
        assoc_id: u64,
    },
}

// ============================================================================
// MCE Task Base
// ============================================================================

/// Shared task handles and configuration for the MCE node.
///
/// Every task receives a clone and can reach the others through the
/// appropriate handle.
#[derive(Clone)]
pub struct MceTaskBase {
    /// MCE configuration
    pub config: Arc<MceConfig>,
    /// Handle to the M2AP task
    pub m2ap_tx: TaskHandle<M2apMessage>,
    /// Handle to the SCTP task
    pub sctp_tx: TaskHandle<SctpMessage>,
}

impl MceTaskBase {
    /// Creates a task base with the given configuration and channel
    /// capacity, returning the receivers for each task.
    pub fn new(
        config: MceConfig,
        channel_capacity: usize,
    ) -> (
        Self,
        mpsc::Receiver<TaskMessage<M2apMessage>>,
        mpsc::Receiver<TaskMessage<SctpMessage>>,
    ) {
        let (m2ap_tx, m2ap_rx) = mpsc::channel(channel_capacity);
        let (sctp_tx, sctp_rx) = mpsc::channel(channel_capacity);

        let base = Self {
            config: Arc::new(config),
            m2ap_tx: TaskHandle::new(m2ap_tx),
            sctp_tx: TaskHandle::new(sctp_tx),
        };

        (base, m2ap_rx, sctp_rx)
    }
}
