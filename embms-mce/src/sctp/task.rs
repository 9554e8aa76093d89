//! SCTP task
//!
//! Owns the M2 listening endpoint and bridges it to the M2AP task:
//! transport events go up as [`M2apMessage`]s, outbound PDUs come down
//! as [`SctpMessage`]s. The server itself is Sans-IO and must be
//! polled, so the loop alternates between the mailbox, the event
//! channel and a bounded-wait poll of the socket.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use embms_sctp::{SctpServer, SctpServerConfig, ServerEvent};

use crate::tasks::{M2apMessage, MceTaskBase, SctpMessage, Task, TaskMessage};

/// How long one socket poll may block before the mailbox is checked
/// again.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The SCTP transport task.
pub struct SctpTask {
    task_base: MceTaskBase,
    server: SctpServer,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl SctpTask {
    /// Binds the M2 listening endpoint from the configuration.
    pub async fn bind(task_base: MceTaskBase) -> anyhow::Result<Self> {
        let addr = SocketAddr::new(task_base.config.m2ap_ip, task_base.config.m2ap_port);
        let mut server = SctpServer::bind(addr, SctpServerConfig::default()).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        server.set_event_sender(events_tx);
        info!("M2 SCTP endpoint listening on {}", server.local_addr());
        Ok(Self {
            task_base,
            server,
            events_rx,
        })
    }

    async fn handle_message(&mut self, msg: SctpMessage) {
        match msg {
            SctpMessage::SendPdu {
                assoc_id,
                stream,
                data,
            } => {
                if let Err(err) = self.server.send(assoc_id, stream, &data).await {
                    warn!(
                        "send to association {} stream {} failed: {}",
                        assoc_id, stream, err
                    );
                    self.server.close_association(assoc_id);
                    self.forward(ServerEvent::AssociationDown {
                        association_id: assoc_id,
                        reason: err.to_string(),
                    })
                    .await;
                }
            }
            SctpMessage::CloseAssociation { assoc_id } => {
                debug!("closing association {}", assoc_id);
                self.server.close_association(assoc_id);
            }
        }
    }

    async fn forward(&self, event: ServerEvent) {
        let msg = match event {
            ServerEvent::AssociationUp {
                association_id,
                remote_addr,
                in_streams,
                out_streams,
            } => {
                info!(
                    "association {} up from {} ({} in / {} out streams)",
                    association_id, remote_addr, in_streams, out_streams
                );
                M2apMessage::AssociationUp {
                    assoc_id: association_id,
                    in_streams,
                    out_streams,
                }
            }
            ServerEvent::AssociationDown {
                association_id,
                reason,
            } => {
                info!("association {} down: {}", association_id, reason);
                M2apMessage::AssociationDown {
                    assoc_id: association_id,
                }
            }
            ServerEvent::DataReceived {
                association_id,
                stream_id,
                data,
            } => M2apMessage::ReceivePdu {
                assoc_id: association_id,
                stream: stream_id,
                data,
            },
        };
        if self.task_base.m2ap_tx.send(msg).await.is_err() {
            warn!("M2AP task gone, dropping transport event");
        }
    }
}

#[async_trait::async_trait]
impl Task for SctpTask {
    type Message = SctpMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<SctpMessage>>) {
        info!("SCTP task started");
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(TaskMessage::Message(msg)) => self.handle_message(msg).await,
                    Some(TaskMessage::Shutdown) | None => break,
                },
                event = self.events_rx.recv() => match event {
                    Some(event) => self.forward(event).await,
                    None => break,
                },
                result = self.server.recv(POLL_INTERVAL) => {
                    if let Err(err) = result {
                        error!("SCTP endpoint failed: {}", err);
                        break;
                    }
                }
            }
        }
        self.server.stop();
        info!("SCTP task stopped");
    }
}
