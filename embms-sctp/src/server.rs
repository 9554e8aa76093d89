//! SCTP server accepting M2 associations from eNBs
//!
//! Built on `sctp-proto`'s Sans-IO design: the protocol state machine is
//! driven by datagrams read from a tokio UDP socket, and everything it
//! wants to send is collected and written back out. Each accepted
//! association gets a stable numeric id used by the rest of the node to
//! address the eNB.

use bytes::Bytes;
use sctp_proto::{
    Association, AssociationHandle, DatagramEvent, Endpoint, EndpointConfig, Event, Payload,
    PayloadProtocolIdentifier, ServerConfig, TransportConfig, Transmit,
};
use std::{
    collections::{HashMap, VecDeque},
    io,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::{net::UdpSocket, sync::mpsc, time::timeout};
use tracing::{debug, info, trace, warn};

use crate::{DEFAULT_NUM_STREAMS, M2AP_PPID};

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// I/O error on the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The server has been stopped
    #[error("server not running")]
    NotRunning,
    /// No association with the given id
    #[error("association not found: {0}")]
    AssociationNotFound(u64),
    /// Stream-level send error
    #[error("send error: {0}")]
    SendError(String),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct SctpServerConfig {
    /// Maximum number of inbound streams per association
    pub max_inbound_streams: u16,
    /// Maximum number of outbound streams per association
    pub max_outbound_streams: u16,
    /// Maximum message size accepted
    pub max_message_size: u32,
    /// Receive buffer size
    pub receive_buffer_size: u32,
    /// Payload protocol identifier stamped on outgoing data
    pub ppid: u32,
}

impl Default for SctpServerConfig {
    fn default() -> Self {
        Self {
            max_inbound_streams: DEFAULT_NUM_STREAMS,
            max_outbound_streams: DEFAULT_NUM_STREAMS,
            max_message_size: 65536,
            receive_buffer_size: 262144,
            ppid: M2AP_PPID,
        }
    }
}

/// Events surfaced to the node.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new association completed its handshake
    AssociationUp {
        /// Stable association id
        association_id: u64,
        /// Remote (eNB) address
        remote_addr: SocketAddr,
        /// Negotiated inbound stream count
        in_streams: u16,
        /// Negotiated outbound stream count
        out_streams: u16,
    },
    /// An association was lost or closed
    AssociationDown {
        /// Association id
        association_id: u64,
        /// Human readable reason
        reason: String,
    },
    /// A complete message arrived on a stream
    DataReceived {
        /// Association id
        association_id: u64,
        /// SCTP stream the message arrived on
        stream_id: u16,
        /// Message payload
        data: Bytes,
    },
}

struct PeerAssociation {
    association: Association,
    remote_addr: SocketAddr,
    pending_transmits: VecDeque<Transmit>,
}

/// SCTP server for the M2 interface.
pub struct SctpServer {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    endpoint: Endpoint,
    peers: HashMap<AssociationHandle, PeerAssociation>,
    handle_to_id: HashMap<AssociationHandle, u64>,
    id_to_handle: HashMap<u64, AssociationHandle>,
    next_association_id: u64,
    config: SctpServerConfig,
    event_tx: Option<mpsc::UnboundedSender<ServerEvent>>,
    running: bool,
}

impl SctpServer {
    /// Creates a server bound to the given address.
    pub async fn bind(addr: SocketAddr, config: SctpServerConfig) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;

        info!("M2AP SCTP server listening on {}", local_addr);

        let transport_config = TransportConfig::default()
            .with_max_num_inbound_streams(config.max_inbound_streams)
            .with_max_num_outbound_streams(config.max_outbound_streams)
            .with_max_message_size(config.max_message_size)
            .with_max_receive_buffer_size(config.receive_buffer_size);

        let mut server_config = ServerConfig::new();
        server_config.transport = Arc::new(transport_config);

        let endpoint = Endpoint::new(
            Arc::new(EndpointConfig::new()),
            Some(Arc::new(server_config)),
        );

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            endpoint,
            peers: HashMap::new(),
            handle_to_id: HashMap::new(),
            id_to_handle: HashMap::new(),
            next_association_id: 1,
            config,
            event_tx: None,
            running: true,
        })
    }

    /// Returns the local bind address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the number of live associations.
    pub fn num_associations(&self) -> usize {
        self.peers.len()
    }

    /// Registers the channel the server publishes events on.
    pub fn set_event_sender(&mut self, tx: mpsc::UnboundedSender<ServerEvent>) {
        self.event_tx = Some(tx);
    }

    /// Waits up to `recv_timeout` for a datagram and processes it; on
    /// timeout, protocol timers are serviced instead. Returns whether a
    /// datagram was handled.
    pub async fn recv(&mut self, recv_timeout: Duration) -> Result<bool> {
        if !self.running {
            return Err(ServerError::NotRunning);
        }

        let mut buf = vec![0u8; self.config.receive_buffer_size as usize];

        match timeout(recv_timeout, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) => {
                buf.truncate(len);
                trace!("received {} bytes from {}", len, from);
                self.handle_datagram(from, Bytes::from(buf)).await?;
                Ok(true)
            }
            Ok(Err(e)) => Err(ServerError::Io(e)),
            Err(_) => {
                self.service_timeouts().await?;
                Ok(false)
            }
        }
    }

    async fn handle_datagram(&mut self, from: SocketAddr, data: Bytes) -> Result<()> {
        let now = Instant::now();

        if let Some((handle, event)) = self.endpoint.handle(now, from, None, None, data) {
            match event {
                DatagramEvent::NewAssociation(association) => {
                    self.accept_association(handle, association, from);
                }
                DatagramEvent::AssociationEvent(assoc_event) => {
                    self.drive_association(handle, assoc_event);
                }
            }
        }

        self.flush_transmits().await
    }

    fn accept_association(
        &mut self,
        handle: AssociationHandle,
        association: Association,
        remote_addr: SocketAddr,
    ) {
        let association_id = self.next_association_id;
        self.next_association_id += 1;

        info!(
            "new M2 association from {} (assoc_id {})",
            remote_addr, association_id
        );

        self.peers.insert(
            handle,
            PeerAssociation {
                association,
                remote_addr,
                pending_transmits: VecDeque::new(),
            },
        );
        self.handle_to_id.insert(handle, association_id);
        self.id_to_handle.insert(association_id, handle);

        self.publish(ServerEvent::AssociationUp {
            association_id,
            remote_addr,
            in_streams: self.config.max_inbound_streams,
            out_streams: self.config.max_outbound_streams,
        });
    }

    fn drive_association(
        &mut self,
        handle: AssociationHandle,
        event: sctp_proto::AssociationEvent,
    ) {
        let Some(peer) = self.peers.get_mut(&handle) else {
            return;
        };
        peer.association.handle_event(event);

        let mut lost_reason = None;
        let mut data_pending = false;
        while let Some(evt) = peer.association.poll() {
            match evt {
                Event::Connected => debug!("association {:?} connected", handle),
                Event::AssociationLost { reason } => {
                    warn!("association {:?} lost: {}", handle, reason);
                    lost_reason = Some(reason.to_string());
                }
                Event::Stream(_) | Event::DatagramReceived => data_pending = true,
            }
        }

        while let Some(transmit) = peer.association.poll_transmit(Instant::now()) {
            peer.pending_transmits.push_back(transmit);
        }

        if data_pending {
            self.deliver_stream_data(handle);
        }

        if let Some(reason) = lost_reason {
            if let Some(&association_id) = self.handle_to_id.get(&handle) {
                self.drop_association(association_id);
                self.publish(ServerEvent::AssociationDown {
                    association_id,
                    reason,
                });
            }
        }
    }

    fn deliver_stream_data(&mut self, handle: AssociationHandle) {
        let Some(&association_id) = self.handle_to_id.get(&handle) else {
            return;
        };
        let Some(peer) = self.peers.get_mut(&handle) else {
            return;
        };

        let mut received = Vec::new();
        while let Some(mut stream) = peer.association.accept_stream() {
            let stream_id = stream.stream_identifier();
            if let Ok(Some(chunks)) = stream.read() {
                let total_len = chunks.len();
                if total_len > 0 {
                    let mut buf = vec![0u8; total_len];
                    if chunks.read(&mut buf).is_ok() {
                        received.push((stream_id, Bytes::from(buf)));
                    }
                }
            }
        }

        for (stream_id, data) in received {
            debug!(
                "received {} bytes on stream {} (assoc_id {})",
                data.len(),
                stream_id,
                association_id
            );
            self.publish(ServerEvent::DataReceived {
                association_id,
                stream_id,
                data,
            });
        }
    }

    async fn service_timeouts(&mut self) -> Result<()> {
        let now = Instant::now();

        for peer in self.peers.values_mut() {
            if let Some(deadline) = peer.association.poll_timeout() {
                if now >= deadline {
                    peer.association.handle_timeout(now);
                }
            }
            while let Some(transmit) = peer.association.poll_transmit(now) {
                peer.pending_transmits.push_back(transmit);
            }
        }

        self.flush_transmits().await
    }

    async fn flush_transmits(&mut self) -> Result<()> {
        let mut outgoing: Vec<Transmit> = Vec::new();

        while let Some(transmit) = self.endpoint.poll_transmit() {
            outgoing.push(transmit);
        }
        for peer in self.peers.values_mut() {
            while let Some(transmit) = peer.pending_transmits.pop_front() {
                outgoing.push(transmit);
            }
        }

        for transmit in outgoing {
            if let Payload::RawEncode(chunks) = &transmit.payload {
                for chunk in chunks {
                    self.socket.send_to(chunk, transmit.remote).await?;
                    trace!("sent {} bytes to {}", chunk.len(), transmit.remote);
                }
            }
        }

        Ok(())
    }

    /// Sends one message to an association on the given stream.
    pub async fn send(&mut self, association_id: u64, stream_id: u16, data: &[u8]) -> Result<()> {
        let handle = *self
            .id_to_handle
            .get(&association_id)
            .ok_or(ServerError::AssociationNotFound(association_id))?;

        let peer = self
            .peers
            .get_mut(&handle)
            .ok_or(ServerError::AssociationNotFound(association_id))?;

        let ppi = PayloadProtocolIdentifier::from(self.config.ppid);
        let mut stream = peer
            .association
            .open_stream(stream_id, ppi)
            .map_err(|e| ServerError::SendError(e.to_string()))?;
        stream
            .write_with_ppi(data, ppi)
            .map_err(|e| ServerError::SendError(e.to_string()))?;

        debug!(
            "queued {} bytes to assoc_id {} on stream {}",
            data.len(),
            association_id,
            stream_id
        );

        while let Some(transmit) = peer.association.poll_transmit(Instant::now()) {
            peer.pending_transmits.push_back(transmit);
        }

        self.flush_transmits().await
    }

    /// Closes one association.
    pub fn close_association(&mut self, association_id: u64) {
        if self.drop_association(association_id) {
            info!("closed association {}", association_id);
        }
    }

    fn drop_association(&mut self, association_id: u64) -> bool {
        if let Some(handle) = self.id_to_handle.remove(&association_id) {
            if let Some(mut peer) = self.peers.remove(&handle) {
                let _ = peer.association.close();
            }
            self.handle_to_id.remove(&handle);
            true
        } else {
            false
        }
    }

    /// Stops the server, closing every association.
    pub fn stop(&mut self) {
        info!("stopping M2AP SCTP server on {}", self.local_addr);
        self.running = false;

        for (_, mut peer) in self.peers.drain() {
            let _ = peer.association.close();
        }
        self.handle_to_id.clear();
        self.id_to_handle.clear();
    }

    /// Returns whether the server accepts traffic.
    pub fn is_running(&self) -> bool {
        self.running
    }

    fn publish(&self, event: ServerEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

impl Drop for SctpServer {
    fn drop(&mut self) {
        if self.running {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = SctpServerConfig::default();
        assert_eq!(config.max_inbound_streams, DEFAULT_NUM_STREAMS);
        assert_eq!(config.max_outbound_streams, DEFAULT_NUM_STREAMS);
        assert_eq!(config.ppid, M2AP_PPID);
    }

    #[tokio::test]
    async fn test_server_bind_and_stop() {
        let mut server = SctpServer::bind("127.0.0.1:0".parse().unwrap(), Default::default())
            .await
            .unwrap();
        assert!(server.is_running());
        assert_eq!(server.num_associations(), 0);
        server.stop();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_send_to_unknown_association() {
        let mut server = SctpServer::bind("127.0.0.1:0".parse().unwrap(), Default::default())
            .await
            .unwrap();
        let err = server.send(99, 0, b"m2ap").await.unwrap_err();
        assert!(matches!(err, ServerError::AssociationNotFound(99)));
    }
}
