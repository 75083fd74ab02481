//! UDP Transport
//!
//! One socket per node. Sends go straight to a non-blocking clone of the
//! socket so the protocol tick never waits on the network and never depends on
//! reactor readiness; a spawned task reads datagrams into the node's inbox.
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Inbox, Transport, TransportStats, TransportStatsSnapshot};
use crate::error::{GossamerError, Result};
use crate::gossip::codec::MAX_DATAGRAM_SIZE;
use crate::node::NodeId;
use crate::transport_error;

/// UDP socket transport for a single node
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    sender: std::net::UdpSocket,
    local: NodeId,
    stats: Arc<TransportStats>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local", &self.local)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl UdpTransport {
    /// Bind the membership socket. Port 0 picks an ephemeral port.
    pub async fn bind(bind_addr: SocketAddrV4) -> Result<Self> {
        let std_socket = std::net::UdpSocket::bind(bind_addr)
            .map_err(|e| transport_error!("Socket bind to {} failed: {}", bind_addr, e))?;
        std_socket
            .set_nonblocking(true)
            .map_err(|e| transport_error!("Socket creation failed: {}", e))?;
        // tokio's try_send_to reports WouldBlock until the reactor has polled
        // the socket, so sends bypass it
        let sender = std_socket
            .try_clone()
            .map_err(|e| transport_error!("Socket clone failed: {}", e))?;
        let socket = UdpSocket::from_std(std_socket)
            .map_err(|e| transport_error!("Socket registration failed: {}", e))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| transport_error!("Socket creation failed: {}", e))?;
        let local = NodeId::try_from(local_addr)?;

        debug!("[{}] UDP transport bound", local);
        Ok(Self {
            socket: Arc::new(socket),
            sender,
            local,
            stats: Arc::new(TransportStats::default()),
            receive_task: Mutex::new(None),
        })
    }

    /// Identity derived from the bound address
    pub fn local_id(&self) -> NodeId {
        self.local
    }

    fn spawn_receive_loop(&self, tx: mpsc::UnboundedSender<Bytes>) -> Result<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| transport_error!("UDP receive loop needs a tokio runtime: {}", e))?;
        let socket = Arc::clone(&self.socket);
        let stats = Arc::clone(&self.stats);
        let local = self.local;

        Ok(handle.spawn(async move {
            // one spare byte so oversize datagrams are detectable
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, _)) if len > MAX_DATAGRAM_SIZE => {
                        stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                        debug!("[{}] Dropping oversize datagram", local);
                    }
                    Ok((len, addr)) => {
                        stats.messages_delivered.fetch_add(1, Ordering::Relaxed);
                        if tx.send(Bytes::copy_from_slice(&buf[..len])).is_err() {
                            debug!("[{}] Inbox closed; stopping UDP receive loop", local);
                            break;
                        }
                        tracing::trace!("[{}] {} bytes from {}", local, len, addr);
                    }
                    Err(e) => {
                        stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                        warn!("[{}] UDP receive error: {}", local, e);
                    }
                }
            }
        }))
    }
}

impl Transport for UdpTransport {
    fn send(&self, from: NodeId, to: NodeId, data: Bytes) -> Result<()> {
        if from != self.local {
            return Err(transport_error!(
                "socket bound to {} cannot send as {}",
                self.local,
                from
            ));
        }
        if data.len() > MAX_DATAGRAM_SIZE {
            self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(transport_error!(
                "{} byte message exceeds UDP datagram limit",
                data.len()
            ));
        }

        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        let target = SocketAddr::V4(to.socket_addr());
        match self.sender.send_to(&data, target) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // socket buffer full; same as a lost datagram
                self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(GossamerError::Io(e))
            }
        }
    }

    fn register_receiver(&self, local: NodeId) -> Result<Inbox> {
        if local != self.local {
            return Err(transport_error!(
                "socket bound to {} cannot receive for {}",
                self.local,
                local
            ));
        }
        let mut task = self
            .receive_task
            .lock()
            .map_err(|e| transport_error!("receive task lock poisoned: {}", e))?;
        if task.is_some() {
            return Err(transport_error!("{} is already registered", local));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *task = Some(self.spawn_receive_loop(tx)?);
        Ok(rx)
    }

    fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Ok(mut task) = self.receive_task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn loopback() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)
    }

    #[tokio::test]
    async fn test_bind_derives_node_id_from_socket() {
        let transport = UdpTransport::bind(loopback()).await.unwrap();
        let id = transport.local_id();
        assert_eq!(id.addr(), [127, 0, 0, 1]);
        assert_ne!(id.port(), 0);
    }

    #[tokio::test]
    async fn test_datagram_reaches_inbox() {
        let a = UdpTransport::bind(loopback()).await.unwrap();
        let b = UdpTransport::bind(loopback()).await.unwrap();
        let mut inbox = b.register_receiver(b.local_id()).unwrap();

        a.send(a.local_id(), b.local_id(), Bytes::from_static(b"hello"))
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, Bytes::from_static(b"hello"));
        assert_eq!(a.stats().messages_sent, 1);
        assert_eq!(a.stats().messages_dropped, 0);
        assert_eq!(b.stats().messages_delivered, 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_burst_right_after_bind_is_not_dropped() {
        let a = UdpTransport::bind(loopback()).await.unwrap();
        let b = UdpTransport::bind(loopback()).await.unwrap();
        let mut inbox = b.register_receiver(b.local_id()).unwrap();

        // nothing has yielded to the reactor yet
        for n in 0..3u8 {
            a.send(a.local_id(), b.local_id(), Bytes::from(vec![n])).unwrap();
        }
        assert_eq!(a.stats().messages_dropped, 0);

        for n in 0..3u8 {
            let received = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received, Bytes::from(vec![n]));
        }
    }

    #[tokio::test]
    async fn test_rejects_foreign_identity() {
        let transport = UdpTransport::bind(loopback()).await.unwrap();
        let other = NodeId::new([10, 0, 0, 1], 9);
        assert!(transport.register_receiver(other).is_err());
        assert!(transport
            .send(other, transport.local_id(), Bytes::from_static(b"x"))
            .is_err());
    }

    #[tokio::test]
    async fn test_second_registration_rejected() {
        let transport = UdpTransport::bind(loopback()).await.unwrap();
        let _inbox = transport.register_receiver(transport.local_id()).unwrap();
        assert!(transport.register_receiver(transport.local_id()).is_err());
    }

    #[tokio::test]
    async fn test_oversize_send_rejected() {
        let transport = UdpTransport::bind(loopback()).await.unwrap();
        let data = Bytes::from(vec![0u8; MAX_DATAGRAM_SIZE + 1]);
        assert!(transport
            .send(transport.local_id(), transport.local_id(), data)
            .is_err());
        assert_eq!(transport.stats().send_errors, 1);
    }
}
