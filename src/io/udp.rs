//! UDP datagram receiver for the profile sensor
//!
//! The sensor streams one fixed-size frame per datagram. Binding is retried
//! until it succeeds (the interface may come up after the gateway), and
//! receive errors are logged and retried after a short pause so a transient
//! socket fault never ends ingestion.

use crate::infra::config::Config;
use crate::infra::metrics::IngestMetrics;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum UdpError {
    #[error("Invalid bind address {0:?}")]
    InvalidAddress(String),

    #[error("Shutdown requested before the socket was bound")]
    Shutdown,
}

/// One received datagram
#[derive(Debug, Clone)]
pub struct Datagram {
    pub payload: Bytes,
    pub peer: SocketAddr,
    pub received_at: Instant,
}

pub struct DatagramReceiver {
    socket: UdpSocket,
    buf: Vec<u8>,
    retry_pause: Duration,
    metrics: Arc<IngestMetrics>,
}

impl DatagramReceiver {
    /// Bind the configured address, retrying until bound or shutdown
    pub async fn bind(
        config: &Config,
        metrics: Arc<IngestMetrics>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Self, UdpError> {
        let addr: SocketAddr = config
            .udp_bind_address()
            .parse()
            .map_err(|_| UdpError::InvalidAddress(config.udp_bind_address().to_string()))?;

        let mut attempts: u32 = 0;
        let socket = loop {
            attempts += 1;
            match UdpSocket::bind(addr).await {
                Ok(socket) => break socket,
                Err(e) => {
                    warn!(addr = %addr, attempt = attempts, error = %e, "udp_bind_failed");
                    tokio::select! {
                        _ = tokio::time::sleep(config.udp_bind_retry()) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                return Err(UdpError::Shutdown);
                            }
                        }
                    }
                }
            }
        };

        if let Some(bytes) = config.udp_socket_recv_buffer_bytes() {
            let sock_ref = socket2::SockRef::from(&socket);
            if let Err(e) = sock_ref.set_recv_buffer_size(bytes) {
                warn!(requested = bytes, error = %e, "udp_recv_buffer_not_applied");
            }
        }

        let receiver = Self::from_socket(
            socket,
            config.udp_recv_buffer_size(),
            config.udp_retry_pause(),
            metrics,
        );
        info!(
            addr = %receiver.local_addr().map(|a| a.to_string()).unwrap_or_else(|_| addr.to_string()),
            attempts = attempts,
            "udp_receiver_bound"
        );
        Ok(receiver)
    }

    /// Wrap an already bound socket
    pub fn from_socket(
        socket: UdpSocket,
        recv_buffer_size: usize,
        retry_pause: Duration,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self { socket, buf: vec![0u8; recv_buffer_size], retry_pause, metrics }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Wait for the next datagram; errors are retried, never returned
    ///
    /// Cancel-safe: dropping the future loses no datagram.
    pub async fn recv(&mut self) -> Datagram {
        loop {
            match self.socket.recv_from(&mut self.buf).await {
                Ok((len, peer)) => {
                    self.metrics.record_datagram();
                    debug!(peer = %peer, len = len, "udp_datagram_received");
                    return Datagram {
                        payload: Bytes::copy_from_slice(&self.buf[..len]),
                        peer,
                        received_at: Instant::now(),
                    };
                }
                Err(e) => {
                    self.metrics.record_socket_error();
                    warn!(error = %e, retry_ms = self.retry_pause.as_millis() as u64, "udp_recv_failed");
                    tokio::time::sleep(self.retry_pause).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_receiver() -> (DatagramReceiver, Arc<IngestMetrics>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let metrics = Arc::new(IngestMetrics::new());
        let receiver =
            DatagramReceiver::from_socket(socket, 1024, Duration::from_millis(10), metrics.clone());
        (receiver, metrics)
    }

    #[tokio::test]
    async fn test_receives_datagram() {
        let (mut receiver, metrics) = loopback_receiver().await;
        let target = receiver.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[1, 2, 3, 4], target).await.unwrap();

        let datagram = tokio::time::timeout(Duration::from_secs(2), receiver.recv()).await.unwrap();
        assert_eq!(&datagram.payload[..], &[1, 2, 3, 4]);
        assert_eq!(datagram.peer, sender.local_addr().unwrap());
        assert_eq!(metrics.datagrams_total(), 1);
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_truncated_to_buffer() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let metrics = Arc::new(IngestMetrics::new());
        let mut receiver =
            DatagramReceiver::from_socket(socket, 40, Duration::from_millis(10), metrics);
        let target = receiver.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[7u8; 64], target).await.unwrap();

        let datagram = tokio::time::timeout(Duration::from_secs(2), receiver.recv()).await.unwrap();
        assert_eq!(datagram.payload.len(), 40);
    }

    #[tokio::test]
    async fn test_invalid_bind_address() {
        let config = Config::default().with_udp_bind_address("not-an-address");
        let (_tx, mut rx) = watch::channel(false);
        let result = DatagramReceiver::bind(&config, Arc::new(IngestMetrics::new()), &mut rx).await;
        assert!(matches!(result, Err(UdpError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_bind_retry_stops_on_shutdown() {
        // Occupy a port so binding it again fails
        let holder = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let taken = holder.local_addr().unwrap().to_string();
        let config = Config::default().with_udp_bind_address(&taken);

        let (tx, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            DatagramReceiver::bind(&config, Arc::new(IngestMetrics::new()), &mut rx).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(3), handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(UdpError::Shutdown)));
    }
}
