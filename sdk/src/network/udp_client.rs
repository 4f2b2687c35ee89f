use async_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error};

use crate::error::TransportError;
use crate::network::Transport;

/// Connected UDP socket towards the voice server
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind an ephemeral local port and connect it to `addr`
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;

        debug!("UDP connected to {}", addr);

        Ok(Self::from_socket(Arc::new(socket)))
    }

    /// Wrap an already connected socket
    pub fn from_socket(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawn a task draining a queue into the socket, so several dispatchers
    /// can share it. The task stops once every sender is dropped or a send fails.
    pub fn spawn_queue(&self) -> Sender<Vec<u8>> {
        let (send_tx, send_rx) = unbounded();
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            loop {
                if let Err(e) = Self::handle_outgoing(&socket, &send_rx).await {
                    debug!("UDP send queue stopped: {}", e);
                    break;
                }
            }
        });

        send_tx
    }

    /// Handle one queued packet
    async fn handle_outgoing(
        socket: &UdpSocket,
        send_rx: &Receiver<Vec<u8>>,
    ) -> Result<(), TransportError> {
        let packet = send_rx.recv().await.map_err(|_| TransportError::Closed)?;
        socket.send(&packet).await.map_err(|e| {
            error!("UDP send error: {}", e);
            TransportError::Io(e)
        })?;
        Ok(())
    }
}

impl Transport for UdpTransport {
    async fn send(&mut self, packet: Vec<u8>) -> Result<(), TransportError> {
        self.socket.send(&packet).await?;
        Ok(())
    }
}
