pub(crate) mod udp_client;

use std::future::Future;

use async_channel::Sender;

use crate::error::TransportError;

pub use udp_client::UdpTransport;

/// Fallible, FIFO packet hand-off to the network.
pub trait Transport: Send + 'static {
    fn send(&mut self, packet: Vec<u8>) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Queue packets for a socket task owned elsewhere.
impl Transport for Sender<Vec<u8>> {
    async fn send(&mut self, packet: Vec<u8>) -> Result<(), TransportError> {
        Sender::send(&*self, packet)
            .await
            .map_err(|_| TransportError::Closed)
    }
}
