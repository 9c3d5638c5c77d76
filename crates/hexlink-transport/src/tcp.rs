//! TCP transport: one [`Channel`] per accepted socket.

use std::net::SocketAddr;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;

use crate::{Channel, ChannelConfig, Transport, TransportError};

/// A TCP-based [`Transport`] that listens for incoming peers.
pub struct TcpTransport {
    listener: TcpListener,
    config: ChannelConfig,
    shutdown: watch::Sender<bool>,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        Self::bind_with_config(addr, ChannelConfig::default()).await
    }

    /// Binds a new TCP transport whose channels use `config`.
    pub async fn bind_with_config(
        addr: impl ToSocketAddrs,
        config: ChannelConfig,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let (shutdown, _) = watch::channel(false);
        if let Ok(local) = listener.local_addr() {
            tracing::info!(%local, "TCP transport listening");
        }
        Ok(Self {
            listener,
            config,
            shutdown,
        })
    }

    /// The address actually bound (useful after binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

impl Transport for TcpTransport {
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Channel, Self::Error> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(shut_down());
        }

        let (stream, addr) = tokio::select! {
            accepted = self.listener.accept() => accepted.map_err(TransportError::AcceptFailed)?,
            _ = shutdown.wait_for(|stopped| *stopped) => return Err(shut_down()),
        };
        stream
            .set_nodelay(true)
            .map_err(TransportError::AcceptFailed)?;

        let channel = Channel::with_config(stream, self.config.clone());
        tracing::debug!(channel = %channel.id(), %addr, "accepted TCP peer");
        Ok(channel)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.shutdown.send_replace(true);
        tracing::info!("TCP transport shut down");
        Ok(())
    }
}

fn shut_down() -> TransportError {
    TransportError::AcceptFailed(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "transport shut down",
    ))
}
