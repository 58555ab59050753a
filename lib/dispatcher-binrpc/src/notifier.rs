//! UDP notifier asking Kamailio to reload its dispatcher list

use crate::codec::encode_request;
use async_trait::async_trait;
use dispatcher_core::{Notifier, NotifyError};
use std::net::SocketAddr;
use tokio::net::{lookup_host, UdpSocket};
use tracing::debug;

pub const RELOAD_METHOD: &str = "dispatcher.reload";

/// BinRpcNotifier sends a single unacknowledged BINRPC datagram per notify.
pub struct BinRpcNotifier {
    host: String,
    port: u16,
    method: String,
}

impl BinRpcNotifier {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            method: RELOAD_METHOD.to_string(),
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, NotifyError> {
        let target = || NotifyError::Resolve(format!("{}:{}", self.host, self.port));
        lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|_| target())?
            .next()
            .ok_or_else(target)
    }
}

#[async_trait]
impl Notifier for BinRpcNotifier {
    async fn notify(&self) -> Result<(), NotifyError> {
        let addr = self.resolve().await?;
        let packet = encode_request(&self.method, &[], rand::random())
            .map_err(|e| NotifyError::Encode(e.to_string()))?;

        let bind: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.send_to(&packet, addr).await?;

        debug!("Sent {} to {}", self.method, addr);
        Ok(())
    }
}
