//! UDP listener for local DNS clients.
//!
//! Every datagram is handed to its own task, so a slow upstream only holds
//! up the query waiting on it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::MAX_DNS_PACKET_SIZE;
use crate::dispatcher::QueryDispatcher;

/// UDP transport for the forwarder.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the receive loop. Aborting the returned handle stops
    /// accepting new queries; tasks already dispatched run to completion.
    pub fn start(self, dispatcher: Arc<QueryDispatcher>) -> JoinHandle<()> {
        tokio::spawn(run(self.socket, dispatcher))
    }
}

async fn run(socket: Arc<UdpSocket>, dispatcher: Arc<QueryDispatcher>) {
    let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "UDP recv error");
                continue;
            }
        };

        let query = buf[..len].to_vec();
        let socket = socket.clone();
        let dispatcher = dispatcher.clone();

        tokio::spawn(async move {
            let Some(reply) = dispatcher.handle(&query).await else {
                debug!(client = %src, len, "dropping runt packet");
                return;
            };
            if let Err(e) = socket.send_to(&reply, src).await {
                warn!(client = %src, error = %e, "UDP response error");
            }
        });
    }
}
