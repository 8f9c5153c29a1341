//! Client side of forwarding: one UDP round trip to an upstream server.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::net::UdpSocket;
use tracing::debug;

use super::MAX_DNS_PACKET_SIZE;
use crate::error::ForwardError;
use crate::upstream::UpstreamServer;

/// Standard DNS port upstream servers are contacted on.
pub const DNS_PORT: u16 = 53;

/// Per-attempt timeout, matching the usual stub resolver default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Sends a raw query to one upstream and returns its parsed reply.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn exchange(
        &self,
        server: &UpstreamServer,
        query: &[u8],
    ) -> Result<Message, ForwardError>;
}

/// Plain DNS over UDP with a bounded timeout per attempt.
pub struct UdpExchange {
    port: u16,
    timeout: Duration,
}

impl UdpExchange {
    pub fn new(timeout: Duration) -> Self {
        Self {
            port: DNS_PORT,
            timeout,
        }
    }

    /// Contact upstreams on `port` instead of 53.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    async fn round_trip(&self, server: &UpstreamServer, query: &[u8]) -> Result<Message, ForwardError> {
        let addr = match server.socket_addr(self.port) {
            Some(addr) => addr?,
            None => tokio::net::lookup_host(server.target(self.port))
                .await?
                .next()
                .ok_or_else(|| ForwardError::Unresolvable(server.to_string()))?,
        };

        let bind_addr: SocketAddr = if addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(addr).await?;

        let sent = socket.send(query).await?;
        debug!(server = %addr, bytes_sent = sent, "UDP query sent");

        let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];
        let len = socket.recv(&mut buf).await?;
        buf.truncate(len);
        debug!(server = %addr, bytes_received = len, "UDP response received");

        let reply = Message::from_vec(&buf)?;
        if query.len() >= 2 {
            let expected = u16::from_be_bytes([query[0], query[1]]);
            if reply.id() != expected {
                return Err(ForwardError::IdMismatch {
                    expected,
                    got: reply.id(),
                });
            }
        }
        Ok(reply)
    }
}

impl Default for UdpExchange {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Exchange for UdpExchange {
    async fn exchange(
        &self,
        server: &UpstreamServer,
        query: &[u8],
    ) -> Result<Message, ForwardError> {
        tokio::time::timeout(self.timeout, self.round_trip(server, query))
            .await
            .map_err(|_| ForwardError::Timeout(self.timeout.as_millis()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{MessageType, Query};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Name, RData, Record, RecordType};
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn query_bytes(id: u16) -> Vec<u8> {
        let mut msg = Message::new();
        msg.set_id(id).set_message_type(MessageType::Query);
        msg.add_query(Query::query(Name::from_str("example.com.").unwrap(), RecordType::A));
        msg.to_vec().unwrap()
    }

    async fn echo_server(reply_id: Option<u16>) -> u16 {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, src) = socket.recv_from(&mut buf).await.unwrap();
            let mut reply = Message::from_vec(&buf[..len]).unwrap();
            reply.set_message_type(MessageType::Response);
            if let Some(id) = reply_id {
                reply.set_id(id);
            }
            socket.send_to(&reply.to_vec().unwrap(), src).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn exchange_returns_parsed_reply() {
        let port = echo_server(None).await;
        let exchange = UdpExchange::default().with_port(port);

        let reply = exchange
            .exchange(&UpstreamServer::system("127.0.0.1"), &query_bytes(7))
            .await
            .unwrap();
        assert_eq!(reply.id(), 7);
        assert_eq!(reply.message_type(), MessageType::Response);
    }

    #[tokio::test]
    async fn mismatched_id_is_an_error() {
        let port = echo_server(Some(99)).await;
        let exchange = UdpExchange::default().with_port(port);

        let err = exchange
            .exchange(&UpstreamServer::system("127.0.0.1"), &query_bytes(7))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::IdMismatch { expected: 7, got: 99 }));
    }

    #[tokio::test]
    async fn large_edns_reply_is_not_truncated() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, src) = socket.recv_from(&mut buf).await.unwrap();
            let mut reply = Message::from_vec(&buf[..len]).unwrap();
            reply.set_message_type(MessageType::Response);
            let name = reply.queries()[0].name().clone();
            for i in 0..400u32 {
                let addr = Ipv4Addr::from(0x0a00_0000 | i);
                reply.add_answer(Record::from_rdata(name.clone(), 300, RData::A(A(addr))));
            }
            let bytes = reply.to_vec().unwrap();
            assert!(bytes.len() > 4096);
            socket.send_to(&bytes, src).await.unwrap();
        });
        let exchange = UdpExchange::default().with_port(port);

        let reply = exchange
            .exchange(&UpstreamServer::system("127.0.0.1"), &query_bytes(7))
            .await
            .unwrap();
        assert_eq!(reply.answers().len(), 400);
    }

    #[tokio::test]
    async fn silent_upstream_times_out() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let exchange = UdpExchange::new(Duration::from_millis(50)).with_port(port);

        let err = exchange
            .exchange(&UpstreamServer::system("127.0.0.1"), &query_bytes(7))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Timeout(50)));
        drop(socket);
    }
}
