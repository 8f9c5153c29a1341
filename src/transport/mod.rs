//! Transport layer.
//!
//! `udp` receives queries from local clients; `upstream` forwards them to
//! upstream servers.

pub mod udp;
pub mod upstream;

/// Largest DNS message a UDP datagram can carry. EDNS upstreams may answer
/// well past 512 or 4096 bytes.
pub const MAX_DNS_PACKET_SIZE: usize = 65535;
