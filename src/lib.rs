//! splitdns - a split-horizon DNS forwarder.
//!
//! Queries for configured domains go to custom upstream servers first;
//! everything else goes to the servers the host resolver configuration
//! lists. The library exposes the pieces for tests and benchmarks.

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod dns;
pub mod error;
pub mod proxy;
pub mod resolver_files;
pub mod stats;
pub mod system_dns;
pub mod transport;
pub mod upstream;
