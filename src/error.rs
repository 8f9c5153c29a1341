//! Error types, one enum per concern.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid startup parameters.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("--{0} must list at least one entry")]
    EmptyList(&'static str),

    #[error("invalid domain {0:?}: must be a plain domain name")]
    InvalidDomain(String),
}

/// Failures creating resolver files. All of these are fatal at startup.
#[derive(Error, Debug)]
pub enum ResolverFileError {
    #[error("cannot create resolver directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("cannot write resolver file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Failures reading the host resolver configuration.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("cannot open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

/// A single failed forwarding attempt.
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("cannot resolve upstream {0}")]
    Unresolvable(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out after {0}ms")]
    Timeout(u128),

    #[error("malformed reply: {0}")]
    Malformed(#[from] hickory_proto::error::ProtoError),

    #[error("reply id {got} does not match query id {expected}")]
    IdMismatch { expected: u16, got: u16 },
}
