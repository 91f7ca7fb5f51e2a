//! Error types.

use axum::extract::rejection::JsonRejection;
use std::net::{IpAddr, SocketAddr};
use trust_dns_proto::error::ProtoError;

use crate::config::Transport;

/// Error enumerates the possible cdns error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when clients `POST` invalid JSON to the [HTTP API][crate::api].
    #[error(transparent)]
    JsonExtractorRejection(#[from] JsonRejection),

    /// Returned when clients `POST` an empty challenge token to the `/present` endpoint.
    #[error("challenge token must not be empty")]
    EmptyToken,

    /// Returned when the [`Config::api_bind_addr`][`crate::config::Config::api_bind_addr`] is
    /// not a loopback address, or an address within a private network space. The
    /// `/present` and `/cleanup` endpoints are unauthenticated and must only be reachable
    /// from trusted networks.
    #[error("API bind address ({0}) must be a loopback or private IP")]
    InsecureAPIBind(IpAddr),

    /// Returned when the `dns_protocol` setting isn't one of `udp`, `tcp` or `both`, optionally
    /// suffixed with `4` or `6`.
    #[error("invalid DNS protocol \"{0}\"")]
    InvalidProtocol(String),

    /// Returned when a listener is restricted to one IP family but configured with a bind
    /// address from the other.
    #[error("{transport} listener can't bind to {addr}")]
    TransportFamilyMismatch {
        transport: Transport,
        addr: SocketAddr,
    },

    /// Returned when an entry of [`Config::records`][`crate::config::Config::records`] can't be
    /// turned into a resource record.
    #[error("invalid static {rtype} record for \"{name}\": {reason}")]
    InvalidStaticRecord {
        name: String,
        rtype: String,
        reason: String,
    },

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred: {0}")]
    IO(#[from] std::io::Error),

    /// Returned when processing JSON from disk (e.g. when
    /// [trying to load a `Config`][crate::config::Config::try_from_file]) fails due to invalid
    /// JSON content.
    #[error("invalid JSON: {0}")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when a DNS protocol error occurs, e.g. an unparseable domain name.
    #[error("DNS error: {0}")]
    DNSError(#[from] ProtoError),

    /// Returned when a spawned listener task panics or is aborted.
    #[error("listener task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
