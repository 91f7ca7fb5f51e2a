//! cdns
//!
//! A small authoritative DNS server for solving [RFC-8555][RFC-8555] [DNS-01] challenges.
//!
//! Delegate `_acme-challenge.<domain>` (or the whole domain) to cdns, then let an ACME client
//! present and clean up challenge values through the [`ChallengeProvider`] contract, either
//! in-process via [`ChallengeBridge`] or over the [HTTP API][crate::api].
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//!
#![warn(clippy::pedantic)]

pub mod api;
pub mod challenge;
pub mod config;
pub mod dns;
pub mod error;

pub use api::new as new_http;
pub use challenge::{ChallengeBridge, ChallengeProvider, DynChallengeProvider};
pub use config::{Config, Shared};
pub use dns::ServerGroup;
