//! Authoritative DNS for a single domain.
//!
//! Each [`Listener`] serves its own [`Zone`] over one transport. A [`ServerGroup`] builds the
//! listeners for the configured `dns_protocol` and starts and stops them together.
//!
//! # Dynamic TXT Records
//!
//! A `TXT` type query for `_acme-challenge.<domain>` is always answered with exactly one
//! record, TTL 1 second, holding the current [RFC-8555][RFC-8555] [DNS-01] challenge value as
//! presented through a [`ChallengeProvider`][crate::challenge::ChallengeProvider]. Before the
//! first present and after a clean up the value is the empty string.
//!
//! E.g. with config:
//! ```json
//! {
//!   "domain": "acme.example.com",
//!   "ns_name": "ns1.example.com",
//!   ...
//! }
//! ```
//!
//! after `POST`ing `{"token":"LPsIwTo7o8BoG0-vjCyGQGBWSVIPxI-i_X336eUOQZo"}` to the
//! [`/present` API endpoint][crate::api]:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 +tcp +short _acme-challenge.acme.example.com TXT
//! "LPsIwTo7o8BoG0-vjCyGQGBWSVIPxI-i_X336eUOQZo"
//! ```
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//!
//! # Synthesized Records
//!
//! Names without a stored record still get answers for two record types:
//!
//! * `A`: [`Config::ns_ip`][`crate::config::Config::ns_ip`] for the name server itself,
//!   [`Config::ingress_ip`][`crate::config::Config::ingress_ip`] for every other name.
//! * `NS`: [`Config::ns_name`][`crate::config::Config::ns_name`].
//!
//! # SOA
//!
//! The zone holds one `SOA` record built from
//! [`Config::ns_name`][`crate::config::Config::ns_name`] and
//! [`Config::ns_admin`][`crate::config::Config::ns_admin`], with a serial taken from the UTC
//! time the zone was built:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 acme.example.com +short SOA
//! ns1.example.com. admin.example.com. 2023031215 28800 7200 604800 86400
//! ```
//!
//! It is also placed in the authority section of `NXDOMAIN` replies for names the zone is
//! authoritative for.
//!
//! # Static Records
//!
//! `A`, `NS`, `CNAME` and `TXT` records listed in
//! [`Config::records`][`crate::config::Config::records`] are served as-is. They don't change at
//! runtime and can't be influenced by the [HTTP API][crate::api]. A name with a `CNAME` but no
//! record of the queried type is answered with the `CNAME`.

pub mod handlers;
pub mod listener;
pub mod record;
pub mod server;
pub mod zone;

pub use handlers::Handler;
pub use listener::Listener;
pub use server::ServerGroup;
pub use zone::Zone;
