//! HTTP API for provisioning the ACME challenge.
//!
//! Every response uses the same JSON envelope, with the HTTP status repeated in `code`:
//!
//! ```json
//! { "code": 200, "message": "Success", "data": {} }
//! ```
//!
//! # API Endpoints
//!
//! ## `/health` (GET)
//!
//!   Returns HTTP 200 (OK) and an empty success envelope when the service is operational.
//!
//! ## `/present` (POST)
//!
//!   Expects a JSON request body of the form:
//!
//!   ```json
//!   { "token": "LPsIwTo7o8BoG0-vjCyGQGBWSVIPxI-i_X336eUOQZo" }
//!   ```
//!
//!   The `token` becomes the `TXT` answer for `_acme-challenge.<domain>` on every DNS listener,
//!   replacing any previous value. It must not be empty. The success envelope echoes the token
//!   in `data`.
//!
//! ## `/cleanup` (POST)
//!
//!   Withdraws the challenge value. Cleaning up when nothing is presented succeeds too.
//!
//! No authentication is performed. The API must only be bound to loopback or private
//! addresses, see [`Config::api_bind_addr`][`crate::config::Config::api_bind_addr`].

mod api_error;
mod model;
mod routes;
pub mod server;

pub use server::new;
