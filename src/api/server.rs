use crate::api::routes;
use crate::challenge::DynChallengeProvider;
use crate::config::Shared;
use std::future::Future;

#[derive(Clone)]
pub(super) struct AppState {
    pub config: Shared,
    pub challenge: DynChallengeProvider,
}

/// Serve the HTTP API on [`Config::api_bind_addr`][`crate::config::Config::api_bind_addr`]
/// until the returned future is dropped or fails.
pub fn new(
    config: Shared,
    challenge: DynChallengeProvider,
) -> impl Future<Output = hyper::Result<()>> {
    axum::Server::bind(&config.api_bind_addr)
        .serve(routes::new(AppState { config, challenge }).into_make_service())
}
