//! Shared HTTP client construction for embedding backends.

use std::time::Duration;

/// Create the HTTP client used by remote embedding backends.
///
/// 10s connect timeout, request timeout from config, rustls TLS, `sift/{version}` user-agent.
#[must_use]
pub fn default_client(request_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(request_timeout)
        .user_agent(concat!("sift/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("default HTTP client construction must not fail")
}
