use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL},
    redirect::Policy,
    Client,
};
use std::time::Duration;

const MAX_REDIRECTS: usize = 10;

/// Client used for HEAD probes. Idle connections are not kept: each probe
/// opens its own connection to a host it will most likely never see again.
/// Timeouts and the user agent are set per request.
pub fn create_probe_client() -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    Client::builder()
        .default_headers(headers)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .pool_max_idle_per_host(0)
        .tcp_nodelay(true)
        .use_rustls_tls()
        .build()
}

/// Client for fetching domain lists.
pub fn create_fetch_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .use_rustls_tls()
        .build()
}
