//! Shared test helpers for remote API integration tests
//!
//! Each helper mounts the necessary mock endpoints and returns a configured
//! client pointing at the mock server.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ledgersync_remote::client::HttpRemoteApi;

pub const TEST_TOKEN: &str = "test-access-token";

/// Starts a mock server and returns a client with a bearer token for it
pub async fn setup_remote_mock() -> (MockServer, HttpRemoteApi) {
    let server = MockServer::start().await;
    let api = HttpRemoteApi::with_base_url(server.uri())
        .expect("mock server URI is valid")
        .with_access_token(TEST_TOKEN);
    (server, api)
}

/// Mounts `GET /api/health` answering with `status`
pub async fn mount_health(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Returns a client pointing at a local port nothing listens on
pub fn unreachable_api() -> HttpRemoteApi {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    HttpRemoteApi::with_base_url(format!("http://127.0.0.1:{port}")).expect("valid URL")
}
