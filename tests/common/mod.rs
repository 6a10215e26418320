#![allow(dead_code)]

// crates.io
use httpmock::MockServer;
// self
use restgate::{
	auth::Credentials,
	config::BackendDescriptor,
	gateway::{Gateway, ReqwestGateway},
	http::ReqwestTransport,
	url::Url,
};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const FUTURE_EXPIRY: &str = "2099-01-01T00:00:00Z";

/// Builds a JSON session payload with a far-future expiry.
pub fn session_body(token: &str) -> String {
	format!("{{\"token\":\"{token}\",\"expiresAt\":\"{FUTURE_EXPIRY}\"}}")
}

/// Builds a reqwest transport that accepts the self-signed certificates produced by `httpmock`.
pub fn insecure_transport() -> ReqwestTransport {
	let client = restgate::reqwest::Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure reqwest client for tests.");

	ReqwestTransport::with_client(client)
}

/// Constructs a gateway wired to the mock server with default admission-control limits.
pub fn build_gateway(server: &MockServer) -> ReqwestGateway {
	let base =
		Url::parse(&server.base_url()).expect("Mock server base URL should parse successfully.");
	let descriptor = BackendDescriptor::builder(base)
		.login_endpoint(LOGIN_PATH)
		.refresh_endpoint(REFRESH_PATH)
		.build()
		.expect("Descriptor should build against the mock server.");
	let credentials =
		Credentials::new("admin", "hunter2").expect("Credential fixture should be valid.");

	Gateway::with_transport(descriptor, credentials, insecure_transport())
}
