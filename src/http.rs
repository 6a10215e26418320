//! Transport primitives for backend API calls.
//!
//! The module exposes [`ApiTransport`] alongside [`ApiRequest`] and [`RawResponse`] so
//! downstream crates can integrate custom HTTP clients. The trait is the gateway's only
//! dependency on an HTTP stack: implementations execute one request, capture the status code
//! and any `Retry-After` hint, and hand the body back as bytes for the gateway to interpret.

// std
use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`ApiTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing backend API calls.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared behind `Arc` across
/// the gateway, the session manager, and any concurrent callers, and the futures they return
/// must be `Send` for the lifetime of the in-flight request.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes the request and resolves to the raw response.
	///
	/// Only transport-level failures (DNS, TCP, TLS, timeout) are errors here; every HTTP
	/// status, including 4xx/5xx, resolves to an `Ok` [`RawResponse`] for the caller to
	/// classify.
	fn send(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// HTTP methods the transport can carry.
///
/// The gateway's public surface only ever dispatches [`Method::Get`]; the remaining verbs
/// exist so the read-only policy has something concrete to reject and so the session manager
/// can post to the backend's auth endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
	/// HTTP GET, the only verb admitted by the gateway surface.
	Get,
	/// HTTP POST, used internally for login/refresh.
	Post,
	/// HTTP PUT.
	Put,
	/// HTTP PATCH.
	Patch,
	/// HTTP DELETE.
	Delete,
}
impl Method {
	/// Returns the canonical uppercase verb.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}

	/// Returns `true` for the read verb.
	pub const fn is_read(self) -> bool {
		matches!(self, Method::Get)
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// A single outbound request, fully resolved before it reaches the transport.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Header name/value pairs. Values may contain secrets; implementations must not log them.
	pub headers: Vec<(String, String)>,
	/// Query parameters appended to the URL.
	pub query: Vec<(String, String)>,
	/// Overall request deadline.
	pub timeout: Duration,
}
impl ApiRequest {
	/// Creates a request with no headers or query parameters.
	pub fn new(method: Method, url: Url, timeout: Duration) -> Self {
		Self { method, url, headers: Vec::new(), query: Vec::new(), timeout }
	}

	/// Appends a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Appends query parameters.
	pub fn with_query(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
		self.query.extend(params);

		self
	}
}

/// Raw response captured by a transport: status, body bytes, and the parsed `Retry-After`
/// hint when the backend supplied one.
#[derive(Clone, Debug)]
pub struct RawResponse {
	/// HTTP status code.
	pub status: u16,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl RawResponse {
	const PREVIEW_LEN: usize = 512;

	/// Creates a response with no `Retry-After` hint.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, retry_after: None, body: body.into() }
	}

	/// Returns `true` for any 2xx status.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns a lossy, bounded view of the body for error payloads and diagnostics.
	pub fn body_preview(&self) -> String {
		let text = String::from_utf8_lossy(&self.body);

		match text.char_indices().nth(Self::PREVIEW_LEN) {
			Some((idx, _)) => format!("{}…", &text[..idx]),
			None => text.into_owned(),
		}
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// The wrapped client is used for every backend call, auth endpoints included. Configure any
/// custom [`ReqwestClient`] without redirect following; the backend's auth endpoints return
/// results directly instead of delegating to another URI, and silently following a redirect
/// would leak the `Authorization` header to wherever it points.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				Method::Get => reqwest::Method::GET,
				Method::Post => reqwest::Method::POST,
				Method::Put => reqwest::Method::PUT,
				Method::Patch => reqwest::Method::PATCH,
				Method::Delete => reqwest::Method::DELETE,
			};
			let mut builder = client
				.request(method, request.url)
				.query(&request.query)
				.timeout(request.timeout.unsigned_abs());

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}

			let response = builder.send().await.map_err(TransportError::from)?;
			let status = response.status().as_u16();
			let retry_after = parse_retry_after(response.headers());
			let body = response.bytes().await.map_err(TransportError::from)?.to_vec();

			Ok(RawResponse { status, retry_after, body })
		})
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn read_whitelist_admits_only_get() {
		assert!(Method::Get.is_read());
		assert!(!Method::Post.is_read());
		assert!(!Method::Put.is_read());
		assert!(!Method::Patch.is_read());
		assert!(!Method::Delete.is_read());
	}

	#[test]
	fn body_preview_truncates_long_bodies() {
		let response = RawResponse::new(500, "x".repeat(2048).into_bytes());
		let preview = response.body_preview();

		assert!(preview.chars().count() <= 513);
		assert!(preview.ends_with('…'));

		let short = RawResponse::new(500, b"oops".to_vec());

		assert_eq!(short.body_preview(), "oops");
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn retry_after_parses_delta_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, "60".parse().expect("Header fixture should be valid."));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(60)));

		headers.insert(RETRY_AFTER, "later".parse().expect("Header fixture should be valid."));

		assert_eq!(parse_retry_after(&headers), None);
	}
}
