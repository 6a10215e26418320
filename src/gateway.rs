//! The gateway orchestrator: read-only backend calls behind admission control and a managed
//! session.
//!
//! [`Gateway`] owns the transport, the session manager, and the rate limiter so callers only
//! ever see two operations: [`execute`](Gateway::execute) for single reads and
//! [`fetch_all`](Gateway::fetch_all) for paginated listings. Every call follows the same
//! sequence: take an admission lease, obtain a valid token, dispatch, interpret the status.
//! The only failure recovered internally is a single 401, via one token recovery and one
//! retry; everything else propagates unchanged.

pub mod paginate;

pub use paginate::*;

// crates.io
use serde::de::DeserializeOwned;
// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;
use crate::{
	_prelude::*,
	auth::{AccessToken, Credentials, SessionManager},
	config::BackendDescriptor,
	error::DecodeError,
	http::{ApiRequest, ApiTransport, Method, RawResponse},
	limit::RateLimiter,
	obs::{self, CallKind, CallOutcome, CallSpan},
};

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport stack.
pub type ReqwestGateway = Gateway<ReqwestTransport>;

/// Coordinates read-only calls against a single backend descriptor.
///
/// The gateway owns one [`SessionManager`] and one [`RateLimiter`] for the process and shares
/// them across every clone, so all concurrent callers observe the same session generation and
/// drain the same rate budget. It enforces the read-only policy: any verb other than GET is
/// rejected before admission control or session work happens.
pub struct Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Transport used for every outbound backend request.
	pub transport: Arc<T>,
	/// Backend descriptor the gateway fronts.
	pub descriptor: BackendDescriptor,
	/// Session manager owning the token lifecycle.
	pub session: SessionManager<T>,
	/// Admission control shared by every caller.
	pub limiter: Arc<RateLimiter>,
}
impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a gateway that reuses the caller-provided transport.
	pub fn with_transport(
		descriptor: BackendDescriptor,
		credentials: Credentials,
		transport: impl Into<Arc<T>>,
	) -> Self {
		let transport = transport.into();
		let session = SessionManager::new(transport.clone(), descriptor.clone(), credentials);
		let limiter = Arc::new(RateLimiter::from_descriptor(&descriptor));

		Self { transport, descriptor, session, limiter }
	}

	/// Returns a valid session token, authenticating first if required.
	///
	/// Rarely needed directly; [`execute`](Gateway::execute) and
	/// [`fetch_all`](Gateway::fetch_all) manage the session on their own.
	pub async fn ensure_session(&self) -> Result<AccessToken> {
		self.session.ensure_token().await
	}

	/// Performs one read call and returns the raw 2xx response.
	///
	/// Non-read verbs fail with [`Error::ProtocolViolation`] before any admission-control or
	/// network work. A 401 is recovered once through the session manager and the call is
	/// retried exactly once; 429 surfaces as [`Error::RateLimited`] with the backend's
	/// Retry-After hint, any other non-2xx as [`Error::Http`].
	pub async fn call(
		&self,
		method: Method,
		endpoint: &str,
		params: &[(String, String)],
	) -> Result<RawResponse> {
		const KIND: CallKind = CallKind::Request;

		if !method.is_read() {
			return Err(Error::ProtocolViolation { method });
		}

		let span = CallSpan::new(KIND, "call");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span.instrument(self.admitted_call(method, endpoint, params)).await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	/// Performs one read call and decodes the 2xx body as JSON.
	pub async fn execute(
		&self,
		method: Method,
		endpoint: &str,
		params: &[(String, String)],
	) -> Result<serde_json::Value> {
		let response = self.call(method, endpoint, params).await?;

		decode_json(&response)
	}

	async fn admitted_call(
		&self,
		method: Method,
		endpoint: &str,
		params: &[(String, String)],
	) -> Result<RawResponse> {
		let url = self.descriptor.endpoint_url(endpoint)?;
		// The lease is held across the retry so a recovered call cannot overshoot the
		// concurrency ceiling; it is released by drop on every path out of this function.
		let _lease = self.limiter.acquire().await;

		obs::record_rate_saturation(self.limiter.saturation());

		let grant = self.session.ensure_token().await?;
		let response = self.dispatch(method, url.clone(), params, &grant).await?;
		let response = if response.status == 401 {
			let fresh = self.session.recover_unauthorized(grant.epoch).await?;
			let retried = self.dispatch(method, url, params, &fresh).await?;

			if retried.status == 401 {
				return Err(Error::Auth {
					reason: "backend rejected a freshly issued token".into(),
				});
			}

			retried
		} else {
			response
		};

		match response.status {
			_ if response.is_success() => Ok(response),
			429 => Err(Error::RateLimited { retry_after: response.retry_after }),
			status => Err(Error::Http { status, body: response.body_preview() }),
		}
	}

	async fn dispatch(
		&self,
		method: Method,
		url: Url,
		params: &[(String, String)],
		grant: &AccessToken,
	) -> Result<RawResponse> {
		let request = ApiRequest::new(method, url, self.descriptor.request_timeout)
			.with_header("authorization", format!("Bearer {}", grant.secret.expose()))
			.with_query(params.iter().cloned());

		Ok(self.transport.send(request).await?)
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestTransport> {
	/// Creates a gateway with its own reqwest-backed transport.
	pub fn new(descriptor: BackendDescriptor, credentials: Credentials) -> Self {
		Self::with_transport(descriptor, credentials, ReqwestTransport::default())
	}
}
impl<T> Clone for Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			descriptor: self.descriptor.clone(),
			session: self.session.clone(),
			limiter: self.limiter.clone(),
		}
	}
}
impl<T> Debug for Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("base_url", &self.descriptor.base_url.as_str())
			.field("session", &self.session)
			.field("rate_saturation", &self.limiter.saturation())
			.finish()
	}
}

/// Decodes a 2xx response body, attaching the JSON path on failure.
pub(crate) fn decode_json<P>(response: &RawResponse) -> Result<P>
where
	P: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(&response.body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| DecodeError::Json { source, status: Some(response.status) }.into())
}
