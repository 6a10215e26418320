//! Rust’s turnkey resilient REST transport—budgeted session refresh, token-bucket admission
//! control, and lossless pagination in one crate built for rate-limited backends.
//!
//! The crate fronts a credential-authenticated backend whose tokens expire, may only be
//! refreshed a bounded number of times before a full re-login, and whose API enforces both a
//! request-rate ceiling and a concurrent-connection ceiling. [`Gateway`](gateway::Gateway)
//! composes the pieces: [`SessionManager`](auth::SessionManager) owns the token lifecycle,
//! [`RateLimiter`](limit::RateLimiter) gates every outbound call, and
//! [`fetch_all`](gateway::Gateway::fetch_all) drains offset-paginated listings into one ordered
//! collection. All operations require a tokio runtime.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod limit;
pub mod obs;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	use crate::{
		error::TransportError,
		http::{ApiRequest, ApiTransport, RawResponse, TransportFuture},
	};

	/// Queue-backed [`ApiTransport`] double that replays scripted responses in order and records
	/// every request it sees. Deterministic stand-in for a live backend in state-machine tests.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		responses: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
		requests: Mutex<Vec<ApiRequest>>,
	}
	impl ScriptedTransport {
		/// Queues a response to be returned by the next unserved [`ApiTransport::send`] call.
		pub fn push_response(&self, response: RawResponse) {
			self.responses.lock().push_back(Ok(response));
		}

		/// Queues a transport-level failure.
		pub fn push_error(&self, error: TransportError) {
			self.responses.lock().push_back(Err(error));
		}

		/// Returns every request dispatched so far, in order.
		pub fn recorded(&self) -> Vec<ApiRequest> {
			self.requests.lock().clone()
		}
	}
	impl ApiTransport for ScriptedTransport {
		fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
			let next = self.responses.lock().pop_front();

			self.requests.lock().push(request);

			Box::pin(async move {
				next.unwrap_or_else(|| {
					Err(TransportError::Io(std::io::Error::other("scripted transport exhausted")))
				})
			})
		}
	}

	/// Builds a JSON session payload in the shape the backend's login/refresh endpoints return.
	pub fn session_payload(token: &str, expires_at: &str) -> RawResponse {
		RawResponse::new(
			200,
			format!("{{\"token\":\"{token}\",\"expiresAt\":\"{expires_at}\"}}").into_bytes(),
		)
	}

	#[cfg(feature = "reqwest")]
	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_transport() -> crate::http::ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		crate::http::ReqwestTransport::with_client(client)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::Deserialize;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
