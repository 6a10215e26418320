//! Gateway-level error types shared across the session, admission, and pagination layers.

// self
use crate::{_prelude::*, http::Method};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credentials were rejected or a login/refresh transition failed.
	#[error("Authentication failed: {reason}.")]
	Auth {
		/// Backend- or gateway-supplied reason string.
		reason: String,
	},
	/// The session previously entered its terminal failed state; every call short-circuits
	/// until the process is restarted with fresh credentials.
	#[error("Session is exhausted; a restart with valid credentials is required.")]
	SessionExhausted,
	/// The backend itself reported a request-rate overrun. Local throttling never surfaces as
	/// an error; it only delays.
	#[error("Backend reported a rate-limit overrun.")]
	RateLimited {
		/// Retry-After hint from the backend, if supplied.
		retry_after: Option<Duration>,
	},
	/// Any non-2xx response other than 401/429.
	#[error("Backend returned HTTP {status}.")]
	Http {
		/// HTTP status code.
		status: u16,
		/// Response body preview.
		body: String,
	},
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Pagination safety cap exceeded or paging metadata is inconsistent with the returned
	/// items.
	#[error("Pagination aborted: {reason}.")]
	DataIntegrity {
		/// Description of the inconsistency.
		reason: String,
	},
	/// A disallowed HTTP method was attempted against the read-only backend surface.
	#[error("Method {method} is not permitted; this gateway is read-only.")]
	ProtocolViolation {
		/// The rejected method.
		method: Method,
	},
	/// An endpoint path could not be joined onto the backend base URL.
	#[error("Endpoint produced an invalid URL.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A 2xx response body could not be decoded.
	#[error(transparent)]
	Decode(#[from] DecodeError),
}

/// Transport-level failures (network, IO). Timeouts are network failures; they never count
/// against the session's refresh budget.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the backend.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the backend.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Decoding failures raised while interpreting 2xx response bodies.
#[derive(Debug, ThisError)]
pub enum DecodeError {
	/// Response body is not the expected JSON shape.
	#[error("Backend returned malformed JSON.")]
	Json {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Response carried a timestamp that could not be parsed.
	#[error("Backend returned an invalid timestamp.")]
	Timestamp {
		/// Underlying parsing failure.
		#[source]
		source: time::error::Parse,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn transport_error_converts_with_source() {
		let io = std::io::Error::other("socket closed");
		let error: Error = TransportError::from(io).into();

		assert!(matches!(error, Error::Transport(TransportError::Io(_))));
		assert!(
			StdError::source(&error)
				.expect("Transport errors should expose the underlying failure as their source.")
				.to_string()
				.contains("socket closed")
		);
	}

	#[test]
	fn protocol_violation_names_the_method() {
		let error = Error::ProtocolViolation { method: Method::Delete };

		assert_eq!(error.to_string(), "Method DELETE is not permitted; this gateway is read-only.");
	}
}
