//! Backend descriptors: validated connection metadata for one remote backend.
//!
//! [`BackendDescriptor`] captures everything the gateway needs to know about the API it
//! fronts: an HTTPS-only base URL, the auth endpoints, the per-request deadline, and the
//! externally imposed admission-control limits (request-rate ceiling and concurrent-call
//! ceiling). Construction goes through [`BackendDescriptorBuilder`], which rejects invalid
//! metadata up front so the runtime layers never have to re-validate it.

// self
use crate::_prelude::*;

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::seconds(60);
/// Default rate-bucket capacity (requests per rolling minute).
pub const DEFAULT_RATE_CAPACITY: u32 = 120;
/// Default bucket refill rate in tokens per second.
pub const DEFAULT_REFILL_PER_SECOND: f64 = 2.0;
/// Default ceiling on concurrent in-flight calls.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;

/// Validated description of one remote backend.
#[derive(Clone, Debug)]
pub struct BackendDescriptor {
	/// HTTPS base URL every endpoint path is joined onto.
	pub base_url: Url,
	/// Path of the login endpoint (full credential authentication).
	pub login_endpoint: String,
	/// Path of the token refresh endpoint.
	pub refresh_endpoint: String,
	/// Overall deadline applied to every request.
	pub request_timeout: Duration,
	/// Rate-bucket capacity; the backend's hard request budget.
	pub rate_capacity: u32,
	/// Bucket refill rate in tokens per second.
	pub refill_per_second: f64,
	/// Ceiling on concurrent in-flight calls.
	pub max_in_flight: usize,
}
impl BackendDescriptor {
	/// Returns a builder for the provided base URL.
	pub fn builder(base_url: Url) -> BackendDescriptorBuilder {
		BackendDescriptorBuilder {
			base_url,
			login_endpoint: None,
			refresh_endpoint: None,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			rate_capacity: DEFAULT_RATE_CAPACITY,
			refill_per_second: DEFAULT_REFILL_PER_SECOND,
			max_in_flight: DEFAULT_MAX_IN_FLIGHT,
		}
	}

	/// Joins an endpoint path onto the base URL.
	pub fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
		self.base_url.join(endpoint).map_err(|source| Error::InvalidEndpoint { source })
	}
}

/// Errors produced by [`BackendDescriptorBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum BackendDescriptorError {
	/// Base URL does not use the `https` scheme.
	#[error("Base URL must use https; got `{scheme}`.")]
	InsecureBaseUrl {
		/// The offending scheme.
		scheme: String,
	},
	/// Base URL has no host component.
	#[error("Base URL is missing a host.")]
	MissingHost,
	/// A required auth endpoint was not configured.
	#[error("The {endpoint} endpoint is required.")]
	MissingEndpoint {
		/// Endpoint label (login, refresh).
		endpoint: &'static str,
	},
	/// An endpoint path does not start with `/`.
	#[error("The {endpoint} endpoint must be an absolute path starting with `/`.")]
	RelativeEndpoint {
		/// Endpoint label (login, refresh).
		endpoint: &'static str,
	},
	/// Rate capacity must admit at least one request.
	#[error("Rate capacity must be positive.")]
	ZeroRateCapacity,
	/// Refill rate must be positive and finite.
	#[error("Refill rate must be positive and finite.")]
	InvalidRefillRate,
	/// Concurrency ceiling must admit at least one call.
	#[error("Concurrency ceiling must be positive.")]
	ZeroMaxInFlight,
	/// Request timeout must be positive.
	#[error("Request timeout must be positive.")]
	NonPositiveTimeout,
}

/// Builder for [`BackendDescriptor`].
#[derive(Clone, Debug)]
pub struct BackendDescriptorBuilder {
	base_url: Url,
	login_endpoint: Option<String>,
	refresh_endpoint: Option<String>,
	request_timeout: Duration,
	rate_capacity: u32,
	refill_per_second: f64,
	max_in_flight: usize,
}
impl BackendDescriptorBuilder {
	/// Sets the login endpoint path.
	pub fn login_endpoint(mut self, path: impl Into<String>) -> Self {
		self.login_endpoint = Some(path.into());

		self
	}

	/// Sets the token refresh endpoint path.
	pub fn refresh_endpoint(mut self, path: impl Into<String>) -> Self {
		self.refresh_endpoint = Some(path.into());

		self
	}

	/// Overrides the per-request deadline (defaults to 60 seconds).
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the rate-bucket capacity (defaults to 120).
	pub fn rate_capacity(mut self, capacity: u32) -> Self {
		self.rate_capacity = capacity;

		self
	}

	/// Overrides the bucket refill rate in tokens per second (defaults to 2.0).
	pub fn refill_per_second(mut self, rate: f64) -> Self {
		self.refill_per_second = rate;

		self
	}

	/// Overrides the concurrent-call ceiling (defaults to 10).
	pub fn max_in_flight(mut self, ceiling: usize) -> Self {
		self.max_in_flight = ceiling;

		self
	}

	/// Validates the configuration and produces a [`BackendDescriptor`].
	pub fn build(self) -> Result<BackendDescriptor, BackendDescriptorError> {
		if self.base_url.scheme() != "https" {
			return Err(BackendDescriptorError::InsecureBaseUrl {
				scheme: self.base_url.scheme().to_owned(),
			});
		}
		if self.base_url.host_str().is_none() {
			return Err(BackendDescriptorError::MissingHost);
		}

		let login_endpoint = validate_endpoint("login", self.login_endpoint)?;
		let refresh_endpoint = validate_endpoint("refresh", self.refresh_endpoint)?;

		if self.rate_capacity == 0 {
			return Err(BackendDescriptorError::ZeroRateCapacity);
		}
		if !self.refill_per_second.is_finite() || self.refill_per_second <= 0.0 {
			return Err(BackendDescriptorError::InvalidRefillRate);
		}
		if self.max_in_flight == 0 {
			return Err(BackendDescriptorError::ZeroMaxInFlight);
		}
		if !self.request_timeout.is_positive() {
			return Err(BackendDescriptorError::NonPositiveTimeout);
		}

		Ok(BackendDescriptor {
			base_url: self.base_url,
			login_endpoint,
			refresh_endpoint,
			request_timeout: self.request_timeout,
			rate_capacity: self.rate_capacity,
			refill_per_second: self.refill_per_second,
			max_in_flight: self.max_in_flight,
		})
	}
}

fn validate_endpoint(
	label: &'static str,
	path: Option<String>,
) -> Result<String, BackendDescriptorError> {
	let path = path.ok_or(BackendDescriptorError::MissingEndpoint { endpoint: label })?;

	if !path.starts_with('/') {
		return Err(BackendDescriptorError::RelativeEndpoint { endpoint: label });
	}

	Ok(path)
}
