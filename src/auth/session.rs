//! Session lifecycle orchestration with singleflight transitions and a bounded refresh budget.
//!
//! The backend issues short-lived session tokens that may be refreshed at most
//! [`MAX_REFRESHES`] times before it demands a full credential login; refresh calls beyond
//! that ceiling behave unpredictably and must be avoided proactively rather than discovered
//! through their failures. [`SessionManager`] owns that bookkeeping: it tracks the refresh
//! budget and the login generation, serializes every transition behind a singleflight guard,
//! and runs the transition itself on a detached task so a caller that abandons the wait never
//! cancels work other waiters depend on. A failed login is terminal for the process; every
//! later call short-circuits with [`Error::SessionExhausted`].

// crates.io
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	auth::{Credentials, Secret},
	config::BackendDescriptor,
	error::DecodeError,
	http::{ApiRequest, ApiTransport, Method, RawResponse},
	obs::{self, CallKind, CallOutcome, CallSpan},
};

/// Maximum number of refreshes the backend honors per login before a full re-login is
/// mandatory.
pub const MAX_REFRESHES: u8 = 3;

/// Lifecycle states of the process-wide session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
	/// No authentication has happened yet; the session is created lazily at first use.
	#[default]
	Unauthenticated,
	/// The first credential login is in flight.
	Authenticating,
	/// A valid token is held.
	Active,
	/// A refresh or re-login is in flight after a 401 or an observed expiry.
	Reauthenticating,
	/// A full login failed; terminal until the process restarts.
	Failed,
}

/// A borrowed session token plus the epoch of the transition that issued it.
///
/// Callers hand the epoch back to [`SessionManager::recover_unauthorized`] after a 401 so the
/// manager can tell whether the rejected token has already been replaced by another caller's
/// recovery.
#[derive(Clone, Debug)]
pub struct AccessToken {
	/// The session token. Callers must avoid logging it.
	pub secret: Secret,
	/// Issue epoch; bumped on every successful login or refresh.
	pub epoch: u64,
}

#[derive(Debug, Default)]
struct Session {
	token: Option<Secret>,
	expires_at: Option<OffsetDateTime>,
	refresh_count: u8,
	generation: u64,
	epoch: u64,
	state: SessionState,
}
impl Session {
	fn live_token(&self, now: OffsetDateTime) -> Option<AccessToken> {
		if self.state != SessionState::Active {
			return None;
		}

		match (&self.token, self.expires_at) {
			(Some(token), Some(expires_at)) if now < expires_at =>
				Some(AccessToken { secret: token.clone(), epoch: self.epoch }),
			_ => None,
		}
	}
}

/// Owns the single process-wide session and serializes every login/refresh transition.
///
/// The manager performs no rate limiting and no retries of business calls; it only maintains
/// the token. Cloning is cheap and every clone observes the same session.
pub struct SessionManager<T>
where
	T: ?Sized + ApiTransport,
{
	inner: Arc<SessionInner<T>>,
}
impl<T> SessionManager<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a manager for the given backend; no network traffic happens until first use.
	pub fn new(
		transport: impl Into<Arc<T>>,
		descriptor: BackendDescriptor,
		credentials: Credentials,
	) -> Self {
		Self {
			inner: Arc::new(SessionInner {
				transport: transport.into(),
				descriptor,
				credentials,
				session: Mutex::new(Session::default()),
				flight: AsyncMutex::new(()),
			}),
		}
	}

	/// Returns the current valid token, logging in or refreshing first if required.
	pub async fn ensure_token(&self) -> Result<AccessToken> {
		{
			let session = self.inner.session.lock();

			if session.state == SessionState::Failed {
				return Err(Error::SessionExhausted);
			}
			if let Some(grant) = session.live_token(OffsetDateTime::now_utc()) {
				return Ok(grant);
			}
		}

		self.run_transition(None).await
	}

	/// Recovers from a 401 observed with the token issued at `stale_epoch`.
	///
	/// Returns a token from a newer epoch, either by reusing a recovery another caller already
	/// completed or by performing one itself. Fails terminally if recovery requires a login and
	/// the login fails.
	pub async fn recover_unauthorized(&self, stale_epoch: u64) -> Result<AccessToken> {
		{
			let session = self.inner.session.lock();

			if session.state == SessionState::Failed {
				return Err(Error::SessionExhausted);
			}
			if let Some(grant) = session.live_token(OffsetDateTime::now_utc())
				&& grant.epoch != stale_epoch
			{
				return Ok(grant);
			}
		}

		self.run_transition(Some(stale_epoch)).await
	}

	/// Returns the current lifecycle state.
	pub fn state(&self) -> SessionState {
		self.inner.session.lock().state
	}

	/// Returns the login generation; bumped on every full login.
	pub fn generation(&self) -> u64 {
		self.inner.session.lock().generation
	}

	/// Returns how many refreshes the current login has consumed.
	pub fn refresh_count(&self) -> u8 {
		self.inner.session.lock().refresh_count
	}

	/// Spawns the transition as a detached task so waiter cancellation cannot abort it
	/// mid-flight, then awaits its outcome.
	async fn run_transition(&self, stale_epoch: Option<u64>) -> Result<AccessToken> {
		let inner = self.inner.clone();

		match tokio::spawn(SessionInner::transition(inner, stale_epoch)).await {
			Ok(result) => result,
			Err(_) => Err(Error::Auth { reason: "session transition task aborted".into() }),
		}
	}
}
impl<T> Clone for SessionManager<T>
where
	T: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<T> Debug for SessionManager<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let session = self.inner.session.lock();

		f.debug_struct("SessionManager")
			.field("state", &session.state)
			.field("refresh_count", &session.refresh_count)
			.field("generation", &session.generation)
			.finish()
	}
}

struct SessionInner<T>
where
	T: ?Sized,
{
	transport: Arc<T>,
	descriptor: BackendDescriptor,
	credentials: Credentials,
	session: Mutex<Session>,
	flight: AsyncMutex<()>,
}
impl<T> SessionInner<T>
where
	T: ?Sized + ApiTransport,
{
	/// Runs one serialized login/refresh transition.
	///
	/// Waiters queue on the flight guard; whoever acquires it re-checks the session first and
	/// reuses a token some earlier holder already produced instead of transitioning again.
	async fn transition(inner: Arc<Self>, stale_epoch: Option<u64>) -> Result<AccessToken> {
		let _flight = inner.flight.lock().await;

		if let Some(grant) = inner.settled_grant(stale_epoch)? {
			return Ok(grant);
		}

		let refresh_with = {
			let mut session = inner.session.lock();

			session.state = if session.generation == 0 {
				SessionState::Authenticating
			} else {
				SessionState::Reauthenticating
			};

			match &session.token {
				Some(token) if session.refresh_count < MAX_REFRESHES => Some(token.clone()),
				_ => None,
			}
		};

		if let Some(current) = refresh_with
			&& let Ok(grant) = inner.refresh(&current).await
		{
			return Ok(grant);
		}

		// Refresh failures of any kind fall back to a full login and never advance the
		// refresh budget. At the budget ceiling the refresh is skipped outright.
		inner.login().await
	}

	fn settled_grant(&self, stale_epoch: Option<u64>) -> Result<Option<AccessToken>> {
		let session = self.session.lock();

		if session.state == SessionState::Failed {
			return Err(Error::SessionExhausted);
		}

		match session.live_token(OffsetDateTime::now_utc()) {
			Some(grant) if stale_epoch != Some(grant.epoch) => Ok(Some(grant)),
			_ => Ok(None),
		}
	}

	async fn refresh(&self, current: &Secret) -> Result<AccessToken> {
		const KIND: CallKind = CallKind::Refresh;

		let span = CallSpan::new(KIND, "refresh");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async move {
				let url = self.descriptor.endpoint_url(&self.descriptor.refresh_endpoint)?;
				let request = ApiRequest::new(Method::Post, url, self.descriptor.request_timeout)
					.with_header("authorization", format!("Bearer {}", current.expose()));
				let response = self.transport.send(request).await?;

				if !response.is_success() {
					return Err(Error::Http {
						status: response.status,
						body: response.body_preview(),
					});
				}

				let (token, expires_at) = decode_grant(&response)?;
				let mut session = self.session.lock();

				session.token = Some(token.clone());
				session.expires_at = Some(expires_at);
				session.refresh_count += 1;
				session.epoch += 1;
				session.state = SessionState::Active;

				Ok(AccessToken { secret: token, epoch: session.epoch })
			})
			.await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	async fn login(&self) -> Result<AccessToken> {
		const KIND: CallKind = CallKind::Login;

		let span = CallSpan::new(KIND, "login");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span.instrument(self.attempt_login()).await;

		match result {
			Ok((token, expires_at)) => {
				let grant = {
					let mut session = self.session.lock();

					session.token = Some(token.clone());
					session.expires_at = Some(expires_at);
					session.refresh_count = 0;
					session.generation += 1;
					session.epoch += 1;
					session.state = SessionState::Active;

					AccessToken { secret: token, epoch: session.epoch }
				};

				obs::record_call_outcome(KIND, CallOutcome::Success);

				Ok(grant)
			},
			Err(reason) => {
				{
					let mut session = self.session.lock();

					session.token = None;
					session.expires_at = None;
					session.state = SessionState::Failed;
				}

				obs::record_call_outcome(KIND, CallOutcome::Failure);

				Err(Error::Auth { reason })
			},
		}
	}

	/// Performs the credential login, reducing every failure mode to a reason string; the
	/// caller turns any of them into the terminal failed state.
	async fn attempt_login(&self) -> Result<(Secret, OffsetDateTime), String> {
		let url = self
			.descriptor
			.endpoint_url(&self.descriptor.login_endpoint)
			.map_err(|err| format!("login endpoint is invalid: {err}"))?;
		let request = ApiRequest::new(Method::Post, url, self.descriptor.request_timeout)
			.with_header("authorization", self.credentials.basic_header());
		let response = self
			.transport
			.send(request)
			.await
			.map_err(|err| format!("login transport failure: {err}"))?;

		match response.status {
			_ if response.is_success() => decode_grant(&response)
				.map_err(|err| format!("login response could not be decoded: {err}")),
			401 | 403 => Err(format!(
				"backend rejected the credentials for `{}` (HTTP {})",
				self.credentials.username(),
				response.status,
			)),
			status => Err(format!("login failed with HTTP {status}: {}", response.body_preview())),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantPayload {
	token: String,
	expires_at: String,
}

fn decode_grant(response: &RawResponse) -> Result<(Secret, OffsetDateTime)> {
	let mut deserializer = serde_json::Deserializer::from_slice(&response.body);
	let payload: GrantPayload = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| DecodeError::Json { source, status: Some(response.status) })?;

	if payload.token.is_empty() {
		return Err(Error::Auth { reason: "backend issued an empty session token".into() });
	}

	let expires_at = OffsetDateTime::parse(&payload.expires_at, &Rfc3339)
		.map_err(|source| DecodeError::Timestamp { source })?;

	Ok((Secret::new(payload.token), expires_at))
}
