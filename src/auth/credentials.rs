//! Static principal used for full logins.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
// self
use crate::{_prelude::*, auth::Secret};

/// Error returned when credential validation fails.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialsError {
	/// The username was empty.
	#[error("Username cannot be empty.")]
	EmptyUsername,
	/// The username contains characters that cannot appear in a Basic auth pair.
	#[error("Username cannot contain `:` or control characters.")]
	InvalidUsername,
	/// The password was empty.
	#[error("Password cannot be empty.")]
	EmptyPassword,
}

/// Immutable username/password pair used only for full logins.
///
/// The pair is validated once at construction; the session manager never inspects it beyond
/// asking for the `Authorization` header value.
#[derive(Clone)]
pub struct Credentials {
	username: String,
	password: Secret,
}
impl Credentials {
	/// Creates a credential pair after validation.
	pub fn new(
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Result<Self, CredentialsError> {
		let username = username.into();
		let password = password.into();

		if username.is_empty() {
			return Err(CredentialsError::EmptyUsername);
		}
		if username.contains(':') || username.chars().any(char::is_control) {
			return Err(CredentialsError::InvalidUsername);
		}
		if password.is_empty() {
			return Err(CredentialsError::EmptyPassword);
		}

		Ok(Self { username, password: Secret::new(password) })
	}

	/// Returns the username.
	pub fn username(&self) -> &str {
		&self.username
	}

	/// Returns the `Authorization` header value for a Basic-auth login request.
	pub fn basic_header(&self) -> String {
		let pair = format!("{}:{}", self.username, self.password.expose());

		format!("Basic {}", STANDARD.encode(pair))
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.field("password", &self.password)
			.finish()
	}
}
