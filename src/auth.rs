//! Auth-domain types: redacted secrets, static credentials, and the session manager.

pub mod credentials;
pub mod secret;
pub mod session;

pub use credentials::*;
pub use secret::*;
pub use session::*;
