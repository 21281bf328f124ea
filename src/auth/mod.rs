//! Session lifecycle: nonce issuance, materialization of verification
//! results, and the extractors that read sessions off requests.

pub mod middleware;
pub mod service;
pub mod session;

pub use middleware::{AppState, AuthSession, SessionHandle};
pub use service::{AuthError, AuthService, AuthSettings, SignedIn};
pub use session::{Authentication, Session, SessionId};
