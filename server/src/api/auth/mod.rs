//! Authentication: JWT verification and the request-scoped identity extractor.
//!
//! Token *issuance* is an external collaborator; this crate only verifies
//! bearer tokens signed with the configured HMAC key.

pub mod context;
pub mod jwt;

pub use context::AuthUser;
pub use jwt::{JwtError, SessionClaims, create_session_token, validate_session_token};
