//! HTTP middleware components.

pub mod bearer_auth;

pub use bearer_auth::{Caller, TokenClaims, TokenVerifier, authenticate_bearer_token};
