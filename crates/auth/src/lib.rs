//! `clinicflow-auth`: bearer-token boundary producing the acting user.
//!
//! This crate is decoupled from HTTP and storage: it turns a signed token into
//! validated [`JwtClaims`], whose `sub` is the actor identity every workflow
//! operation records.

pub mod claims;
pub mod jwt;
pub mod roles;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use roles::Role;
