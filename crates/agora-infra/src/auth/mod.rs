//! Authentication implementations.

mod jwt;

pub use jwt::{JwtConfig, JwtTokenService};
