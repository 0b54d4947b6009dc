//! # Agora Shared
//!
//! Wire types returned by the API: problem details, health and limiter
//! inspection payloads.

pub mod dto;
pub mod response;

pub use response::ErrorResponse;
