//! Domain types - identifiers, endpoint limits and decisions.

mod decision;
mod identifier;
mod limits;

pub use decision::{RateLimitDecision, WindowUsage};
pub use identifier::{ClientInfo, Identifier, strip_port};
pub use limits::{EndpointLimit, EndpointLimits, EndpointRule, ResolvedLimit};
