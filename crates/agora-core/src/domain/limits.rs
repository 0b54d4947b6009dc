//! Endpoint limits and the path → limit resolver.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Quota for one endpoint family. All requests cost one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointLimit {
    pub requests: u64,
    pub window: Duration,
    pub burst: u64,
}

impl EndpointLimit {
    pub const fn new(requests: u64, window: Duration, burst: u64) -> Self {
        Self {
            requests,
            window,
            burst,
        }
    }

    /// Limit applied to paths no rule matches: 100 requests per minute, burst 20.
    pub const DEFAULT: EndpointLimit = EndpointLimit::new(100, Duration::from_secs(60), 20);
}

impl Default for EndpointLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A configured `(path, limit)` pair. Paths may contain `{param}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRule {
    pub path: String,
    pub requests: u64,
    pub window_secs: u64,
    #[serde(default)]
    pub burst: u64,
}

impl EndpointRule {
    pub fn new(path: impl Into<String>, requests: u64, window_secs: u64, burst: u64) -> Self {
        Self {
            path: path.into(),
            requests,
            window_secs,
            burst,
        }
    }

    pub fn limit(&self) -> EndpointLimit {
        EndpointLimit::new(self.requests, Duration::from_secs(self.window_secs), self.burst)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRule {
            path: self.path.clone(),
            reason: reason.to_string(),
        };

        if !self.path.starts_with('/') {
            return Err(invalid("path must start with '/'"));
        }
        if self.requests == 0 {
            return Err(invalid("requests must be greater than zero"));
        }
        if self.window_secs == 0 {
            return Err(invalid("window_secs must be greater than zero"));
        }
        Ok(())
    }
}

/// The limit chosen for a request path, with the key its counters live under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLimit {
    /// Matched rule path, or the request path itself for the default.
    pub endpoint_key: String,
    pub limit: EndpointLimit,
    pub matched: bool,
}

#[derive(Debug, Clone)]
struct Pattern {
    rule: usize,
    segments: Vec<Option<String>>,
}

impl Pattern {
    fn parse(rule: usize, path: &str) -> Self {
        let segments = path
            .split('/')
            .map(|seg| {
                let wildcard = seg == "*" || (seg.starts_with('{') && seg.ends_with('}'));
                (!wildcard).then(|| seg.to_string())
            })
            .collect();
        Self { rule, segments }
    }

    fn has_wildcard(&self) -> bool {
        self.segments.iter().any(Option::is_none)
    }

    fn literal_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_some()).count()
    }

    fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(parts)
            .all(|(segment, part)| match segment {
                Some(literal) => literal == part,
                None => !part.is_empty(),
            })
    }
}

/// Ordered endpoint rules, read-only after startup.
///
/// Resolution: exact path match, then placeholder patterns in fixed priority
/// (more literal segments first, ties in configuration order), then
/// [`EndpointLimit::DEFAULT`].
#[derive(Debug, Clone)]
pub struct EndpointLimits {
    rules: Vec<EndpointRule>,
    patterns: Vec<Pattern>,
    default: EndpointLimit,
}

impl EndpointLimits {
    pub fn new(rules: Vec<EndpointRule>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            rule.validate()?;
            if !seen.insert(rule.path.as_str()) {
                return Err(ConfigError::DuplicateRule(rule.path.clone()));
            }
        }

        Ok(Self::compile(rules))
    }

    fn compile(rules: Vec<EndpointRule>) -> Self {
        let mut patterns: Vec<Pattern> = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| Pattern::parse(i, &rule.path))
            .filter(Pattern::has_wildcard)
            .collect();
        // sort_by is stable, so configuration order breaks ties
        patterns.sort_by(|a, b| b.literal_count().cmp(&a.literal_count()));

        Self {
            rules,
            patterns,
            default: EndpointLimit::DEFAULT,
        }
    }

    /// The platform's built-in rule table.
    pub fn builtin() -> Self {
        let rules = vec![
            EndpointRule::new("/api/v1/auth/login", 5, 15 * 60, 3),
            EndpointRule::new("/api/v1/auth/signup", 3, 60 * 60, 2),
            EndpointRule::new("/api/v1/auth/refresh", 10, 60, 5),
            EndpointRule::new("/api/v1/auth/change-password", 5, 60 * 60, 2),
            EndpointRule::new("/api/v1/posts", 100, 60, 20),
            EndpointRule::new("/api/v1/posts/{id}/like", 30, 60, 10),
            EndpointRule::new("/api/v1/media/upload", 10, 60, 3),
            EndpointRule::new("/api/v1/admin", 200, 60, 50),
        ];
        Self::compile(rules)
    }

    /// Parse a JSON array of rules.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let rules: Vec<EndpointRule> =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::new(rules)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn rules(&self) -> &[EndpointRule] {
        &self.rules
    }

    /// Map a request path to its limit. Pure function of `(path, rules)`.
    pub fn resolve(&self, path: &str) -> ResolvedLimit {
        if let Some(rule) = self.rules.iter().find(|r| r.path == path) {
            return ResolvedLimit {
                endpoint_key: rule.path.clone(),
                limit: rule.limit(),
                matched: true,
            };
        }

        if let Some(pattern) = self.patterns.iter().find(|p| p.matches(path)) {
            let rule = &self.rules[pattern.rule];
            return ResolvedLimit {
                endpoint_key: rule.path.clone(),
                limit: rule.limit(),
                matched: true,
            };
        }

        ResolvedLimit {
            endpoint_key: path.to_string(),
            limit: self.default,
            matched: false,
        }
    }
}

impl Default for EndpointLimits {
    fn default() -> Self {
        Self::builtin()
    }
}
