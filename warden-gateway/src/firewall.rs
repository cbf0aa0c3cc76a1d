// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routing firewall: static endpoint classification and enforcement.

use thiserror::Error;
use warden_core::{GatewayError, UserContext};

/// How the gateway treats an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointClass {
    /// Forwarded unmodified regardless of user class. For endpoints whose
    /// payload is not a per-document collection, or whose backend enforces
    /// its own access control.
    AlwaysProxy,
    /// Rejected unless the user is online.
    OnlineOnly,
    /// Allowed for all users; the response is routed through the stream
    /// filter for offline users.
    Filtered,
    /// Allowed only for online users or requests the audited write pipeline
    /// has already vetted.
    WriteAudited,
}

/// Request method, transport-agnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

/// Endpoint pattern: exact path segments with an optional trailing `*`
/// segment matching one or more remaining segments.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Pattern {
    segments: Vec<String>,
    wildcard_tail: bool,
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        let mut segments: Vec<String> = pattern
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let wildcard_tail = segments.last().map(|s| s == "*").unwrap_or(false);
        if wildcard_tail {
            segments.pop();
        }
        Self {
            segments,
            wildcard_tail,
        }
    }

    fn matches(&self, endpoint: &str) -> bool {
        let parts: Vec<&str> = endpoint
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        if self.wildcard_tail {
            parts.len() > self.segments.len()
                && self
                    .segments
                    .iter()
                    .zip(&parts)
                    .all(|(segment, part)| segment == part)
        } else {
            parts.len() == self.segments.len()
                && self
                    .segments
                    .iter()
                    .zip(&parts)
                    .all(|(segment, part)| segment == part)
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouteTableError {
    /// Declared endpoints with no classification rule. A gap in the table is
    /// a configuration defect; requests to such endpoints fail closed.
    #[error("endpoints missing a classification: {0:?}")]
    Unmapped(Vec<String>),

    /// A declared endpoint matched rules of more than one class.
    #[error("endpoint classifies ambiguously: {0}")]
    Ambiguous(String),
}

/// Builder collecting classification rules before totality validation.
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    rules: Vec<(Pattern, Method, EndpointClass)>,
}

impl RouteTableBuilder {
    /// Add a classification rule.
    pub fn route(mut self, pattern: &str, method: Method, class: EndpointClass) -> Self {
        self.rules.push((Pattern::parse(pattern), method, class));
        self
    }

    /// Validate the rules against the declared endpoint surface.
    ///
    /// Every declared `(endpoint, method)` pair must classify, and must
    /// classify to exactly one class.
    pub fn build(self, surface: &[(&str, Method)]) -> Result<RouteTable, RouteTableError> {
        let table = RouteTable { rules: self.rules };

        let mut unmapped = Vec::new();
        for (endpoint, method) in surface {
            let mut classes = table
                .matching_classes(endpoint, *method)
                .collect::<Vec<_>>();
            classes.dedup();
            match classes.len() {
                0 => unmapped.push(endpoint.to_string()),
                1 => {}
                _ => return Err(RouteTableError::Ambiguous(endpoint.to_string())),
            }
        }

        if unmapped.is_empty() {
            Ok(table)
        } else {
            Err(RouteTableError::Unmapped(unmapped))
        }
    }
}

/// Classification table keyed on endpoint pattern and method.
///
/// Built once at startup and validated for totality over the declared
/// endpoint surface; lookup is independent of any single request.
#[derive(Debug)]
pub struct RouteTable {
    rules: Vec<(Pattern, Method, EndpointClass)>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    fn matching_classes<'a>(
        &'a self,
        endpoint: &'a str,
        method: Method,
    ) -> impl Iterator<Item = EndpointClass> + 'a {
        self.rules
            .iter()
            .filter(move |(pattern, rule_method, _)| {
                *rule_method == method && pattern.matches(endpoint)
            })
            .map(|(_, _, class)| *class)
    }

    /// Classify an endpoint. `None` means unmapped; callers must fail closed.
    pub fn classify(&self, endpoint: &str, method: Method) -> Option<EndpointClass> {
        self.matching_classes(endpoint, method).next()
    }
}

/// Enforce a classification decision for one request.
///
/// `authorized` is set only by the audited write pipeline after its own
/// authorization check; it is the single mechanism letting an already-vetted
/// write pass a rule written for reads.
pub fn enforce(
    class: EndpointClass,
    ctx: &UserContext,
    authorized: bool,
) -> Result<(), GatewayError> {
    match class {
        EndpointClass::AlwaysProxy | EndpointClass::Filtered => Ok(()),
        EndpointClass::OnlineOnly => {
            if ctx.is_online {
                Ok(())
            } else {
                Err(GatewayError::Forbidden("endpoint requires an online user"))
            }
        }
        EndpointClass::WriteAudited => {
            if ctx.is_online || authorized {
                Ok(())
            } else {
                Err(GatewayError::Forbidden("write has not been authorized"))
            }
        }
    }
}
