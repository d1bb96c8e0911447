//! Response matching.
//!
//! # Responsibilities
//! - Decide whether an upstream response qualifies for a `handle_response` rule
//!
//! # Design Decisions
//! - A single-digit status code matches its whole class (`5` = any 5xx)
//! - Header rules reuse the request header matcher's glob semantics

use std::collections::BTreeMap;

use axum::http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

use crate::routing::matcher::glob_match;

/// Predicate over a response status and headers. Empty fields match anything.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseMatcher {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub status_code: Vec<u16>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Vec<String>>,
}

impl ResponseMatcher {
    pub fn matches(&self, status: StatusCode, headers: &HeaderMap) -> bool {
        self.matches_status(status) && self.matches_headers(headers)
    }

    fn matches_status(&self, status: StatusCode) -> bool {
        if self.status_code.is_empty() {
            return true;
        }
        let code = status.as_u16();
        self.status_code.iter().any(|&expected| {
            if expected < 10 {
                code / 100 == expected
            } else {
                code == expected
            }
        })
    }

    fn matches_headers(&self, headers: &HeaderMap) -> bool {
        self.headers.iter().all(|(field, patterns)| {
            let values: Vec<&str> = headers
                .get_all(field.as_str())
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            if values.is_empty() {
                return false;
            }
            patterns.is_empty()
                || values
                    .iter()
                    .any(|value| patterns.iter().any(|p| glob_match(p, value)))
        })
    }
}
