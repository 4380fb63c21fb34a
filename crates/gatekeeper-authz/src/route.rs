//! Mapping between HTTP routes and rule module names.

use serde::{Deserialize, Serialize};

/// The HTTP method and path a rule module decides for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    /// HTTP method, any case.
    pub method: String,
    /// Path template.
    pub path: String,
}

impl Route {
    /// Create a new route.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Query name this route dispatches to.
    pub fn query_name(&self) -> String {
        query_name(&self.method, &self.path)
    }
}

/// Derive a query name: lower-cased method followed by the path with every
/// `/` turned into `.`.
///
/// `GET /data/v1/ranges` gives `get.data.v1.ranges`.
pub fn query_name(method: &str, path: &str) -> String {
    let mut name = method.to_lowercase();
    name.push_str(&path.replace('/', "."));
    name
}

/// Build a query for `rule` inside the module called `name`, quoting every
/// segment so arbitrary paths still produce a valid query.
pub fn query_text(name: &str, rule: &str) -> String {
    let mut query = String::from("data");
    for segment in name.split('.').chain(std::iter::once(rule)) {
        query.push('[');
        query.push_str(&quote(segment));
        query.push(']');
    }
    query
}

fn quote(segment: &str) -> String {
    let mut quoted = String::with_capacity(segment.len() + 2);
    quoted.push('"');
    for c in segment.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            c if c.is_control() => quoted.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
