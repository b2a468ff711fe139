//! Program variables and JSON path queries over statement results.
//!
//! A [`VariableContext`] is owned by the caller and threaded `&mut` through
//! statement execution, so SET mutations happen strictly in program order.

use std::collections::BTreeMap;

use kgfed_core::{KgfedError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named values set by `SET` statements and clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableContext {
    values: BTreeMap<String, Value>,
}

impl VariableContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` (which may itself contain dots) to `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Resolve `$name` or `$name.path`.
    ///
    /// The longest variable name that is a dotted prefix of the reference
    /// wins, so `$icees.url` finds a variable literally named `icees.url`
    /// before looking for `url` inside `icees`.
    ///
    /// # Errors
    ///
    /// Returns [`KgfedError::UnresolvedVariable`] when no variable matches or
    /// the path does not exist inside it.
    pub fn resolve(&self, reference: &str) -> Result<Value> {
        let reference = reference.strip_prefix('$').unwrap_or(reference);
        let unresolved = || KgfedError::UnresolvedVariable(format!("${reference}"));

        let (name, rest) = self
            .values
            .keys()
            .filter_map(|name| {
                if reference == name {
                    Some((name.as_str(), ""))
                } else {
                    reference
                        .strip_prefix(name.as_str())
                        .and_then(|rest| rest.strip_prefix('.'))
                        .map(|rest| (name.as_str(), rest))
                }
            })
            .max_by_key(|(name, _)| name.len())
            .ok_or_else(unresolved)?;

        let mut current = self.values.get(name).ok_or_else(unresolved)?;
        for key in rest.split('.').filter(|k| !k.is_empty()) {
            current = match current {
                Value::Object(map) => map.get(key),
                Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(unresolved)?;
        }
        Ok(current.clone())
    }
}

// ── Path queries ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Key(String),
    Wildcard,
    Index(usize),
}

/// Evaluate a JSON path query and return every match, in document order.
///
/// Supported: `$`, `.key`, `['key']`, `.*`, `[*]`, `.[*]` and `[n]`.
/// A query with no matches yields an empty list.
///
/// # Errors
///
/// Returns [`KgfedError::PathQuery`] if the query is malformed.
pub fn json_path(root: &Value, query: &str) -> Result<Vec<Value>> {
    let steps = parse_path(query)?;
    let mut current = vec![root];
    for step in &steps {
        let mut next = Vec::new();
        for value in current {
            match (step, value) {
                (Step::Key(key), Value::Object(map)) => next.extend(map.get(key)),
                (Step::Index(i), Value::Array(items)) => next.extend(items.get(*i)),
                (Step::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                (Step::Wildcard, Value::Object(map)) => next.extend(map.values()),
                _ => {}
            }
        }
        current = next;
    }
    Ok(current.into_iter().cloned().collect())
}

fn parse_path(query: &str) -> Result<Vec<Step>> {
    let invalid = |message: &str| KgfedError::PathQuery {
        query: query.to_string(),
        message: message.to_string(),
    };
    let mut rest = query
        .trim()
        .strip_prefix('$')
        .ok_or_else(|| invalid("must start with '$'"))?;

    let mut steps = Vec::new();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| invalid("unclosed '['"))?;
            let inner = after[..close].trim();
            steps.push(match inner {
                "*" => Step::Wildcard,
                quoted if quoted.len() >= 2 && (quoted.starts_with('\'') || quoted.starts_with('"')) => {
                    Step::Key(quoted[1..quoted.len() - 1].to_string())
                }
                index => Step::Index(
                    index
                        .parse()
                        .map_err(|_| invalid(&format!("bad index '{index}'")))?,
                ),
            });
            rest = &after[close + 1..];
        } else if let Some(after) = rest.strip_prefix('.') {
            if after.starts_with('[') {
                rest = after;
                continue;
            }
            let end = after.find(['.', '[']).unwrap_or(after.len());
            let key = &after[..end];
            match key {
                "" => return Err(invalid("empty key")),
                "*" => steps.push(Step::Wildcard),
                _ => steps.push(Step::Key(key.to_string())),
            }
            rest = &after[end..];
        } else {
            return Err(invalid(&format!("unexpected '{rest}'")));
        }
    }
    Ok(steps)
}
