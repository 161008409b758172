//! Filter compilation.
//!
//! A filter list is compiled once per search into a [`PatternChain`]: one
//! extended regular expression per filter, applied in order, each narrowing
//! the output of the previous stage.
//!
//! Pattern text goes to `grep -E` unchanged. The chain also keeps an
//! in-process [`Regex`] for every pattern the `regex` crate accepts; grep-only
//! syntax such as backreferences is not an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tracing::debug;

use crate::error::{Result, SearchError};

/// Operator: the field is present.
pub const OP_EXISTS: &str = "exists";
/// Operator: the field's string value is one of a set.
pub const OP_IN: &str = "in";
/// Operator: the field is a raw pattern.
pub const OP_RAW: &str = "raw";

/// One predicate over a serialized record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Field name, or the pattern itself for `raw`.
    pub field: String,
    /// Operator name.
    pub op: String,
    /// Operand, when the operator takes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Filter {
    /// Creates a filter from its parts. The operator is checked at compile time.
    #[must_use]
    pub fn new(field: impl Into<String>, op: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            field: field.into(),
            op: op.into(),
            value,
        }
    }

    /// Matches records that have `field`.
    #[must_use]
    pub fn exists(field: impl Into<String>) -> Self {
        Self::new(field, OP_EXISTS, None)
    }

    /// Matches records whose `field` is one of `values`.
    #[must_use]
    pub fn any_of<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|v| Value::String(v.into()))
            .collect();
        Self::new(field, OP_IN, Some(Value::Array(values)))
    }

    /// Matches lines against `pattern` directly.
    #[must_use]
    pub fn raw(pattern: impl Into<String>) -> Self {
        Self::new(pattern, OP_RAW, None)
    }

    fn to_pattern(&self) -> Result<String> {
        match self.op.as_str() {
            OP_EXISTS => Ok(format!("\"{}\":", self.field)),
            OP_IN => {
                let values = self.string_values()?;
                Ok(format!("\"{}\":\"({})\"", self.field, values.join("|")))
            }
            OP_RAW => Ok(self.field.clone()),
            _ => Err(SearchError::UnknownOperator {
                field: self.field.clone(),
                op: self.op.clone(),
            }),
        }
    }

    fn string_values(&self) -> Result<Vec<&str>> {
        let unsupported = |detail: String| SearchError::UnsupportedValueType {
            field: self.field.clone(),
            detail,
        };

        let items = match &self.value {
            Some(Value::Array(items)) => items,
            Some(other) => return Err(unsupported(format!("expected a list, got {other}"))),
            None => return Err(unsupported("missing value list".to_string())),
        };
        if items.is_empty() {
            return Err(unsupported("empty value list".to_string()));
        }

        items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| unsupported(format!("non-string value {item}")))
            })
            .collect()
    }
}

/// Ordered, AND-combined search patterns.
#[derive(Debug, Clone)]
pub struct PatternChain {
    patterns: Vec<String>,
    compiled: Vec<Option<Regex>>,
}

impl PatternChain {
    /// Pattern texts in application order.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns true if `line` matches every pattern.
    ///
    /// Patterns outside the `regex` crate's syntax only narrow the grep
    /// pipeline and are not checked here; see [`Self::is_fully_checked`].
    #[must_use]
    pub fn is_match(&self, line: &str) -> bool {
        self.compiled.iter().flatten().all(|re| re.is_match(line))
    }

    /// Returns true if [`Self::is_match`] checks every pattern.
    #[must_use]
    pub fn is_fully_checked(&self) -> bool {
        self.compiled.iter().all(Option::is_some)
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true if the chain matches everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl PartialEq for PatternChain {
    fn eq(&self, other: &Self) -> bool {
        self.patterns == other.patterns
    }
}

impl Eq for PatternChain {}

/// Compiles filters into a pattern chain, one pattern per filter in order.
///
/// # Errors
///
/// Returns [`SearchError::UnknownOperator`] or
/// [`SearchError::UnsupportedValueType`] for the first offending filter.
pub fn compile(filters: &[Filter]) -> Result<PatternChain> {
    let mut patterns = Vec::with_capacity(filters.len());
    let mut compiled = Vec::with_capacity(filters.len());

    for filter in filters {
        let pattern = filter.to_pattern()?;
        let re = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                debug!(%pattern, error = %e, "pattern left to grep only");
                None
            }
        };
        patterns.push(pattern);
        compiled.push(re);
    }

    Ok(PatternChain { patterns, compiled })
}
