//! Payload predicates shared by every index implementation.
//!
//! A [`Filter`] is a conjunction of `must` conditions, a disjunction of
//! `should` conditions (vacuously true when empty) and negated `must_not`
//! conditions. Keys address top-level payload fields, or nested object
//! fields with `a.b` paths.
//!
//! The same filter is evaluated in Rust by the in-process index and compiled
//! to a SQL `WHERE` clause by the SQLite index, so the two agree on what a
//! predicate means.

use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use concord_types::{MemoryDomain, MemoryScope, Viewer};

use crate::error::{MemoryError, Result};

/// Numeric bounds; any bound left `None` is open.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Range {
    pub gt: Option<f64>,
    pub gte: Option<f64>,
    pub lt: Option<f64>,
    pub lte: Option<f64>,
}

impl Range {
    pub fn at_least(v: f64) -> Self {
        Self {
            gte: Some(v),
            ..Self::default()
        }
    }

    pub fn below(v: f64) -> Self {
        Self {
            lt: Some(v),
            ..Self::default()
        }
    }

    fn contains(&self, v: f64) -> bool {
        self.gt.is_none_or(|b| v > b)
            && self.gte.is_none_or(|b| v >= b)
            && self.lt.is_none_or(|b| v < b)
            && self.lte.is_none_or(|b| v <= b)
    }
}

/// A single predicate over a payload field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value.
    Match { key: String, value: Value },
    /// Field equals one of the values.
    MatchAny { key: String, values: Vec<Value> },
    /// Numeric field inside the range.
    Range { key: String, range: Range },
    /// String field starts with the prefix.
    Prefix { key: String, prefix: String },
    /// Array field contains the value.
    Contains { key: String, value: Value },
    /// A sub-filter, for OR-of-ANDs shapes.
    Nested(Filter),
}

impl Condition {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Match {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn any_of<I, V>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::MatchAny {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range(key: impl Into<String>, range: Range) -> Self {
        Self::Range {
            key: key.into(),
            range,
        }
    }

    pub fn prefix(key: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::Prefix {
            key: key.into(),
            prefix: prefix.into(),
        }
    }

    pub fn contains(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Contains {
            key: key.into(),
            value: value.into(),
        }
    }

    fn matches(&self, payload: &Map<String, Value>) -> bool {
        match self {
            Self::Match { key, value } => match lookup(payload, key) {
                Some(found) => values_equal(found, value),
                None => value.is_null(),
            },
            Self::MatchAny { key, values } => lookup(payload, key)
                .is_some_and(|found| values.iter().any(|v| values_equal(found, v))),
            Self::Range { key, range } => lookup(payload, key)
                .and_then(Value::as_f64)
                .is_some_and(|v| range.contains(v)),
            Self::Prefix { key, prefix } => lookup(payload, key)
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Self::Contains { key, value } => lookup(payload, key)
                .and_then(Value::as_array)
                .is_some_and(|items| items.iter().any(|v| values_equal(v, value))),
            Self::Nested(filter) => filter.matches(payload),
        }
    }

    fn to_sql(&self, params: &mut Vec<SqlValue>) -> Result<String> {
        match self {
            Self::Match { key, value } => {
                let field = field_sql(key)?;
                if value.is_null() {
                    return Ok(format!("{field} IS NULL"));
                }
                params.push(to_sql_value(value));
                Ok(format!("{field} = ?"))
            }
            Self::MatchAny { key, values } => {
                let field = field_sql(key)?;
                if values.is_empty() {
                    return Ok("0".to_string());
                }
                let marks = vec!["?"; values.len()].join(", ");
                params.extend(values.iter().map(to_sql_value));
                Ok(format!("{field} IN ({marks})"))
            }
            Self::Range { key, range } => {
                let field = field_sql(key)?;
                let mut parts = Vec::new();
                for (op, bound) in [
                    (">", range.gt),
                    (">=", range.gte),
                    ("<", range.lt),
                    ("<=", range.lte),
                ] {
                    if let Some(b) = bound {
                        params.push(SqlValue::Real(b));
                        parts.push(format!("{field} {op} ?"));
                    }
                }
                if parts.is_empty() {
                    // Still require a number, as the in-process check does.
                    return Ok(format!("{field} IS NOT NULL"));
                }
                Ok(parts.join(" AND "))
            }
            Self::Prefix { key, prefix } => {
                let field = field_sql(key)?;
                params.push(SqlValue::Integer(prefix.chars().count() as i64));
                params.push(SqlValue::Text(prefix.clone()));
                Ok(format!(
                    "(typeof({field}) = 'text' AND substr({field}, 1, ?) = ?)"
                ))
            }
            Self::Contains { key, value } => {
                let path = json_path(key)?;
                params.push(to_sql_value(value));
                Ok(format!(
                    "EXISTS (SELECT 1 FROM json_each(payload, '{path}') AS je WHERE je.value = ?)"
                ))
            }
            Self::Nested(filter) => Ok(format!("({})", filter.to_sql(params)?)),
        }
    }
}

/// A boolean combination of [`Condition`]s.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    pub must: Vec<Condition>,
    pub should: Vec<Condition>,
    pub must_not: Vec<Condition>,
}

impl Filter {
    /// The filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, condition: Condition) -> Self {
        self.must.push(condition);
        self
    }

    pub fn should(mut self, condition: Condition) -> Self {
        self.should.push(condition);
        self
    }

    pub fn must_not(mut self, condition: Condition) -> Self {
        self.must_not.push(condition);
        self
    }

    /// Conjunction of `self` and `other`.
    pub fn and(self, other: Filter) -> Self {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }
        self.must(Condition::Nested(other))
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }

    /// Evaluate the filter against a payload.
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        self.must.iter().all(|c| c.matches(payload))
            && (self.should.is_empty() || self.should.iter().any(|c| c.matches(payload)))
            && !self.must_not.iter().any(|c| c.matches(payload))
    }

    /// Compile to a SQL boolean expression over a `payload` JSON column.
    ///
    /// Placeholders are appended to `params` in order.
    pub fn to_sql(&self, params: &mut Vec<SqlValue>) -> Result<String> {
        let mut parts = Vec::new();
        for c in &self.must {
            parts.push(c.to_sql(params)?);
        }
        if !self.should.is_empty() {
            let mut any = Vec::new();
            for c in &self.should {
                any.push(c.to_sql(params)?);
            }
            parts.push(format!("({})", any.join(" OR ")));
        }
        for c in &self.must_not {
            parts.push(format!("NOT ({})", c.to_sql(params)?));
        }
        if parts.is_empty() {
            return Ok("1".to_string());
        }
        Ok(parts.join(" AND "))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Visibility
    // ─────────────────────────────────────────────────────────────────────────

    /// Records owned by `agent_id` or Global, plus Domain-scoped records of
    /// `domain` when one is given.
    pub fn owned_or_shared(agent_id: &str, domain: Option<MemoryDomain>) -> Self {
        let mut filter = Filter::new()
            .should(Condition::eq("agent_id", agent_id))
            .should(Condition::eq("scope", MemoryScope::Global.as_str()));
        if let Some(domain) = domain {
            filter = filter.should(Condition::Nested(
                Filter::new()
                    .must(Condition::eq("scope", MemoryScope::Domain.as_str()))
                    .must(Condition::eq("domain", domain.as_str())),
            ));
        }
        filter
    }

    /// The access rule as an index predicate: everything `viewer` may see.
    pub fn visible_to(viewer: &Viewer) -> Self {
        match viewer.domain {
            Some(domain) if domain.is_general() => Filter::new()
                .should(Condition::eq("agent_id", viewer.agent_id.as_str()))
                .should(Condition::any_of(
                    "scope",
                    [MemoryScope::Global.as_str(), MemoryScope::Domain.as_str()],
                )),
            domain => Self::owned_or_shared(&viewer.agent_id, domain),
        }
    }
}

fn lookup<'a>(payload: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn json_path(key: &str) -> Result<String> {
    let valid = !key.is_empty()
        && key.split('.').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if !valid {
        return Err(MemoryError::Query(format!("invalid filter key: {key:?}")));
    }
    Ok(format!("$.{key}"))
}

fn field_sql(key: &str) -> Result<String> {
    Ok(format!("json_extract(payload, '{}')", json_path(key)?))
}

/// Map a JSON value to what `json_extract` yields for it.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
