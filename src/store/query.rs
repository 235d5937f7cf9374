//! Backend-agnostic record query.
//!
//! Fields are addressed by name; nested fields of JSON objects use dotted
//! paths, e.g. `extras._aiida_hash`.

use std::{cmp::Ordering, collections::HashMap};

use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    filters: Vec<(String, JsonValue)>,
    order_by: Option<(String, Order)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps records whose `field` equals `value`. A `null` value also matches a missing field.
    pub fn filter(
        mut self,
        field: impl Into<String>,
        value: JsonValue,
    ) -> Self {
        self.filters.push((field.into(), value));
        self
    }

    pub fn order_by(
        mut self,
        field: impl Into<String>,
        order: Order,
    ) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }

    pub fn limit(
        mut self,
        limit: usize,
    ) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filters(&self) -> &[(String, JsonValue)] {
        &self.filters
    }

    pub fn ordering(&self) -> Option<&(String, Order)> {
        self.order_by.as_ref()
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    /// Whether a document satisfies every filter.
    pub fn matches(
        &self,
        doc: &HashMap<String, JsonValue>,
    ) -> bool {
        self.filters.iter().all(|(field, expected)| match lookup(doc, field) {
            Some(actual) => actual == expected,
            None => expected.is_null(),
        })
    }

    /// Compares two documents on the ordering field.
    pub fn compare(
        &self,
        a: &HashMap<String, JsonValue>,
        b: &HashMap<String, JsonValue>,
    ) -> Ordering {
        let Some((field, order)) = &self.order_by else {
            return Ordering::Equal;
        };
        let ordering = cmp_json(lookup(a, field), lookup(b, field));
        match order {
            Order::Asc => ordering,
            Order::Desc => ordering.reverse(),
        }
    }
}

fn lookup<'a>(
    doc: &'a HashMap<String, JsonValue>,
    path: &str,
) -> Option<&'a JsonValue> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn cmp_json(
    a: Option<&JsonValue>,
    b: Option<&JsonValue>,
) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal),
        },
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
