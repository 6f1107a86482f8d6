//! Data model: marketplace categories and the ads they are discovered from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One marketplace category. Serialized as `{"category_id": .., "category_name": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: Option<i64>,
    pub category_name: String,
}

impl Category {
    pub fn new(category_id: Option<i64>, category_name: impl Into<String>) -> Self {
        Self {
            category_id,
            category_name: category_name.into(),
        }
    }
}

/// Label used when a category has no name: `cat_<id>`.
pub fn fallback_name(id: i64) -> String {
    format!("cat_{}", id)
}

/// A single listing returned by the search endpoint.
///
/// Kept as raw JSON; only the category fields are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ad(pub Value);

impl Ad {
    /// `category_id` as an integer. The API sends it either as a number or a
    /// numeric string; anything else counts as absent.
    pub fn category_id(&self) -> Option<i64> {
        match self.0.get("category_id")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Non-empty `category_name` string.
    pub fn category_name(&self) -> Option<&str> {
        self.non_empty_str("category_name")
    }

    /// Non-empty `category` string, used when `category_name` is missing.
    pub fn category_label(&self) -> Option<&str> {
        self.non_empty_str("category")
    }

    fn non_empty_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}
