//! Row query description shared by every [`RowSource`](super::RowSource).

use std::cmp::Ordering;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Row;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { column: String, value: String },
    Gte { column: String, value: String },
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. } | Filter::Gte { column, .. } => column,
        }
    }

    /// Evaluate the filter against a row. Missing columns never match.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(cell) = row.get(self.column()) else {
            return false;
        };
        match self {
            Filter::Eq { value, .. } => cell_text(cell).is_some_and(|text| &text == value),
            Filter::Gte { value, .. } => {
                compare_cell(cell, value).is_some_and(|ord| ord != Ordering::Less)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Select / filter / order / limit over a named table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowQuery {
    pub table: String,
    /// Comma separated column list, `*` for all.
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter::Eq {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn gte(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter::Gte {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Requested column names, or `None` for `*`.
    pub fn column_list(&self) -> Option<Vec<&str>> {
        if self.columns.trim() == "*" {
            return None;
        }
        Some(
            self.columns
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .collect(),
        )
    }
}

/// Text form of a scalar cell, as used by equality filters.
pub fn cell_text(cell: &Value) -> Option<String> {
    match cell {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric comparison when both sides are numbers, instant comparison when
/// both are RFC 3339 timestamps, text comparison otherwise.
pub fn compare_cell(cell: &Value, value: &str) -> Option<Ordering> {
    if let (Some(a), Ok(b)) = (cell.as_f64(), value.parse::<f64>()) {
        return a.partial_cmp(&b);
    }
    let text = cell_text(cell)?;
    if let (Ok(a), Ok(b)) = (
        DateTime::parse_from_rfc3339(&text),
        DateTime::parse_from_rfc3339(value),
    ) {
        return Some(a.cmp(&b));
    }
    Some(text.as_str().cmp(value))
}

/// Ordering of two cells for `order_by`; nulls and missing sort last.
pub fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => match (cell_text(a), cell_text(b)) {
                (Some(_), Some(text)) => compare_cell(a, &text).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
