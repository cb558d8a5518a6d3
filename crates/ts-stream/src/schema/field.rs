//! Schema rows.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::FieldType;

/// How a field's length is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// One value per entry.
    Scalar,
    /// `vector<T>`: length stored with each entry.
    Vector,
    /// Array whose length is the current value of a counter field.
    CounterArray,
}

/// One normalized schema row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Declared type.
    pub field_type: FieldType,
    /// Persisted column name (may carry a `tree/` or `.leaf` path).
    pub branch_name: String,
    /// Unique generated identifier.
    pub field_name: String,
    /// Buffer capacity after rounding.
    pub max_count: usize,
    /// Counter field bounding this array's length.
    pub counter_name: Option<String>,
    /// This field is a counter for some array.
    pub is_counter: bool,
}

impl FieldSpec {
    /// Length classification.
    pub fn kind(&self) -> FieldKind {
        if self.field_type.is_vector {
            FieldKind::Vector
        } else if self.max_count > 1 && self.counter_name.is_some() {
            FieldKind::CounterArray
        } else {
            FieldKind::Scalar
        }
    }

    /// Whether the buffer holds more than one cell.
    pub fn is_array(&self) -> bool {
        self.kind() != FieldKind::Scalar
    }

    /// Column declaration passed to a sink: `branch[counter]` for counter arrays.
    pub fn column_decl(&self) -> String {
        match (&self.counter_name, self.kind()) {
            (Some(counter), FieldKind::CounterArray) => format!("{}[{}]", self.branch_name, counter),
            _ => self.branch_name.clone(),
        }
    }
}

/// A raw `variables.txt` body row before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based source line (0 for synthesized rows).
    pub line: usize,
    /// Type token as written.
    pub type_name: String,
    /// Branch (column) name.
    pub branch_name: String,
    /// Requested field name.
    pub field_name: String,
    /// Declared count (unrounded, may be < 1).
    pub count: i64,
    /// Optional counter name.
    pub counter_name: Option<String>,
}

impl RawRow {
    /// Render as a `variables.txt` body line.
    pub fn render(&self) -> String {
        let counter = self.counter_name.as_deref().unwrap_or("");
        format!(
            "{}\t{}\t{} {} {}",
            self.type_name, self.branch_name, self.field_name, self.count, counter
        )
        .trim_end()
        .to_string()
    }
}

/// A row excluded from the buffer layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedField {
    /// Branch name.
    pub branch_name: String,
    /// Declared (rounded) count.
    pub count: usize,
    /// Why it was skipped.
    pub reason: String,
}

impl fmt::Display for SkippedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.branch_name, self.count)
    }
}
