//! Column store adapters.
//!
//! A [`ColumnSource`] supplies stored entries column by column; a
//! [`ColumnSink`] persists them. Streams only talk to these traits, so the
//! in-memory store, the on-disk format and chained inputs are interchangeable.

pub mod basket;
pub mod chain;
pub mod file;
pub mod memory;

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::buffer::{BufferSet, FieldBuffer, FieldId};
use crate::error::{Result, StreamError};
use crate::schema::{ElemType, FieldKind, FieldType};

pub use chain::ChainSource;
pub use file::{FileSink, FileSource};
pub use memory::{MemorySink, MemorySource, MemoryStore};

/// How many values a stored column holds per entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnShape {
    /// Exactly one value.
    Scalar,
    /// Variable length, stored with each entry.
    Vector,
    /// Declared as `name[N]`.
    Fixed(usize),
    /// Length given by another column (`name[counter]`).
    Counted(String),
}

/// Description of one stored column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Persisted column (branch) name.
    pub name: String,
    /// Element type as stored.
    pub elem: ElemType,
    /// Per-entry shape.
    pub shape: ColumnShape,
    /// Capacity of the writing buffer.
    pub max_count: usize,
    /// Some other column names this one as its counter.
    pub is_counter: bool,
}

impl ColumnInfo {
    /// Whether entries hold a length-prefixed list of values.
    pub fn is_array(&self) -> bool {
        self.shape != ColumnShape::Scalar
    }

    /// Counter column for counter-linked arrays.
    pub fn counter(&self) -> Option<&str> {
        match &self.shape {
            ColumnShape::Counted(c) => Some(c),
            _ => None,
        }
    }

    /// Declared type (`vector<T>` for vector columns).
    pub fn field_type(&self) -> FieldType {
        match self.shape {
            ColumnShape::Vector => FieldType::vector(self.elem),
            _ => FieldType::scalar(self.elem),
        }
    }

    /// One row of the `ls()` listing.
    pub fn listing_row(&self, index: usize) -> String {
        let name = match self.shape {
            ColumnShape::Fixed(n) => format!("{}[{n}]", self.name),
            _ => self.name.clone(),
        };
        let mut row = format!("{index:4} {name:<32} : {}", self.field_type());
        match &self.shape {
            ColumnShape::Scalar if self.is_counter => row.push_str(" *"),
            ColumnShape::Scalar => {}
            ColumnShape::Vector | ColumnShape::Fixed(_) => {
                let _ = write!(row, " [{}]", self.max_count);
            }
            ColumnShape::Counted(counter) => {
                let _ = write!(row, " [{}] <- {counter}", self.max_count);
            }
        }
        row
    }
}

/// The `ls()` text for a tree.
pub fn render_listing(tree: &str, entries: u64, columns: &[ColumnInfo]) -> String {
    let mut out = format!("Tree    {tree}\nEntries {entries}\n");
    for (i, column) in columns.iter().enumerate() {
        out.push_str(&column.listing_row(i));
        out.push('\n');
    }
    out
}

/// Split a column declaration: `name`, `name[counter]` or `name[N]`.
pub fn parse_decl(decl: &str) -> Result<(&str, Option<&str>)> {
    let decl = decl.trim();
    match decl.find('[') {
        None => Ok((decl, None)),
        Some(open) => {
            let inner = decl[open + 1..].strip_suffix(']').filter(|s| !s.is_empty());
            match inner {
                Some(inner) if open > 0 => Ok((&decl[..open], Some(inner))),
                _ => Err(StreamError::schema(0, format!("malformed column declaration '{decl}'"))),
            }
        }
    }
}

/// Append the column described by `decl` and `buffer` to `columns`.
///
/// Scalar versus array follows the buffer; a bracketed counter must name a
/// column added earlier, which is then marked as a counter.
pub fn declare_column(
    columns: &mut Vec<ColumnInfo>,
    decl: &str,
    buffer: &FieldBuffer,
) -> Result<usize> {
    let (name, bracket) = parse_decl(decl)?;
    if columns.iter().any(|c| c.name == name) {
        return Err(StreamError::schema(0, format!("column {name} declared twice")));
    }
    let shape = match bracket {
        Some(inner) => match inner.parse::<usize>() {
            Ok(n) => ColumnShape::Fixed(n),
            Err(_) => {
                let counter = columns
                    .iter_mut()
                    .find(|c| c.name == inner)
                    .ok_or_else(|| StreamError::UnknownField(inner.to_string()))?;
                if counter.is_array() {
                    return Err(StreamError::TypeMismatch(format!(
                        "counter {inner} of {name} is an array"
                    )));
                }
                counter.is_counter = true;
                ColumnShape::Counted(inner.to_string())
            }
        },
        None if buffer.is_array() => ColumnShape::Vector,
        None => ColumnShape::Scalar,
    };
    if shape != ColumnShape::Scalar && !buffer.is_array() {
        return Err(StreamError::TypeMismatch(format!("{name} is declared as an array but holds a scalar")));
    }
    let max_count = if buffer.kind() == FieldKind::Scalar { 1 } else { buffer.capacity() };
    columns.push(ColumnInfo {
        name: name.to_string(),
        elem: buffer.elem(),
        shape,
        max_count,
        is_counter: buffer.spec().is_counter,
    });
    Ok(columns.len() - 1)
}

/// Read side of a column store.
pub trait ColumnSource {
    /// Whether the source is open and usable.
    fn good(&self) -> bool;

    /// Tree name.
    fn tree_name(&self) -> &str;

    /// Stored columns.
    fn columns(&self) -> &[ColumnInfo];

    /// Number of stored entries.
    fn entries(&self) -> u64;

    /// Route `column` into buffer `field` on every read.
    fn select(&mut self, column: &str, field: FieldId) -> Result<()>;

    /// Drop every routing set up by [`select`](Self::select).
    fn clear_selection(&mut self);

    /// Load one entry into the selected buffers.
    fn read(&mut self, entry: u64, buffers: &mut BufferSet) -> Result<()>;

    /// Release the underlying resources. Safe to call repeatedly.
    fn close(&mut self);

    /// Column by name.
    fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns().iter().find(|c| c.name == name)
    }

    /// Human-readable column listing.
    fn ls(&self) -> String {
        render_listing(self.tree_name(), self.entries(), self.columns())
    }
}

/// Write side of a column store.
pub trait ColumnSink {
    /// Whether the sink is open and usable.
    fn good(&self) -> bool;

    /// Declare a column fed from buffer `field`. Counters come first.
    fn add(&mut self, decl: &str, field: FieldId, buffers: &BufferSet) -> Result<()>;

    /// Append one entry from the current buffer contents.
    fn commit(&mut self, buffers: &BufferSet) -> Result<()>;

    /// Entries written so far.
    fn entries(&self) -> u64;

    /// Flush and release. Safe to call repeatedly.
    fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn decl_forms() {
        assert_eq!(parse_decl("HT").unwrap(), ("HT", None));
        assert_eq!(parse_decl("Jet.PT[njet]").unwrap(), ("Jet.PT", Some("njet")));
        assert_eq!(parse_decl("ecal[5]").unwrap(), ("ecal", Some("5")));
        assert!(parse_decl("[n]").is_err());
        assert!(parse_decl("x[n").is_err());
        assert!(parse_decl("x[]").is_err());
    }

    #[test]
    fn declare_marks_counters_and_renders() {
        let schema =
            Schema::parse("Tree T\n\nint\tnjet\tnjet 1\nfloat\tJet.PT\tJet_PT 7 njet\nvector<double>\tw\tw 0\n")
                .unwrap();
        let buffers = BufferSet::declare(&schema);
        let mut columns = Vec::new();
        let buffer = |name: &str| buffers.get(name).unwrap();

        declare_column(&mut columns, "njet", buffer("njet")).unwrap();
        declare_column(&mut columns, "Jet.PT[njet]", buffer("Jet_PT")).unwrap();
        declare_column(&mut columns, "w", buffer("w")).unwrap();
        assert!(columns[0].is_counter);

        let listing = render_listing("T", 2, &columns);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "Tree    T");
        assert_eq!(lines[1], "Entries 2");
        assert!(lines[2].trim_end().ends_with(": int *"));
        assert!(lines[3].ends_with(": float [20] <- njet"));
        assert!(lines[4].ends_with(": vector<double> [100]"));
    }

    #[test]
    fn counter_must_exist() {
        let schema = Schema::parse("Tree T\n\nfloat\tJet.PT\tJet_PT 7 njet\n").unwrap();
        let buffers = BufferSet::declare(&schema);
        let mut columns = Vec::new();
        let err = declare_column(&mut columns, "Jet.PT[njet]", buffers.get("Jet_PT").unwrap())
            .unwrap_err();
        assert!(matches!(err, StreamError::UnknownField(name) if name == "njet"));
    }
}
