//! Derive a `variables.txt` document from a store listing.
//!
//! Listing rows come in three shapes, all starting `idx branch : type`:
//! 4 tokens for scalars, 5 with a trailing `[max]` for arrays, and 7 with
//! `[max] <- counter` for counter-linked arrays. Counter rows end in `*` and
//! are not written out; the arrays that reference them carry the link.

use std::collections::HashMap;

use crate::config::SchemaConfig;
use crate::error::{Result, StreamError};

use super::field::{RawRow, SkippedField};
use super::parse::DEFAULT_TREE;
use super::types::FieldType;

const SKIPPED_TYPES: [&str; 3] = ["TLorentzVector", "TRefArray", "TRef"];

/// A `variables.txt` document ready to be written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariablesFile {
    /// Tree names for the header.
    pub tree_names: Vec<String>,
    /// Body rows in listing order.
    pub rows: Vec<RawRow>,
    /// Columns the listing showed but that cannot be described.
    pub skipped: Vec<SkippedField>,
}

impl VariablesFile {
    /// Scan a listing produced by `ColumnSource::ls()`.
    ///
    /// A listing's `[max]` is a buffer capacity and becomes the row's max
    /// count as is. Building a schema rounds it again, so capacities grow on
    /// every listing to schema pass (20 becomes 45).
    pub fn from_listing(listing: &str, config: &SchemaConfig) -> Result<Self> {
        let mut out = VariablesFile::default();
        let mut dupname: HashMap<String, (String, usize)> = HashMap::new();

        for (index, line) in listing.lines().enumerate() {
            let line_no = index + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some(first) = tokens.first() else { continue };
            match *first {
                "File" | "Entries" => continue,
                "Tree" => {
                    if let Some(name) = tokens.get(1) {
                        out.tree_names.push((*name).to_string());
                    }
                    continue;
                }
                _ => {}
            }
            if tokens.last() == Some(&"*") {
                continue;
            }

            let (branch, type_name, count, counter) = match tokens.as_slice() {
                [_, b, ":", t] => (*b, *t, 1, None),
                [_, b, ":", t, max] => (*b, *t, bracketed(line_no, max)?, None),
                [_, b, ":", t, max, "<-", c] => (*b, *t, bracketed(line_no, max)?, Some(*c)),
                _ => {
                    return Err(StreamError::schema(
                        line_no,
                        format!("unrecognised listing row: '{}'", line.trim()),
                    ));
                }
            };

            if SKIPPED_TYPES.contains(&type_name) || has_fixed_dimension(branch) {
                log::warn!("skipping {branch} ({type_name})");
                out.skipped.push(SkippedField {
                    branch_name: branch.to_string(),
                    count: count.max(0) as usize,
                    reason: format!("unsupported column type {type_name}"),
                });
                continue;
            }

            let field_type = FieldType::parse(type_name).map_err(|e| {
                StreamError::UnsupportedType(format!("line {line_no}: {e}"))
            })?;

            let tree = out.tree_names.last().map(String::as_str).unwrap_or(DEFAULT_TREE);
            let field_name = derive_name(branch, &mut dupname, config.use_tree_prefix.then_some(tree));

            out.rows.push(RawRow {
                line: line_no,
                type_name: field_type.to_string(),
                branch_name: branch.to_string(),
                field_name,
                count,
                counter_name: counter.map(str::to_string),
            });
        }

        if out.tree_names.is_empty() {
            out.tree_names.push(DEFAULT_TREE.to_string());
        }
        Ok(out)
    }

    /// The `variables.txt` text.
    pub fn render(&self) -> String {
        let mut text = String::new();
        for tree in &self.tree_names {
            text.push_str(&format!("Tree {tree}\n"));
        }
        text.push('\n');
        for row in &self.rows {
            text.push_str(&row.render());
            text.push('\n');
        }
        text
    }

    /// The `variables_skipped.txt` text, `None` when nothing was skipped.
    pub fn render_skipped(&self) -> Option<String> {
        if self.skipped.is_empty() {
            return None;
        }
        Some(self.skipped.iter().map(|s| format!("{s}\n")).collect())
    }
}

fn bracketed(line: usize, token: &str) -> Result<i64> {
    token
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| StreamError::schema(line, format!("expected '[count]', found '{token}'")))
}

fn has_fixed_dimension(branch: &str) -> bool {
    let mut rest = branch;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        if let Some(close) = after.find(']') {
            let inside = &after[..close];
            if !inside.is_empty() && inside.bytes().all(|b| b.is_ascii_digit()) {
                return true;
            }
            rest = &after[close + 1..];
        } else {
            break;
        }
    }
    false
}

/// Field name for a branch: `Jet_size.PT` becomes `Jet_PT`; a second branch
/// mapping to the same object name gets a numeric suffix on the object part.
fn derive_name(
    branch: &str,
    dupname: &mut HashMap<String, (String, usize)>,
    tree_prefix: Option<&str>,
) -> String {
    let mut parts: Vec<String> = branch.split('.').map(str::to_string).collect();
    let base = parts[0].rsplit('/').next().unwrap_or(&parts[0]).to_string();
    parts[0] = base.clone();
    if parts.len() > 1 {
        parts[0] = base.split('_').next().unwrap_or(&base).to_string();
    }

    let key = parts[0].clone();
    let entry = dupname.entry(key.clone()).or_insert_with(|| (base.clone(), 0));
    if entry.0 != base {
        entry.0 = base;
        entry.1 += 1;
    }
    if entry.1 > 0 {
        parts[0] = format!("{key}{}", entry.1);
    }

    let name = parts.join("_");
    match tree_prefix {
        Some(tree) => {
            let tree = tree.rsplit('/').next().unwrap_or(tree);
            format!("{tree}_{name}")
        }
        None => name,
    }
}
