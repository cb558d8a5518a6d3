//! Struct groups: array fields sharing a `prefix_` zipped into objects.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::field::FieldSpec;
use super::types::ElemType;

/// Index of a [`StructGroup`] within its schema, resolved once at binding time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub usize);

/// One member array of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    /// Name inside the object (`PT` for `Jet_PT`).
    pub name: String,
    /// Backing field.
    pub field_name: String,
    /// Element type objects expose for this member.
    pub elem: ElemType,
}

/// Array-of-structs projection over several column-wise arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructGroup {
    /// Position in the schema.
    pub id: GroupId,
    /// Object name (the shared prefix).
    pub name: String,
    /// Multiplicity shared by all members.
    pub max_count: usize,
    /// Members in schema order.
    pub members: Vec<GroupMember>,
    /// Counter fields of the members (usually one).
    pub counters: Vec<String>,
}

impl StructGroup {
    /// Position of a member by object-side name.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

fn prefix(name: &str) -> Option<&str> {
    match name.split_once('_') {
        Some((head, tail)) if !head.is_empty() && !tail.is_empty() => Some(head),
        _ => None,
    }
}

fn member_name(field_name: &str, object: &str) -> String {
    let stripped = field_name.strip_prefix(object).and_then(|s| s.strip_prefix('_'));
    let name = stripped.unwrap_or(field_name);
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("f{name}")
    } else {
        name.to_string()
    }
}

/// Derive groups from the requested names of every row and the final fields.
///
/// A prefix becomes a group when at least two rows carry it. Only array
/// fields join; the first one fixes the multiplicity.
pub fn derive_groups<'a>(
    requested_names: impl IntoIterator<Item = &'a str>,
    fields: &[FieldSpec],
) -> Vec<StructGroup> {
    let mut prefix_counts: HashMap<&str, usize> = HashMap::new();
    for name in requested_names {
        if let Some(p) = prefix(name) {
            *prefix_counts.entry(p).or_default() += 1;
        }
    }

    let mut groups: Vec<StructGroup> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    for field in fields {
        if field.is_counter || !field.is_array() {
            continue;
        }
        let Some(object) = prefix(&field.field_name) else { continue };
        if prefix_counts.get(object).copied().unwrap_or(0) < 2 {
            continue;
        }
        let slot = match by_name.get(object) {
            Some(&i) => i,
            None => {
                let i = groups.len();
                groups.push(StructGroup {
                    id: GroupId(i),
                    name: object.to_string(),
                    max_count: field.max_count,
                    members: Vec::new(),
                    counters: Vec::new(),
                });
                by_name.insert(object.to_string(), i);
                i
            }
        };
        let group = &mut groups[slot];
        if group.max_count != field.max_count {
            log::debug!(
                "{} (max {}) left out of group {} (max {})",
                field.field_name,
                field.max_count,
                group.name,
                group.max_count
            );
            continue;
        }
        group.members.push(GroupMember {
            name: member_name(&field.field_name, object),
            field_name: field.field_name.clone(),
            elem: field.field_type.elem,
        });
        if let Some(counter) = &field.counter_name {
            if !group.counters.contains(counter) {
                group.counters.push(counter.clone());
            }
        }
    }
    groups
}
