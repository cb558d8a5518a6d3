//! Object views over struct groups and the per-entry selection mask.
//!
//! A struct group zips its member arrays into objects: object `i` of `Jet`
//! holds `Jet_PT[i]`, `Jet_Eta[i]`, and so on. Selecting objects and calling
//! [`save_objects`] compacts the member arrays to the selected indices.

use std::collections::BTreeMap;
use std::fmt;

use crate::buffer::{BufferSet, Value};
use crate::error::{Result, StreamError};
use crate::schema::{GroupId, Schema, StructGroup};

/// One reconstructed object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectView {
    group: String,
    index: usize,
    fields: Vec<(String, Value)>,
}

impl ObjectView {
    /// Group (object type) name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Position within the entry's arrays.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Member value by name.
    pub fn get(&self, member: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == member).map(|(_, v)| v)
    }

    /// Numeric member value.
    pub fn get_f64(&self, member: &str) -> Option<f64> {
        self.get(member).and_then(Value::as_f64)
    }

    /// Members in group order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl fmt::Display for ObjectView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}[{}]", self.group, self.index)?;
        for (name, value) in &self.fields {
            writeln!(f, "  {name:<24}: {value}")?;
        }
        Ok(())
    }
}

/// Number of complete objects: the shortest member length.
pub fn group_len(group: &StructGroup, buffers: &BufferSet) -> Result<usize> {
    let mut len: Option<usize> = None;
    for member in &group.members {
        let n = buffers.len(&member.field_name)?;
        len = Some(len.map_or(n, |l| l.min(n)));
    }
    Ok(len.unwrap_or(0))
}

/// Objects of one group for the current entry.
pub fn fill_group(schema: &Schema, buffers: &BufferSet, id: GroupId) -> Result<Vec<ObjectView>> {
    let group = group_by_id(schema, id)?;
    let len = group_len(group, buffers)?;
    let mut objects = Vec::with_capacity(len);
    for index in 0..len {
        let mut fields = Vec::with_capacity(group.members.len());
        for member in &group.members {
            let value = buffers.value(&member.field_name, index)?.cast(member.elem)?;
            fields.push((member.name.clone(), value));
        }
        objects.push(ObjectView { group: group.name.clone(), index, fields });
    }
    Ok(objects)
}

/// Objects of every group, in schema order.
pub fn fill_all(schema: &Schema, buffers: &BufferSet) -> Result<Vec<(GroupId, Vec<ObjectView>)>> {
    schema
        .groups()
        .iter()
        .map(|g| Ok((g.id, fill_group(schema, buffers, g.id)?)))
        .collect()
}

fn group_by_id(schema: &Schema, id: GroupId) -> Result<&StructGroup> {
    schema
        .groups()
        .get(id.0)
        .ok_or_else(|| StreamError::UnknownField(format!("group #{}", id.0)))
}

/// Per-entry object selection: group -> ordered indices to keep.
///
/// Declarations survive [`clear`](Self::clear); indices do not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMap {
    selected: BTreeMap<GroupId, Vec<usize>>,
}

impl IndexMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare intent to select objects of `id`.
    pub fn declare(&mut self, id: GroupId) {
        self.selected.entry(id).or_default();
    }

    /// Whether `id` was declared.
    pub fn is_declared(&self, id: GroupId) -> bool {
        self.selected.contains_key(&id)
    }

    /// Keep object `index` of group `id`.
    pub fn push(&mut self, schema: &Schema, id: GroupId, index: usize) -> Result<()> {
        match self.selected.get_mut(&id) {
            Some(indices) => {
                indices.push(index);
                Ok(())
            }
            None => {
                let name = group_by_id(schema, id)?.name.clone();
                Err(StreamError::SelectionNotDeclared(name))
            }
        }
    }

    /// Indices pushed for `id` this entry.
    pub fn indices(&self, id: GroupId) -> Option<&[usize]> {
        self.selected.get(&id).map(Vec::as_slice)
    }

    /// Forget the indices, keep the declarations.
    pub fn clear(&mut self) {
        self.selected.values_mut().for_each(Vec::clear);
    }

    /// Declared groups.
    pub fn declared(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.selected.keys().copied()
    }
}

/// Compact every declared group to its selected indices.
///
/// Member arrays are rewritten in push order and the group's counters set
/// to the new length. A declared group with no indices keeps nothing;
/// undeclared groups are untouched. All indices are checked before any
/// buffer changes.
pub fn save_objects(schema: &Schema, buffers: &mut BufferSet, map: &IndexMap) -> Result<()> {
    let mut plan = Vec::new();
    for (&id, indices) in &map.selected {
        let group = group_by_id(schema, id)?;
        let len = group_len(group, buffers)?;
        if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
            return Err(StreamError::IndexOutOfRange { name: group.name.clone(), index: bad, len });
        }
        plan.push((group, indices.as_slice()));
    }

    for (group, indices) in plan {
        for member in &group.members {
            let id = buffers.id(&member.field_name)?;
            buffers.buffer_mut(id).retain_indices(indices)?;
        }
        for counter in &group.counters {
            buffers.set_value(counter, 0, Value::Int(indices.len() as i32))?;
        }
        log::debug!("kept {} {} objects", indices.len(), group.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "Tree T\n\n\
        int\tnJet\tnJet 1\n\
        float\tJet.PT\tJet_PT 7 nJet\n\
        float\tJet.Eta\tJet_Eta 7 nJet\n\
        int\tJet.Flavor\tJet_Flavor 7 nJet\n";

    fn filled() -> (Schema, BufferSet) {
        let schema = Schema::parse(SCHEMA).unwrap();
        let mut buffers = BufferSet::declare(&schema);
        buffers.set_array("Jet_PT", &[50.0f32, 40.0, 30.0]).unwrap();
        buffers.set_array("Jet_Eta", &[0.1f32, -1.2, 2.0]).unwrap();
        buffers.set_array("Jet_Flavor", &[5, 0, 4]).unwrap();
        buffers.set_scalar("nJet", 3).unwrap();
        (schema, buffers)
    }

    #[test]
    fn views_zip_members() {
        let (schema, buffers) = filled();
        let jet = schema.group("Jet").unwrap().id;
        let jets = fill_group(&schema, &buffers, jet).unwrap();
        assert_eq!(jets.len(), 3);
        assert_eq!(jets[1].get_f64("PT"), Some(40.0));
        assert_eq!(jets[2].get("Flavor"), Some(&Value::Int(4)));
        assert!(jets[0].to_string().starts_with("Jet[0]\n"));
        assert_eq!(fill_all(&schema, &buffers).unwrap().len(), 1);
    }

    #[test]
    fn shortest_member_bounds_objects() {
        let (schema, mut buffers) = filled();
        buffers.set_array("Jet_Eta", &[0.1f32]).unwrap();
        let jet = schema.group("Jet").unwrap().id;
        assert_eq!(fill_group(&schema, &buffers, jet).unwrap().len(), 1);
    }

    #[test]
    fn save_keeps_selected_in_push_order() {
        let (schema, mut buffers) = filled();
        let jet = schema.group("Jet").unwrap().id;
        let mut map = IndexMap::new();
        map.declare(jet);
        map.push(&schema, jet, 2).unwrap();
        map.push(&schema, jet, 0).unwrap();
        save_objects(&schema, &mut buffers, &map).unwrap();
        assert_eq!(buffers.array::<f32>("Jet_PT").unwrap(), &[30.0, 50.0]);
        assert_eq!(buffers.array::<i32>("Jet_Flavor").unwrap(), &[4, 5]);
        assert_eq!(buffers.scalar::<i32>("nJet").unwrap(), 2);
    }

    #[test]
    fn declared_but_empty_keeps_nothing() {
        let (schema, mut buffers) = filled();
        let jet = schema.group("Jet").unwrap().id;
        let mut map = IndexMap::new();
        map.declare(jet);
        save_objects(&schema, &mut buffers, &map).unwrap();
        assert_eq!(buffers.len("Jet_PT").unwrap(), 0);
        assert_eq!(buffers.scalar::<i32>("nJet").unwrap(), 0);
    }

    #[test]
    fn undeclared_push_and_bad_index() {
        let (schema, mut buffers) = filled();
        let jet = schema.group("Jet").unwrap().id;
        let mut map = IndexMap::new();
        assert!(matches!(map.push(&schema, jet, 0), Err(StreamError::SelectionNotDeclared(n)) if n == "Jet"));

        map.declare(jet);
        map.push(&schema, jet, 7).unwrap();
        let err = save_objects(&schema, &mut buffers, &map).unwrap_err();
        assert!(matches!(err, StreamError::IndexOutOfRange { index: 7, len: 3, .. }));
        assert_eq!(buffers.len("Jet_PT").unwrap(), 3);
    }

    #[test]
    fn clear_keeps_declarations() {
        let schema = Schema::parse(SCHEMA).unwrap();
        let jet = schema.group("Jet").unwrap().id;
        let mut map = IndexMap::new();
        map.declare(jet);
        map.push(&schema, jet, 1).unwrap();
        map.clear();
        assert!(map.is_declared(jet));
        assert_eq!(map.indices(jet), Some(&[][..]));
    }
}
