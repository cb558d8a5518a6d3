//! Schema model: `variables.txt` rows, derived struct groups, skipped fields.
//!
//! A schema is built once per stream and is immutable afterwards. Building
//! fails fast: any malformed row aborts the whole schema, except rows of
//! unsupported composite types, which land in [`Schema::skipped`].

pub mod field;
pub mod group;
pub mod listing;
pub mod naming;
pub mod parse;
pub mod types;

use std::collections::HashMap;

pub use field::{FieldKind, FieldSpec, RawRow, SkippedField};
pub use group::{GroupId, GroupMember, StructGroup};
pub use listing::VariablesFile;
pub use naming::{NameRegistry, round_max_count};
pub use parse::{DEFAULT_TREE, SchemaFormat};
pub use types::{ElemType, FieldType};

use crate::config::SchemaConfig;
use crate::error::{Result, StreamError};

/// A parsed and normalized schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    tree_names: Vec<String>,
    fields: Vec<FieldSpec>,
    groups: Vec<StructGroup>,
    skipped: Vec<SkippedField>,
    renamed: Vec<(String, String)>,
}

impl Schema {
    /// Parse a `variables.txt` document or a store listing with default options.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with(text, &SchemaConfig::default())
    }

    /// Parse with explicit options.
    pub fn parse_with(text: &str, config: &SchemaConfig) -> Result<Self> {
        match SchemaFormat::detect(text) {
            SchemaFormat::Variables => {
                let (trees, rows) = parse::parse_variables(text)?;
                Self::build(trees, rows, config)
            }
            SchemaFormat::Listing => {
                let vars = VariablesFile::from_listing(text, config)?;
                let mut schema = Self::build(vars.tree_names, vars.rows, config)?;
                let mut skipped = vars.skipped;
                skipped.append(&mut schema.skipped);
                schema.skipped = skipped;
                Ok(schema)
            }
        }
    }

    /// Normalize raw rows: round counts, skip unsupported rows, resolve types,
    /// de-duplicate names, link counters and derive struct groups.
    pub fn build(tree_names: Vec<String>, rows: Vec<RawRow>, config: &SchemaConfig) -> Result<Self> {
        let mut registry = NameRegistry::new();
        let mut fields: Vec<FieldSpec> = Vec::with_capacity(rows.len());
        let mut skipped = Vec::new();
        let mut renamed = Vec::new();

        for row in &rows {
            let max_count = round_max_count(row.count, config.default_max_count);

            let lowered = row.type_name.to_ascii_lowercase();
            let reason = if row.field_name.contains('[') && max_count > 1 {
                Some("bracketed fixed-size array")
            } else if lowered.contains("ref") {
                Some("reference type")
            } else if lowered.contains("lorentz") {
                Some("Lorentz vector type")
            } else {
                None
            };
            if let Some(reason) = reason {
                log::warn!("skipping {} ({reason})", row.branch_name);
                skipped.push(SkippedField {
                    branch_name: row.branch_name.clone(),
                    count: max_count,
                    reason: reason.to_string(),
                });
                continue;
            }

            let field_type = FieldType::parse(&row.type_name).map_err(|e| match e {
                StreamError::UnsupportedType(msg) => {
                    StreamError::UnsupportedType(format!("line {}: {msg}", row.line))
                }
                other => other,
            })?;

            if !field_type.is_vector && max_count > 1 && row.counter_name.is_none() {
                return Err(StreamError::schema(
                    row.line,
                    format!("array {} does not have a leaf counter name", row.field_name),
                ));
            }

            let field_name = registry.claim(&row.field_name);
            if field_name != row.field_name {
                log::warn!("duplicate name {}; changed to {field_name}", row.field_name);
                renamed.push((row.field_name.clone(), field_name.clone()));
            }

            fields.push(FieldSpec {
                field_type,
                branch_name: row.branch_name.clone(),
                field_name,
                max_count,
                counter_name: row.counter_name.clone(),
                is_counter: false,
            });
        }

        link_counters(&mut fields, &mut registry)?;

        let groups = group::derive_groups(rows.iter().map(|r| r.field_name.as_str()), &fields);

        Ok(Self { tree_names, fields, groups, skipped, renamed })
    }

    /// Tree names from the header (at least one).
    pub fn tree_names(&self) -> &[String] {
        &self.tree_names
    }

    /// Whether the schema describes a single tree.
    pub fn is_single_tree(&self) -> bool {
        self.tree_names.len() <= 1
    }

    /// All fields in declaration order (synthesized counters last).
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Field by generated name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.field_name == name)
    }

    /// Field bound to a persisted column.
    pub fn field_by_branch(&self, branch: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.branch_name == branch)
    }

    /// Struct groups in schema order.
    pub fn groups(&self) -> &[StructGroup] {
        &self.groups
    }

    /// Group by object name.
    pub fn group(&self, name: &str) -> Option<&StructGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Rows excluded from the buffer layout.
    pub fn skipped(&self) -> &[SkippedField] {
        &self.skipped
    }

    /// `variables_skipped.txt` contents, `None` when nothing was skipped.
    pub fn skipped_report(&self) -> Option<String> {
        if self.skipped.is_empty() {
            return None;
        }
        Some(self.skipped.iter().map(|s| format!("{s}\n")).collect())
    }

    /// `(requested, assigned)` for every de-duplicated name.
    pub fn renamed(&self) -> &[(String, String)] {
        &self.renamed
    }

    /// Name used by the activation list for a field: the branch without its
    /// `tree/` path in single-tree schemas, the full branch otherwise.
    pub fn choose_name<'a>(&self, field: &'a FieldSpec) -> &'a str {
        if self.is_single_tree() {
            field.branch_name.rsplit('/').next().unwrap_or(&field.branch_name)
        } else {
            &field.branch_name
        }
    }
}

/// Force every referenced counter to an integer scalar, synthesizing it when
/// no row declares it. Count-1 rows may name a counter too; they stay scalars.
fn link_counters(fields: &mut Vec<FieldSpec>, registry: &mut NameRegistry) -> Result<()> {
    let mut counters: Vec<String> = Vec::new();
    for field in fields.iter() {
        if !field.field_type.is_vector {
            if let Some(counter) = &field.counter_name {
                if !counters.contains(counter) {
                    counters.push(counter.clone());
                }
            }
        }
    }

    let positions: HashMap<String, usize> = fields
        .iter()
        .enumerate()
        .flat_map(|(i, f)| [(f.field_name.clone(), i), (f.branch_name.clone(), i)])
        .rev()
        .collect();

    for counter in counters {
        match positions.get(&counter) {
            Some(&i) => {
                let field = &mut fields[i];
                if field.field_type.is_vector || field.max_count > 1 {
                    return Err(StreamError::schema(
                        0,
                        format!("counter {counter} is declared as an array"),
                    ));
                }
                if field.field_type.elem != ElemType::Int {
                    log::debug!("counter {} read as int (declared {})", counter, field.field_type);
                }
                field.field_type = FieldType::scalar(ElemType::Int);
                field.max_count = 1;
                field.counter_name = None;
                field.is_counter = true;
            }
            None => {
                let field_name = registry.claim(&counter);
                fields.push(FieldSpec {
                    field_type: FieldType::scalar(ElemType::Int),
                    branch_name: counter.clone(),
                    field_name,
                    max_count: 1,
                    counter_name: None,
                    is_counter: true,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELPHES: &str = "Tree Delphes\n\n\
        long\tEvent.Number\tEvent_Number 1\n\
        float\tJet.PT\tJet_PT 7 Jet_size\n\
        float\tJet.Eta\tJet_Eta 7 Jet_size\n\
        int\tJet.Flavor\tJet_Flavor 7 Jet_size\n\
        float\tMuon.PT\tMuon_PT 4 Muon_size\n\
        vector<double>\tweights\tweights 0\n\
        TRefArray\tJet.Constituents\tJet_Constituents 7 Jet_size\n\
        double\tHT\tHT 1\n\
        double\tHT\tHT 1\n";

    #[test]
    fn builds_fields_groups_and_skips() {
        let schema = Schema::parse(DELPHES).unwrap();
        assert_eq!(schema.tree_names(), ["Delphes"]);

        let pt = schema.field("Jet_PT").unwrap();
        assert_eq!(pt.max_count, 20);
        assert_eq!(pt.kind(), FieldKind::CounterArray);

        let weights = schema.field("weights").unwrap();
        assert_eq!(weights.kind(), FieldKind::Vector);
        assert_eq!(weights.max_count, 100);

        let counter = schema.field("Jet_size").unwrap();
        assert!(counter.is_counter);
        assert_eq!(counter.field_type, FieldType::scalar(ElemType::Int));

        assert_eq!(schema.skipped_report().unwrap(), "Jet.Constituents[20]\n");
        assert_eq!(schema.renamed(), [("HT".to_string(), "HT2".to_string())]);

        let jet = schema.group("Jet").unwrap();
        let members: Vec<&str> = jet.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(members, vec!["PT", "Eta", "Flavor"]);
        assert_eq!(jet.counters, vec!["Jet_size".to_string()]);
        // Muon has a single row: no group.
        assert!(schema.group("Muon").is_none());
    }

    #[test]
    fn array_without_counter_is_fatal() {
        let err = Schema::parse("Tree T\n\nfloat\tJet.PT\tJet_PT 7\n").unwrap_err();
        assert!(matches!(err, StreamError::Schema { line: 3, .. }));
    }

    #[test]
    fn declared_counter_row_is_forced_to_int() {
        let text = "Tree T\n\ndouble\tnjet\tnjet 1\nfloat\tjetEt\tjetEt 20 njet\n";
        let schema = Schema::parse(text).unwrap();
        let njet = schema.field("njet").unwrap();
        assert!(njet.is_counter);
        assert_eq!(njet.field_type.elem, ElemType::Int);
        assert_eq!(schema.fields().len(), 2);
    }

    #[test]
    fn single_count_rows_declare_their_counter() {
        let text = "Tree T\n\nfloat\tJet.PT\tJet_PT 7 n\nfloat\tJet.Lead\tJet_Lead 1 n\n\
            float\tMET\tMET 1 nMET\n";
        let schema = Schema::parse(text).unwrap();
        assert_eq!(schema.field("Jet_Lead").unwrap().kind(), FieldKind::Scalar);
        assert!(schema.field("n").unwrap().is_counter);
        let n_met = schema.field("nMET").unwrap();
        assert!(n_met.is_counter);
        assert_eq!(n_met.field_type, FieldType::scalar(ElemType::Int));
    }

    #[test]
    fn unresolvable_vector_type() {
        let err = Schema::parse("Tree T\n\nvector<>\tv\tv 10\n").unwrap_err();
        assert!(matches!(err, StreamError::UnsupportedType(_)));
    }

    #[test]
    fn choose_names_strip_tree_path() {
        let schema = Schema::parse("Tree T\n\ndouble\tT/HT\tHT 1\n").unwrap();
        let field = schema.field("HT").unwrap();
        assert_eq!(schema.choose_name(field), "HT");
    }

    #[test]
    fn listing_documents_parse_directly() {
        let listing = "Tree    Events\nEntries 3\n   0 njet : int *\n   1 jetEt : double [20] <- njet\n";
        let schema = Schema::parse(listing).unwrap();
        assert_eq!(schema.field("jetEt").unwrap().max_count, 45);
        assert!(schema.field("njet").unwrap().is_counter);
    }
}
