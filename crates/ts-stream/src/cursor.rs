//! Read path: bind active fields to a source and materialize entries.

use std::collections::BTreeMap;

use crate::buffer::{BufferSet, FieldId};
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::schema::{FieldKind, Schema};
use crate::store::ColumnSource;

/// Decide which fields an activation string turns on.
///
/// Blank activation selects everything. Otherwise each whitespace-separated
/// token is a case-sensitive prefix of the field's choose name. Counters are
/// always active. Returns `choose name -> active`.
pub fn activation_map(
    schema: &Schema,
    activation: &str,
    config: &StreamConfig,
) -> Result<BTreeMap<String, bool>> {
    let tokens: Vec<&str> = activation.split_whitespace().collect();
    let fields = schema.fields();
    let active = fields.iter().map(|f| {
        f.is_counter
            || tokens.is_empty()
            || tokens.iter().any(|t| schema.choose_name(f).starts_with(t))
    });

    for token in &tokens {
        if !fields.iter().any(|f| schema.choose_name(f).starts_with(token)) {
            if config.strict_activation {
                return Err(StreamError::UnknownField((*token).to_string()));
            }
            log::warn!("activation prefix '{token}' matches no field");
        }
    }

    Ok(fields
        .iter()
        .zip(active)
        .map(|(f, on)| (schema.choose_name(f).to_string(), on))
        .collect())
}

/// An open read binding between a [`ColumnSource`] and a [`BufferSet`].
pub struct RecordCursor {
    source: Box<dyn ColumnSource>,
    choose: BTreeMap<String, bool>,
    bound: Vec<FieldId>,
    counted: Vec<FieldId>,
    closed: bool,
}

impl RecordCursor {
    /// Activate fields and bind them to `source`.
    ///
    /// Every active field must exist in the source; otherwise nothing stays
    /// bound and `UnknownField` names the first missing column. Counters the
    /// source does not store are left unbound.
    pub fn open(
        source: impl ColumnSource + 'static,
        schema: &Schema,
        buffers: &mut BufferSet,
        activation: &str,
        config: &StreamConfig,
    ) -> Result<Self> {
        Self::open_boxed(Box::new(source), schema, buffers, activation, config)
    }

    /// [`open`](Self::open) for an already boxed source.
    pub fn open_boxed(
        mut source: Box<dyn ColumnSource>,
        schema: &Schema,
        buffers: &mut BufferSet,
        activation: &str,
        config: &StreamConfig,
    ) -> Result<Self> {
        if !source.good() {
            return Err(StreamError::ClosedStream);
        }
        let choose = activation_map(schema, activation, config)?;

        let mut bound = Vec::new();
        for field in schema.fields() {
            if !choose.get(schema.choose_name(field)).copied().unwrap_or(false) {
                continue;
            }
            if source.column(&field.branch_name).is_none() {
                if field.is_counter {
                    log::debug!("counter {} not stored, left unbound", field.branch_name);
                    continue;
                }
                return Err(StreamError::UnknownField(field.branch_name.clone()));
            }
            bound.push((field.branch_name.clone(), buffers.id(&field.field_name)?));
        }

        for (column, id) in &bound {
            if let Err(e) = source.select(column, *id) {
                source.clear_selection();
                return Err(e);
            }
        }

        let counted: Vec<FieldId> = bound
            .iter()
            .map(|(_, id)| *id)
            .filter(|&id| buffers.buffer(id).kind() == FieldKind::CounterArray)
            .collect();
        log::debug!(
            "bound {} of {} fields to tree {} ({} entries)",
            bound.len(),
            schema.fields().len(),
            source.tree_name(),
            source.entries()
        );
        buffers.init_defaults();
        Ok(Self {
            source,
            choose,
            bound: bound.into_iter().map(|(_, id)| id).collect(),
            counted,
            closed: false,
        })
    }

    /// Whether the field with this choose name is active.
    pub fn is_active(&self, name: &str) -> bool {
        self.choose.get(name).copied().unwrap_or(false)
    }

    /// Buffers bound to the source.
    pub fn bound(&self) -> &[FieldId] {
        &self.bound
    }

    /// Materialize entry `entry` into the bound buffers.
    pub fn read(&mut self, entry: u64, buffers: &mut BufferSet) -> Result<()> {
        if self.closed {
            return Err(StreamError::ClosedStream);
        }
        self.source.read(entry, buffers)?;
        for &id in &self.counted {
            buffers.apply_counter(id)?;
        }
        Ok(())
    }

    /// Entries available.
    pub fn size(&self) -> u64 {
        if self.closed { 0 } else { self.source.entries() }
    }

    /// Column listing of the source.
    pub fn ls(&self) -> String {
        self.source.ls()
    }

    /// Release the source. Safe to call repeatedly.
    pub fn close(&mut self) {
        if !self.closed {
            self.source.clear_selection();
            self.source.close();
            self.closed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "Tree T\n\n\
        int\tnJet\tnJet 1\n\
        float\tJet.PT\tJet_PT 7 nJet\n\
        float\tJet.Eta\tJet_Eta 7 nJet\n\
        float\tMuon.PT\tMuon_PT 4 nMuon\n\
        double\tHT\tHT 1\n";

    #[test]
    fn prefixes_activate_counters() {
        let schema = Schema::parse(SCHEMA).unwrap();
        let map = activation_map(&schema, "Jet.", &StreamConfig::default()).unwrap();
        assert!(map["Jet.PT"]);
        assert!(map["Jet.Eta"]);
        assert!(map["nJet"]);
        assert!(!map["Muon.PT"]);
        assert!(map["nMuon"]);
        assert!(!map["HT"]);
    }

    #[test]
    fn counters_stay_active_for_scalar_only_activation() {
        let schema = Schema::parse(SCHEMA).unwrap();
        let map = activation_map(&schema, "HT", &StreamConfig::default()).unwrap();
        assert!(map["HT"]);
        assert!(map["nJet"]);
        assert!(map["nMuon"]);
        assert!(!map["Jet.PT"]);
    }

    #[test]
    fn blank_activation_selects_all() {
        let schema = Schema::parse(SCHEMA).unwrap();
        let map = activation_map(&schema, "  ", &StreamConfig::default()).unwrap();
        assert!(map.values().all(|&on| on));
    }

    #[test]
    fn unmatched_prefix_warns_or_fails() {
        let schema = Schema::parse(SCHEMA).unwrap();
        let map = activation_map(&schema, "HT Tau", &StreamConfig::default()).unwrap();
        assert!(map["HT"]);
        let strict = StreamConfig { strict_activation: true };
        let err = activation_map(&schema, "HT Tau", &strict).unwrap_err();
        assert!(matches!(err, StreamError::UnknownField(t) if t == "Tau"));
    }
}
