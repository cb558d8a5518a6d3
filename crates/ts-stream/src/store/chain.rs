//! Several sources read as one continuous sequence of entries.

use crate::buffer::{BufferSet, FieldId};
use crate::error::{Result, StreamError};
use crate::schema::DEFAULT_TREE;

use super::{ColumnInfo, ColumnSource};

/// Concatenation of sources sharing a column layout.
///
/// Columns and tree name come from the first source. Selecting a column
/// selects it in every member, so a member lacking it fails at bind time.
pub struct ChainSource {
    sources: Vec<Box<dyn ColumnSource>>,
    /// Global entry index at which each source starts.
    starts: Vec<u64>,
    closed: bool,
}

impl ChainSource {
    /// Chain `sources` in order.
    pub fn new(sources: Vec<Box<dyn ColumnSource>>) -> Self {
        let mut starts = Vec::with_capacity(sources.len());
        let mut total = 0u64;
        for source in &sources {
            starts.push(total);
            total += source.entries();
        }
        log::debug!("chained {} sources, {total} entries", sources.len());
        Self { sources, starts, closed: false }
    }

    /// Number of member sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the chain has no members.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl ColumnSource for ChainSource {
    fn good(&self) -> bool {
        !self.closed && self.sources.iter().all(|s| s.good())
    }

    fn tree_name(&self) -> &str {
        self.sources.first().map(|s| s.tree_name()).unwrap_or(DEFAULT_TREE)
    }

    fn columns(&self) -> &[ColumnInfo] {
        self.sources.first().map(|s| s.columns()).unwrap_or(&[])
    }

    fn entries(&self) -> u64 {
        if self.closed {
            return 0;
        }
        self.sources.iter().map(|s| s.entries()).sum()
    }

    fn select(&mut self, column: &str, field: FieldId) -> Result<()> {
        for source in &mut self.sources {
            source.select(column, field)?;
        }
        Ok(())
    }

    fn clear_selection(&mut self) {
        self.sources.iter_mut().for_each(|s| s.clear_selection());
    }

    fn read(&mut self, entry: u64, buffers: &mut BufferSet) -> Result<()> {
        if self.closed {
            return Err(StreamError::ClosedStream);
        }
        let member = self.starts.partition_point(|&start| start <= entry);
        let Some(i) = member.checked_sub(1) else {
            return Err(StreamError::EntryOutOfRange { entry, entries: self.entries() });
        };
        let local = entry - self.starts[i];
        if local >= self.sources[i].entries() {
            return Err(StreamError::EntryOutOfRange { entry, entries: self.entries() });
        }
        self.sources[i].read(local, buffers)
    }

    fn close(&mut self) {
        self.sources.iter_mut().for_each(|s| s.close());
        self.closed = true;
    }
}
