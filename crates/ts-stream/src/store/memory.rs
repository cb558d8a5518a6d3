//! In-memory column store.
//!
//! A [`MemoryStore`] is a shared handle; [`MemoryStore::sink`] writes into it
//! and [`MemoryStore::source`] reads back what was written, which makes it the
//! store of choice for tests and for skims that never touch disk.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::{BufferSet, Column, FieldId};
use crate::error::{Result, StreamError};

use super::{ColumnInfo, ColumnSink, ColumnSource, declare_column};

#[derive(Debug, Default)]
struct Inner {
    tree: String,
    columns: Vec<ColumnInfo>,
    /// One stored column per entry, per column.
    data: Vec<Vec<Column>>,
    entries: u64,
}

/// Shared in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryStore {
    /// Empty store for `tree`.
    pub fn new(tree: &str) -> Self {
        let inner = Inner { tree: tree.to_string(), ..Inner::default() };
        Self { inner: Rc::new(RefCell::new(inner)) }
    }

    /// Stored entries.
    pub fn entries(&self) -> u64 {
        self.inner.borrow().entries
    }

    /// Writer appending to this store.
    pub fn sink(&self) -> MemorySink {
        MemorySink { store: self.clone(), bound: Vec::new(), closed: false }
    }

    /// Reader over a snapshot of the current column list.
    pub fn source(&self) -> MemorySource {
        let inner = self.inner.borrow();
        MemorySource {
            store: self.clone(),
            tree: inner.tree.clone(),
            columns: inner.columns.clone(),
            selected: Vec::new(),
            closed: false,
        }
    }
}

/// Write handle of a [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySink {
    store: MemoryStore,
    bound: Vec<FieldId>,
    closed: bool,
}

impl ColumnSink for MemorySink {
    fn good(&self) -> bool {
        !self.closed
    }

    fn add(&mut self, decl: &str, field: FieldId, buffers: &BufferSet) -> Result<()> {
        if self.closed {
            return Err(StreamError::ClosedStream);
        }
        let mut inner = self.store.inner.borrow_mut();
        if inner.entries > 0 {
            return Err(StreamError::schema(0, format!("column {decl} added after the first commit")));
        }
        declare_column(&mut inner.columns, decl, buffers.buffer(field))?;
        inner.data.push(Vec::new());
        self.bound.push(field);
        Ok(())
    }

    fn commit(&mut self, buffers: &BufferSet) -> Result<()> {
        if self.closed {
            return Err(StreamError::ClosedStream);
        }
        let mut inner = self.store.inner.borrow_mut();
        for (slot, &field) in self.bound.iter().enumerate() {
            let values = buffers.buffer(field).values();
            inner.data[slot].push(values);
        }
        inner.entries += 1;
        Ok(())
    }

    fn entries(&self) -> u64 {
        self.store.entries()
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Read handle of a [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySource {
    store: MemoryStore,
    tree: String,
    columns: Vec<ColumnInfo>,
    selected: Vec<(usize, FieldId)>,
    closed: bool,
}

impl ColumnSource for MemorySource {
    fn good(&self) -> bool {
        !self.closed
    }

    fn tree_name(&self) -> &str {
        &self.tree
    }

    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn entries(&self) -> u64 {
        if self.closed { 0 } else { self.store.entries() }
    }

    fn select(&mut self, column: &str, field: FieldId) -> Result<()> {
        let index = self
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| StreamError::UnknownField(column.to_string()))?;
        self.selected.retain(|&(_, f)| f != field);
        self.selected.push((index, field));
        Ok(())
    }

    fn clear_selection(&mut self) {
        self.selected.clear();
    }

    fn read(&mut self, entry: u64, buffers: &mut BufferSet) -> Result<()> {
        if self.closed {
            return Err(StreamError::ClosedStream);
        }
        let inner = self.store.inner.borrow();
        if entry >= inner.entries {
            return Err(StreamError::EntryOutOfRange { entry, entries: inner.entries });
        }
        for &(column, field) in &self.selected {
            let stored = &inner.data[column][entry as usize];
            buffers.buffer_mut(field).load(stored)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.selected.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn write_then_read() {
        let schema = Schema::parse("Tree T\n\ndouble\tHT\tHT 1\nvector<int>\tv\tv 0\n").unwrap();
        let mut buffers = BufferSet::declare(&schema);
        let store = MemoryStore::new("T");

        let mut sink = store.sink();
        let ht = buffers.id("HT").unwrap();
        let v = buffers.id("v").unwrap();
        sink.add("HT", ht, &buffers).unwrap();
        sink.add("v", v, &buffers).unwrap();
        for i in 0..3 {
            buffers.set_scalar("HT", i as f64 * 10.0).unwrap();
            buffers.set_array("v", &vec![i; i as usize]).unwrap();
            sink.commit(&buffers).unwrap();
        }
        sink.close().unwrap();

        let mut source = store.source();
        assert_eq!(source.entries(), 3);
        source.select("HT", ht).unwrap();
        source.select("v", v).unwrap();
        buffers.init_defaults();
        source.read(2, &mut buffers).unwrap();
        assert_eq!(buffers.scalar::<f64>("HT").unwrap(), 20.0);
        assert_eq!(buffers.array::<i32>("v").unwrap(), &[2, 2]);

        assert!(matches!(
            source.read(3, &mut buffers),
            Err(StreamError::EntryOutOfRange { entry: 3, entries: 3 })
        ));
        assert!(matches!(source.select("nope", ht), Err(StreamError::UnknownField(_))));
    }

    #[test]
    fn columns_are_fixed_after_first_commit() {
        let schema = Schema::parse("Tree T\n\ndouble\tHT\tHT 1\ndouble\tMET\tMET 1\n").unwrap();
        let buffers = BufferSet::declare(&schema);
        let store = MemoryStore::new("T");
        let mut sink = store.sink();
        sink.add("HT", buffers.id("HT").unwrap(), &buffers).unwrap();
        sink.commit(&buffers).unwrap();
        assert!(sink.add("MET", buffers.id("MET").unwrap(), &buffers).is_err());
    }
}
