//! `EventBuffer`: one stream's schema, buffers and read or write binding.
//!
//! ```text
//! Unopened --open_read--> ReadBound  --close--> Closed
//!          --open_write-> WriteBound --close--> Closed
//! ```
//! A stream is bound once, for reading or for writing. Skims read through
//! one `EventBuffer` and write its buffers with a standalone
//! [`RecordSink`].

use crate::buffer::BufferSet;
use crate::config::StreamConfig;
use crate::cursor::RecordCursor;
use crate::error::{Result, StreamError};
use crate::objects::{self, IndexMap, ObjectView};
use crate::schema::{GroupId, Schema};
use crate::sink::RecordSink;
use crate::store::{ColumnSink, ColumnSource};

/// Lifecycle state of an [`EventBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Buffers allocated, no store attached.
    Unopened,
    /// Reading from a source.
    ReadBound,
    /// Writing to a sink.
    WriteBound,
    /// Closed; only `close()` and accessors remain valid.
    Closed,
}

enum Binding {
    None,
    Read(RecordCursor),
    Write(RecordSink),
}

/// Typed record stream over a schema.
pub struct EventBuffer {
    schema: Schema,
    buffers: BufferSet,
    config: StreamConfig,
    state: StreamState,
    binding: Binding,
    selection: IndexMap,
}

impl EventBuffer {
    /// Allocate buffers for `schema`; no store attached yet.
    pub fn new(schema: Schema) -> Self {
        Self::with_config(schema, StreamConfig::default())
    }

    /// [`new`](Self::new) with explicit stream options.
    pub fn with_config(schema: Schema, config: StreamConfig) -> Self {
        let buffers = BufferSet::declare(&schema);
        Self {
            schema,
            buffers,
            config,
            state: StreamState::Unopened,
            binding: Binding::None,
            selection: IndexMap::new(),
        }
    }

    /// Open a stream reading `source`, activating the fields named by `varlist`.
    pub fn reader(schema: Schema, source: impl ColumnSource + 'static, varlist: &str) -> Result<Self> {
        let mut stream = Self::new(schema);
        stream.open_read(source, varlist)?;
        Ok(stream)
    }

    /// Open a stream writing every field to `sink`.
    pub fn writer(schema: Schema, sink: impl ColumnSink + 'static) -> Result<Self> {
        let mut stream = Self::new(schema);
        stream.open_write(sink)?;
        Ok(stream)
    }

    fn ensure_unopened(&self, wanted: StreamError) -> Result<()> {
        match self.state {
            StreamState::Unopened => Ok(()),
            StreamState::Closed => Err(StreamError::ClosedStream),
            _ => Err(wanted),
        }
    }

    /// Bind for reading.
    pub fn open_read(&mut self, source: impl ColumnSource + 'static, varlist: &str) -> Result<()> {
        self.open_read_boxed(Box::new(source), varlist)
    }

    /// [`open_read`](Self::open_read) for an already boxed source.
    pub fn open_read_boxed(&mut self, source: Box<dyn ColumnSource>, varlist: &str) -> Result<()> {
        self.ensure_unopened(StreamError::NotReadable)?;
        let cursor =
            RecordCursor::open_boxed(source, &self.schema, &mut self.buffers, varlist, &self.config)?;
        self.binding = Binding::Read(cursor);
        self.state = StreamState::ReadBound;
        Ok(())
    }

    /// Bind for writing.
    pub fn open_write(&mut self, sink: impl ColumnSink + 'static) -> Result<()> {
        self.open_write_boxed(Box::new(sink))
    }

    /// [`open_write`](Self::open_write) for an already boxed sink.
    pub fn open_write_boxed(&mut self, sink: Box<dyn ColumnSink>) -> Result<()> {
        self.ensure_unopened(StreamError::NotWritable)?;
        let sink = RecordSink::open_boxed(sink, &self.buffers)?;
        self.binding = Binding::Write(sink);
        self.state = StreamState::WriteBound;
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Schema the stream was built from.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Field buffers.
    pub fn buffers(&self) -> &BufferSet {
        &self.buffers
    }

    /// Mutable field buffers.
    pub fn buffers_mut(&mut self) -> &mut BufferSet {
        &mut self.buffers
    }

    /// Load entry `entry`. Clears this entry's object selections.
    pub fn read(&mut self, entry: u64) -> Result<()> {
        match (&mut self.binding, self.state) {
            (_, StreamState::Closed) => Err(StreamError::ClosedStream),
            (Binding::Read(cursor), _) => {
                self.selection.clear();
                cursor.read(entry, &mut self.buffers)
            }
            _ => Err(StreamError::NotReadable),
        }
    }

    /// Append the current buffer contents as one record.
    pub fn commit(&mut self) -> Result<()> {
        match (&mut self.binding, self.state) {
            (_, StreamState::Closed) => Err(StreamError::ClosedStream),
            (Binding::Write(sink), _) => sink.commit(&mut self.buffers),
            _ => Err(StreamError::NotWritable),
        }
    }

    /// Entries available for reading (0 unless bound for reading).
    pub fn size(&self) -> u64 {
        match &self.binding {
            Binding::Read(cursor) if self.state == StreamState::ReadBound => cursor.size(),
            _ => 0,
        }
    }

    /// Records written so far (0 unless bound for writing).
    pub fn entries_written(&self) -> u64 {
        match &self.binding {
            Binding::Write(sink) => sink.entries(),
            _ => 0,
        }
    }

    /// Source listing, empty unless bound for reading.
    pub fn ls(&self) -> String {
        match &self.binding {
            Binding::Read(cursor) if self.state == StreamState::ReadBound => cursor.ls(),
            _ => String::new(),
        }
    }

    /// Whether the field with this choose name was activated.
    pub fn is_active(&self, name: &str) -> bool {
        match &self.binding {
            Binding::Read(cursor) => cursor.is_active(name),
            _ => false,
        }
    }

    /// Release the binding. Safe to call in any state, any number of times.
    pub fn close(&mut self) -> Result<()> {
        if self.state == StreamState::Closed {
            return Ok(());
        }
        self.state = StreamState::Closed;
        match std::mem::replace(&mut self.binding, Binding::None) {
            Binding::Read(mut cursor) => {
                cursor.close();
                Ok(())
            }
            Binding::Write(mut sink) => sink.close(),
            Binding::None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == StreamState::Closed {
            return Err(StreamError::ClosedStream);
        }
        Ok(())
    }

    /// Objects of one group for the current entry.
    pub fn fill_group(&self, id: GroupId) -> Result<Vec<ObjectView>> {
        objects::fill_group(&self.schema, &self.buffers, id)
    }

    /// Objects of the group named `name`.
    pub fn objects(&self, name: &str) -> Result<Vec<ObjectView>> {
        let id = self.group_id(name)?;
        self.fill_group(id)
    }

    /// Objects of every group.
    pub fn fill_all(&self) -> Result<Vec<(GroupId, Vec<ObjectView>)>> {
        objects::fill_all(&self.schema, &self.buffers)
    }

    fn group_id(&self, name: &str) -> Result<GroupId> {
        self.schema
            .group(name)
            .map(|g| g.id)
            .ok_or_else(|| StreamError::UnknownField(name.to_string()))
    }

    /// Declare that objects of `name` will be selected; returns its handle.
    pub fn select(&mut self, name: &str) -> Result<GroupId> {
        self.ensure_open()?;
        let id = self.group_id(name)?;
        self.selection.declare(id);
        Ok(id)
    }

    /// Keep object `index` of group `id` in this entry.
    pub fn select_index(&mut self, id: GroupId, index: usize) -> Result<()> {
        self.ensure_open()?;
        self.selection.push(&self.schema, id, index)
    }

    /// Compact declared groups to the selected objects.
    pub fn save_objects(&mut self) -> Result<()> {
        self.ensure_open()?;
        objects::save_objects(&self.schema, &mut self.buffers, &self.selection)
    }
}

impl Drop for EventBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to close stream: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn schema() -> Schema {
        Schema::parse("Tree T\n\ndouble\tHT\tHT 1\n").unwrap()
    }

    #[test]
    fn lifecycle_errors() {
        let store = MemoryStore::new("T");
        let mut out = EventBuffer::writer(schema(), store.sink()).unwrap();
        assert_eq!(out.state(), StreamState::WriteBound);
        assert!(matches!(out.read(0), Err(StreamError::NotReadable)));
        out.commit().unwrap();
        assert!(matches!(out.open_read(store.source(), ""), Err(StreamError::NotReadable)));
        out.close().unwrap();
        out.close().unwrap();
        assert!(matches!(out.commit(), Err(StreamError::ClosedStream)));
        assert!(matches!(out.select("Jet"), Err(StreamError::ClosedStream)));

        let mut input = EventBuffer::reader(schema(), store.source(), "").unwrap();
        assert_eq!(input.size(), 1);
        assert!(matches!(input.commit(), Err(StreamError::NotWritable)));
        input.read(0).unwrap();
        input.close().unwrap();
        assert_eq!(input.size(), 0);
        assert!(matches!(input.read(0), Err(StreamError::ClosedStream)));
    }

    #[test]
    fn unopened_stream() {
        let mut stream = EventBuffer::new(schema());
        assert_eq!(stream.size(), 0);
        assert!(stream.ls().is_empty());
        assert!(matches!(stream.read(0), Err(StreamError::NotReadable)));
        assert!(matches!(stream.commit(), Err(StreamError::NotWritable)));
        stream.close().unwrap();
        assert_eq!(stream.state(), StreamState::Closed);
    }
}
