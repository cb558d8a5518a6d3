//! Write path: declare every field to a sink and append records.

use crate::buffer::BufferSet;
use crate::error::{Result, StreamError};
use crate::store::ColumnSink;

/// An open write binding between a [`BufferSet`] and a [`ColumnSink`].
pub struct RecordSink {
    sink: Box<dyn ColumnSink>,
    closed: bool,
}

impl RecordSink {
    /// Declare all fields of `buffers`: counters first, then the rest in
    /// schema order with counter arrays as `branch[counter]`. A branch is
    /// persisted once; later fields reusing it are not written.
    pub fn open(sink: impl ColumnSink + 'static, buffers: &BufferSet) -> Result<Self> {
        Self::open_boxed(Box::new(sink), buffers)
    }

    /// [`open`](Self::open) for an already boxed sink.
    pub fn open_boxed(mut sink: Box<dyn ColumnSink>, buffers: &BufferSet) -> Result<Self> {
        if !sink.good() {
            return Err(StreamError::ClosedStream);
        }
        let counters = buffers.iter().filter(|(_, b)| b.spec().is_counter);
        let others = buffers.iter().filter(|(_, b)| !b.spec().is_counter);
        let mut declared: Vec<&str> = Vec::new();
        for (id, buffer) in counters.chain(others) {
            let branch = buffer.spec().branch_name.as_str();
            if declared.contains(&branch) {
                log::warn!("{} reuses branch {branch}; not written", buffer.name());
                continue;
            }
            sink.add(&buffer.spec().column_decl(), id, buffers)?;
            declared.push(branch);
        }
        log::debug!("declared {} columns", declared.len());
        Ok(Self { sink, closed: false })
    }

    /// Derive counters from array lengths, then append one record.
    pub fn commit(&mut self, buffers: &mut BufferSet) -> Result<()> {
        if self.closed {
            return Err(StreamError::ClosedStream);
        }
        buffers.sync_counters()?;
        self.sink.commit(buffers)
    }

    /// Records written.
    pub fn entries(&self) -> u64 {
        self.sink.entries()
    }

    /// Flush and release the sink. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.sink.close()
    }
}

impl Drop for RecordSink {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::warn!("failed to close record sink: {e}");
            }
        }
    }
}
