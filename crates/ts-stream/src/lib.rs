//! # ts-stream
//!
//! Schema-driven typed record streams over columnar ntuple stores.
//!
//! A `variables.txt` schema lists the fields of a flat or ragged ntuple.
//! From it the library allocates typed buffers, binds them to a column store
//! for reading or writing, zips `prefix_`-sharing arrays into objects, and
//! compacts those objects to a per-entry selection before writing.
//!
//! ## Example
//!
//! ```no_run
//! use ts_stream::{EventBuffer, FileSink, FileSource, RecordSink, Schema, StoreConfig};
//!
//! let schema = Schema::parse(&std::fs::read_to_string("variables.txt").unwrap()).unwrap();
//! let source = FileSource::open("events.tstr").unwrap();
//! let mut input = EventBuffer::reader(schema, source, "Jet. HT").unwrap();
//!
//! let sink = FileSink::create("skim.tstr", "Events", &StoreConfig::default()).unwrap();
//! let mut skim = RecordSink::open(sink, input.buffers()).unwrap();
//!
//! let jet = input.select("Jet").unwrap();
//! for entry in 0..input.size() {
//!     input.read(entry).unwrap();
//!     for obj in input.objects("Jet").unwrap() {
//!         if obj.get_f64("PT").unwrap_or(0.0) > 30.0 {
//!             input.select_index(jet, obj.index()).unwrap();
//!         }
//!     }
//!     input.save_objects().unwrap();
//!     skim.commit(input.buffers_mut()).unwrap();
//! }
//! skim.close().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod compress;
pub mod config;
pub mod cursor;
pub mod datasource;
pub mod error;
pub mod event;
pub mod objects;
pub mod rbuffer;
pub mod schema;
pub mod sink;
pub mod store;

pub use buffer::{BufferSet, Column, Element, FieldBuffer, FieldId, Value};
pub use config::{Compression, Config, SchemaConfig, StoreConfig, StreamConfig};
pub use cursor::RecordCursor;
pub use error::{Result, StreamError};
pub use event::{EventBuffer, StreamState};
pub use objects::{IndexMap, ObjectView};
pub use schema::{
    ElemType, FieldKind, FieldSpec, FieldType, GroupId, Schema, SkippedField, StructGroup,
    VariablesFile,
};
pub use sink::RecordSink;
pub use store::{
    ChainSource, ColumnInfo, ColumnShape, ColumnSink, ColumnSource, FileSink, FileSource,
    MemoryStore,
};
