//! On-disk column store.
//!
//! ```text
//! header (16 bytes): "tstr" | version u32 | directory seek u64
//! baskets ...        see [`basket`](super::basket)
//! directory:         tree string | entries u64 | n_columns u32 | columns ...
//! column:            name string | elem u8 | shape u8 [| N u32 | counter string]
//!                    | max_count u32 | is_counter u8 | n_baskets u32
//!                    | (seek u64, first_entry u64, n_entries u32) ...
//! ```
//! All integers are big-endian.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::buffer::{BufferSet, FieldId};
use crate::config::StoreConfig;
use crate::datasource::DataSource;
use crate::error::{Result, StreamError};
use crate::rbuffer::{RBuffer, WBuffer};
use crate::schema::ElemType;

use super::basket::{Basket, BasketWriter};
use super::{ColumnInfo, ColumnShape, ColumnSink, ColumnSource, declare_column};

const MAGIC: &[u8; 4] = b"tstr";
const VERSION: u32 = 1;
const HEADER_LEN: u64 = 16;

/// Location of one basket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BasketRef {
    seek: u64,
    first_entry: u64,
    n_entries: u32,
}

fn shape_code(shape: &ColumnShape) -> u8 {
    match shape {
        ColumnShape::Scalar => 0,
        ColumnShape::Vector => 1,
        ColumnShape::Fixed(_) => 2,
        ColumnShape::Counted(_) => 3,
    }
}

fn write_directory(
    w: &mut WBuffer,
    tree: &str,
    entries: u64,
    columns: &[ColumnInfo],
    baskets: &[Vec<BasketRef>],
) {
    w.write_string(tree);
    w.write_u64(entries);
    w.write_u32(columns.len() as u32);
    for (column, refs) in columns.iter().zip(baskets) {
        w.write_string(&column.name);
        w.write_u8(column.elem.code());
        w.write_u8(shape_code(&column.shape));
        match &column.shape {
            ColumnShape::Fixed(n) => w.write_u32(*n as u32),
            ColumnShape::Counted(counter) => w.write_string(counter),
            ColumnShape::Scalar | ColumnShape::Vector => {}
        }
        w.write_u32(column.max_count as u32);
        w.write_u8(column.is_counter as u8);
        w.write_u32(refs.len() as u32);
        for b in refs {
            w.write_u64(b.seek);
            w.write_u64(b.first_entry);
            w.write_u32(b.n_entries);
        }
    }
}

type Directory = (String, u64, Vec<ColumnInfo>, Vec<Vec<BasketRef>>);

fn read_directory(r: &mut RBuffer<'_>) -> Result<Directory> {
    let tree = r.read_string()?;
    let entries = r.read_u64()?;
    let n_columns = r.read_u32()? as usize;
    let mut columns = Vec::with_capacity(n_columns.min(4096));
    let mut baskets = Vec::with_capacity(n_columns.min(4096));
    for _ in 0..n_columns {
        let name = r.read_string()?;
        let elem = ElemType::from_code(r.read_u8()?)?;
        let shape = match r.read_u8()? {
            0 => ColumnShape::Scalar,
            1 => ColumnShape::Vector,
            2 => ColumnShape::Fixed(r.read_u32()? as usize),
            3 => ColumnShape::Counted(r.read_string()?),
            other => {
                return Err(StreamError::Deserialization(format!(
                    "column {name}: unknown shape code {other}"
                )));
            }
        };
        let max_count = r.read_u32()? as usize;
        let is_counter = r.read_u8()? != 0;
        let n_baskets = r.read_u32()? as usize;
        let mut refs = Vec::with_capacity(n_baskets.min(4096));
        for _ in 0..n_baskets {
            refs.push(BasketRef {
                seek: r.read_u64()?,
                first_entry: r.read_u64()?,
                n_entries: r.read_u32()?,
            });
        }
        columns.push(ColumnInfo { name, elem, shape, max_count, is_counter });
        baskets.push(refs);
    }
    Ok((tree, entries, columns, baskets))
}

/// Writes a stream to a file, one basket stream per column.
pub struct FileSink {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    pos: u64,
    tree: String,
    config: StoreConfig,
    columns: Vec<ColumnInfo>,
    bound: Vec<FieldId>,
    writers: Vec<BasketWriter>,
    baskets: Vec<Vec<BasketRef>>,
    entries: u64,
}

impl FileSink {
    /// Create (or truncate) `path` for tree `tree`.
    pub fn create(path: impl AsRef<Path>, tree: &str, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut out = BufWriter::new(File::create(&path)?);
        out.write_all(MAGIC)?;
        out.write_all(&VERSION.to_be_bytes())?;
        out.write_all(&0u64.to_be_bytes())?;
        log::debug!("created {} for tree {tree}", path.display());
        Ok(Self {
            path,
            out: Some(out),
            pos: HEADER_LEN,
            tree: tree.to_string(),
            config: config.clone(),
            columns: Vec::new(),
            bound: Vec::new(),
            writers: Vec::new(),
            baskets: Vec::new(),
            entries: 0,
        })
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush_basket(&mut self, slot: usize) -> Result<()> {
        if self.writers[slot].n_entries() == 0 {
            return Ok(());
        }
        let out = self.out.as_mut().ok_or(StreamError::ClosedStream)?;
        let (key, bytes) = self.writers[slot].flush(&self.config, self.entries)?;
        out.write_all(&bytes)?;
        self.baskets[slot].push(BasketRef {
            seek: self.pos,
            first_entry: key.first_entry,
            n_entries: key.n_entries,
        });
        log::debug!(
            "{}: basket of {} entries at {} ({} -> {} bytes)",
            self.columns[slot].name,
            key.n_entries,
            self.pos,
            key.obj_len,
            key.n_bytes
        );
        self.pos += bytes.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        for slot in 0..self.writers.len() {
            self.flush_basket(slot)?;
        }
        let Some(mut out) = self.out.take() else { return Ok(()) };
        let mut dir = WBuffer::new();
        write_directory(&mut dir, &self.tree, self.entries, &self.columns, &self.baskets);
        out.write_all(dir.as_slice())?;
        out.seek(SeekFrom::Start(8))?;
        out.write_all(&self.pos.to_be_bytes())?;
        out.flush()?;
        log::debug!(
            "closed {}: {} entries, {} columns",
            self.path.display(),
            self.entries,
            self.columns.len()
        );
        Ok(())
    }
}

impl ColumnSink for FileSink {
    fn good(&self) -> bool {
        self.out.is_some()
    }

    fn add(&mut self, decl: &str, field: FieldId, buffers: &BufferSet) -> Result<()> {
        if self.out.is_none() {
            return Err(StreamError::ClosedStream);
        }
        if self.entries > 0 {
            return Err(StreamError::schema(0, format!("column {decl} added after the first commit")));
        }
        let slot = declare_column(&mut self.columns, decl, buffers.buffer(field))?;
        let is_array = self.columns[slot].is_array();
        self.writers.push(BasketWriter::new(slot as u32, is_array, 0));
        self.baskets.push(Vec::new());
        self.bound.push(field);
        Ok(())
    }

    fn commit(&mut self, buffers: &BufferSet) -> Result<()> {
        if self.out.is_none() {
            return Err(StreamError::ClosedStream);
        }
        for slot in 0..self.bound.len() {
            let values = buffers.buffer(self.bound[slot]).values();
            self.writers[slot].push(&values)?;
        }
        self.entries += 1;
        for slot in 0..self.writers.len() {
            if self.writers[slot].payload_len() >= self.config.basket_size {
                self.flush_basket(slot)?;
            }
        }
        Ok(())
    }

    fn entries(&self) -> u64 {
        self.entries
    }

    fn close(&mut self) -> Result<()> {
        self.finish()
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if self.out.is_some() {
            if let Err(e) = self.finish() {
                log::warn!("failed to finalize {}: {e}", self.path.display());
            }
        }
    }
}

/// Reads a file written by [`FileSink`].
pub struct FileSource {
    path: Option<PathBuf>,
    data: Option<DataSource>,
    tree: String,
    entries: u64,
    columns: Vec<ColumnInfo>,
    baskets: Vec<Vec<BasketRef>>,
    selected: Vec<(usize, FieldId)>,
    /// Last decompressed basket per column.
    cache: Vec<Option<Basket>>,
}

impl FileSource {
    /// Memory-map and open `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = DataSource::map(path)?;
        let mut source = Self::from_data(data)?;
        log::debug!("opened {}: {} entries", path.display(), source.entries);
        source.path = Some(path.to_path_buf());
        Ok(source)
    }

    /// Open from bytes already in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_data(DataSource::Owned(bytes))
    }

    fn from_data(data: DataSource) -> Result<Self> {
        let mut r = RBuffer::new(&data);
        if r.len() < HEADER_LEN as usize || r.read_bytes(4)? != MAGIC {
            return Err(StreamError::BadMagic);
        }
        let version = r.read_u32()?;
        if version != VERSION {
            return Err(StreamError::Deserialization(format!("unsupported format version {version}")));
        }
        let dir_seek = r.read_u64()?;
        if dir_seek < HEADER_LEN || dir_seek as usize >= r.len() {
            return Err(StreamError::Deserialization(format!(
                "directory seek {dir_seek} outside file of {} bytes (file not closed?)",
                r.len()
            )));
        }
        r.set_pos(dir_seek as usize);
        let (tree, entries, columns, baskets) = read_directory(&mut r)?;
        let cache = vec![None; columns.len()];
        Ok(Self {
            path: None,
            data: Some(data),
            tree,
            entries,
            columns,
            baskets,
            selected: Vec::new(),
            cache,
        })
    }

    /// Path this source was opened from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn basket_for(&mut self, column: usize, entry: u64) -> Result<&Basket> {
        let cached = self.cache[column].as_ref().is_some_and(|b| b.contains(entry));
        if !cached {
            let refs = &self.baskets[column];
            let idx = refs.partition_point(|b| b.first_entry <= entry);
            let found = idx
                .checked_sub(1)
                .map(|i| refs[i])
                .filter(|b| entry < b.first_entry + b.n_entries as u64)
                .ok_or_else(|| {
                    StreamError::Deserialization(format!(
                        "no basket holds entry {entry} of column {}",
                        self.columns[column].name
                    ))
                })?;
            let data = self.data.as_ref().ok_or(StreamError::ClosedStream)?;
            self.cache[column] = Some(Basket::read(data, found.seek)?);
        }
        self.cache[column].as_ref().ok_or(StreamError::ClosedStream)
    }
}

impl ColumnSource for FileSource {
    fn good(&self) -> bool {
        self.data.is_some()
    }

    fn tree_name(&self) -> &str {
        &self.tree
    }

    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn entries(&self) -> u64 {
        if self.data.is_some() { self.entries } else { 0 }
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
        if self.data.is_none() {
            return Err(StreamError::ClosedStream);
        }
        if entry >= self.entries {
            return Err(StreamError::EntryOutOfRange { entry, entries: self.entries });
        }
        for i in 0..self.selected.len() {
            let (column, field) = self.selected[i];
            let elem = self.columns[column].elem;
            let is_array = self.columns[column].is_array();
            let values = self.basket_for(column, entry)?.entry(entry, elem, is_array)?;
            buffers.buffer_mut(field).load(&values)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.data.take().is_some() {
            log::debug!("closed source for tree {}", self.tree);
        }
        self.selected.clear();
        self.cache.iter_mut().for_each(|c| *c = None);
    }
}
