//! Baskets: the compressed unit of storage for one column.
//!
//! ```text
//! key (26 bytes): n_bytes u32 | obj_len u32 | key_len u16 | column u32 |
//!                 first_entry u64 | n_entries u32
//! payload:        entry values ... | entry offsets (u32 per entry)
//! ```
//! The payload is compressed unless compression would not shrink it, in
//! which case `obj_len == n_bytes - key_len`.

use crate::buffer::Column;
use crate::compress::{compress, decompress};
use crate::config::StoreConfig;
use crate::error::{Result, StreamError};
use crate::rbuffer::{RBuffer, WBuffer};
use crate::schema::ElemType;

/// Size of the basket key header.
pub const KEY_LEN: u16 = 26;

/// Basket key header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasketKey {
    /// Key plus stored payload.
    pub n_bytes: u32,
    /// Uncompressed payload size.
    pub obj_len: u32,
    /// Header size.
    pub key_len: u16,
    /// Column index in the directory.
    pub column: u32,
    /// First entry held.
    pub first_entry: u64,
    /// Number of entries held.
    pub n_entries: u32,
}

impl BasketKey {
    /// Parse a key at the reader's position.
    pub fn read(r: &mut RBuffer<'_>) -> Result<Self> {
        Ok(Self {
            n_bytes: r.read_u32()?,
            obj_len: r.read_u32()?,
            key_len: r.read_u16()?,
            column: r.read_u32()?,
            first_entry: r.read_u64()?,
            n_entries: r.read_u32()?,
        })
    }

    fn write(&self, w: &mut WBuffer) {
        w.write_u32(self.n_bytes);
        w.write_u32(self.obj_len);
        w.write_u16(self.key_len);
        w.write_u32(self.column);
        w.write_u64(self.first_entry);
        w.write_u32(self.n_entries);
    }
}

fn encode_values(w: &mut WBuffer, values: &Column) {
    match values {
        Column::Bool(v) => v.iter().for_each(|&x| w.write_u8(x as u8)),
        Column::Int(v) => v.iter().for_each(|&x| w.write_i32(x)),
        Column::UInt(v) => v.iter().for_each(|&x| w.write_u32(x)),
        Column::Long(v) => v.iter().for_each(|&x| w.write_i64(x)),
        Column::Float(v) => v.iter().for_each(|&x| w.write_f32(x)),
        Column::Double(v) => v.iter().for_each(|&x| w.write_f64(x)),
        Column::Str(v) => v.iter().for_each(|x| w.write_string(x)),
    }
}

fn decode_values(r: &mut RBuffer<'_>, elem: ElemType, n: usize) -> Result<Column> {
    if let Some(size) = elem.byte_size() {
        if n.saturating_mul(size) > r.remaining() {
            return Err(StreamError::BufferUnderflow {
                offset: r.pos(),
                need: n.saturating_mul(size),
                have: r.remaining(),
            });
        }
    }
    Ok(match elem {
        ElemType::Bool => Column::Bool((0..n).map(|_| r.read_u8().map(|b| b != 0)).collect::<Result<_>>()?),
        ElemType::Int => Column::Int((0..n).map(|_| r.read_i32()).collect::<Result<_>>()?),
        ElemType::UInt => Column::UInt((0..n).map(|_| r.read_u32()).collect::<Result<_>>()?),
        ElemType::Long => Column::Long((0..n).map(|_| r.read_i64()).collect::<Result<_>>()?),
        ElemType::Float => Column::Float((0..n).map(|_| r.read_f32()).collect::<Result<_>>()?),
        ElemType::Double => Column::Double((0..n).map(|_| r.read_f64()).collect::<Result<_>>()?),
        ElemType::Str => Column::Str((0..n).map(|_| r.read_string()).collect::<Result<_>>()?),
    })
}

/// Accumulates entries of one column until the basket is flushed.
#[derive(Debug)]
pub struct BasketWriter {
    column: u32,
    is_array: bool,
    first_entry: u64,
    payload: WBuffer,
    offsets: Vec<u32>,
}

impl BasketWriter {
    /// Empty basket for `column` starting at `first_entry`.
    pub fn new(column: u32, is_array: bool, first_entry: u64) -> Self {
        Self { column, is_array, first_entry, payload: WBuffer::new(), offsets: Vec::new() }
    }

    /// Append one entry. Arrays are prefixed with their length.
    pub fn push(&mut self, values: &Column) -> Result<()> {
        let offset = u32::try_from(self.payload.len())
            .map_err(|_| StreamError::Deserialization("basket payload exceeds 4 GiB".into()))?;
        self.offsets.push(offset);
        if self.is_array {
            let n = u32::try_from(values.len())
                .map_err(|_| StreamError::Deserialization("array length exceeds u32".into()))?;
            self.payload.write_u32(n);
        }
        encode_values(&mut self.payload, values);
        Ok(())
    }

    /// Entries buffered.
    pub fn n_entries(&self) -> u32 {
        self.offsets.len() as u32
    }

    /// Uncompressed payload bytes buffered.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Serialize key and payload, then reset for entries starting at
    /// `next_entry`. Returns the key written.
    pub fn flush(&mut self, config: &StoreConfig, next_entry: u64) -> Result<(BasketKey, Vec<u8>)> {
        let mut payload = self.payload.take();
        for &offset in &self.offsets {
            payload.extend_from_slice(&offset.to_be_bytes());
        }
        let obj_len = u32::try_from(payload.len())
            .map_err(|_| StreamError::Deserialization("basket payload exceeds 4 GiB".into()))?;
        let stored = compress(&payload, config.compression, config.compression_level)?
            .unwrap_or(payload);

        let key = BasketKey {
            n_bytes: KEY_LEN as u32 + stored.len() as u32,
            obj_len,
            key_len: KEY_LEN,
            column: self.column,
            first_entry: self.first_entry,
            n_entries: self.n_entries(),
        };
        let mut out = WBuffer::new();
        key.write(&mut out);
        out.write_bytes(&stored);

        self.offsets.clear();
        self.first_entry = next_entry;
        Ok((key, out.into_inner()))
    }
}

/// A decompressed basket.
#[derive(Debug, Clone)]
pub struct Basket {
    /// Header it was read with.
    pub key: BasketKey,
    payload: Vec<u8>,
    offsets: Vec<u32>,
}

impl Basket {
    /// Read and decompress the basket at `seek`.
    pub fn read(file: &[u8], seek: u64) -> Result<Self> {
        let pos = seek as usize;
        if pos >= file.len() {
            return Err(StreamError::BufferUnderflow { offset: pos, need: 1, have: 0 });
        }
        let mut r = RBuffer::new(file);
        r.set_pos(pos);
        let key = BasketKey::read(&mut r)?;

        let key_end = pos + key.n_bytes as usize;
        if key_end > file.len() || key.key_len as u32 > key.n_bytes {
            return Err(StreamError::BufferUnderflow {
                offset: pos,
                need: key.n_bytes as usize,
                have: file.len() - pos,
            });
        }
        let stored = &file[pos + key.key_len as usize..key_end];
        let payload = if key.obj_len as usize != stored.len() {
            decompress(stored, key.obj_len as usize)?
        } else {
            stored.to_vec()
        };

        let n = key.n_entries as usize;
        let table = n.checked_mul(4).filter(|&t| t <= payload.len()).ok_or_else(|| {
            StreamError::Deserialization(format!(
                "basket of {} bytes cannot hold {n} entry offsets",
                payload.len()
            ))
        })?;
        let data_len = payload.len() - table;
        let mut tr = RBuffer::new(&payload[data_len..]);
        let offsets = (0..n).map(|_| tr.read_u32()).collect::<Result<Vec<_>>>()?;
        if offsets.iter().any(|&o| o as usize > data_len) {
            return Err(StreamError::Deserialization("entry offset past basket data".into()));
        }
        let mut payload = payload;
        payload.truncate(data_len);
        Ok(Self { key, payload, offsets })
    }

    /// Whether `entry` falls in this basket.
    pub fn contains(&self, entry: u64) -> bool {
        entry >= self.key.first_entry && entry < self.key.first_entry + self.key.n_entries as u64
    }

    /// Decode one entry.
    pub fn entry(&self, entry: u64, elem: ElemType, is_array: bool) -> Result<Column> {
        if !self.contains(entry) {
            return Err(StreamError::EntryOutOfRange {
                entry,
                entries: self.key.first_entry + self.key.n_entries as u64,
            });
        }
        let offset = self.offsets[(entry - self.key.first_entry) as usize] as usize;
        let mut r = RBuffer::new(&self.payload);
        r.set_pos(offset);
        let n = if is_array { r.read_u32()? as usize } else { 1 };
        decode_values(&mut r, elem, n)
    }
}
