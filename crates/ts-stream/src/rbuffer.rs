//! Big-endian cursor reader and growable writer for the on-disk format.

use crate::error::{Result, StreamError};

/// A cursor over a byte slice, reading big-endian values.
pub struct RBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RBuffer<'a> {
    /// Reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read position.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Total length of the underlying slice.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the underlying slice is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left after the cursor.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Move the cursor to an absolute position.
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Borrow `n` bytes and advance.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let b = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(b);
        Ok(out)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a `u16`.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Read a `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Read an `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Read a `u64`.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Read an `i64`.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    /// Read an `f32`.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.read_array()?))
    }

    /// Read an `f64`.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.read_array()?))
    }

    /// Read a ROOT-encoded string: one length byte (< 255), or 255 followed
    /// by a `u32` length, then the UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String> {
        let first = self.read_u8()?;
        let len = if first == 255 { self.read_u32()? as usize } else { first as usize };
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.pos + n > self.data.len() {
            return Err(StreamError::BufferUnderflow {
                offset: self.pos,
                need: n,
                have: self.data.len().saturating_sub(self.pos),
            });
        }
        Ok(())
    }
}

/// Append-only big-endian writer, the mirror of [`RBuffer`].
#[derive(Debug, Default, Clone)]
pub struct WBuffer {
    data: Vec<u8>,
}

impl WBuffer {
    /// Empty writer.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing was written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Take the written bytes, leaving the writer empty.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    /// Consume the writer.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    /// Write a `u16`.
    pub fn write_u16(&mut self, v: u16) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Write a `u32`.
    pub fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Write an `i32`.
    pub fn write_i32(&mut self, v: i32) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Write a `u64`.
    pub fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Write an `i64`.
    pub fn write_i64(&mut self, v: i64) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Write an `f32`.
    pub fn write_f32(&mut self, v: f32) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Write an `f64`.
    pub fn write_f64(&mut self, v: f64) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Write a string in the encoding [`RBuffer::read_string`] expects.
    pub fn write_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        if bytes.len() < 255 {
            self.write_u8(bytes.len() as u8);
        } else {
            self.write_u8(255);
            self.write_u32(bytes.len() as u32);
        }
        self.write_bytes(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_primitives() {
        // u32 0x01020304 then pi as f64
        let data = [0x01, 0x02, 0x03, 0x04, 0x40, 0x09, 0x21, 0xfb, 0x54, 0x44, 0x2d, 0x18];
        let mut r = RBuffer::new(&data);
        assert_eq!(r.read_u32().unwrap(), 0x0102_0304);
        assert!((r.read_f64().unwrap() - std::f64::consts::PI).abs() < 1e-15);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn underflow_reports_position() {
        let mut r = RBuffer::new(&[1, 2]);
        r.read_u8().unwrap();
        match r.read_u32() {
            Err(StreamError::BufferUnderflow { offset, need, have }) => {
                assert_eq!((offset, need, have), (1, 4, 1));
            }
            other => panic!("expected underflow, got {other:?}"),
        }
    }

    #[test]
    fn long_strings_use_escape_length() {
        let long = "x".repeat(300);
        let mut w = WBuffer::new();
        w.write_string("abc");
        w.write_string(&long);
        w.write_string("");
        let bytes = w.into_inner();
        assert_eq!(&bytes[..4], &[3, b'a', b'b', b'c']);
        assert_eq!(bytes[4], 255);

        let mut r = RBuffer::new(&bytes);
        assert_eq!(r.read_string().unwrap(), "abc");
        assert_eq!(r.read_string().unwrap(), long);
        assert_eq!(r.read_string().unwrap(), "");
    }
}
