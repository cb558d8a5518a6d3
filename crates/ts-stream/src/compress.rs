//! Basket payload compression in ROOT-style blocks (ZL = zlib, L4 = LZ4).
//!
//! A compressed payload is one or more blocks, each with a 9-byte header:
//! ```text
//! bytes 0-1:  algorithm tag ("ZL", "L4")
//! byte  2:    method
//! bytes 3-5:  compressed size   (3-byte little-endian)
//! bytes 6-8:  uncompressed size (3-byte little-endian)
//! ```
//! L4 blocks start with an 8-byte big-endian xxhash64 of the LZ4 data.

use std::hash::Hasher;
use std::io::{Read, Write};

use crate::config::Compression;
use crate::error::{Result, StreamError};

const HEADER_LEN: usize = 9;
const CHECKSUM_LEN: usize = 8;
/// Largest chunk a 3-byte size field can describe.
const MAX_BLOCK: usize = 0xFF_FFFF;
/// Upper bound on the up-front reservation per compressed byte.
const MAX_RATIO: usize = 64;

/// Compress `src` into blocks. Returns `None` when the codec is `None` or the
/// blocks would not be smaller than `src`; the caller then stores it raw.
pub fn compress(src: &[u8], codec: Compression, level: u32) -> Result<Option<Vec<u8>>> {
    if codec == Compression::None || src.is_empty() {
        return Ok(None);
    }
    let mut out = Vec::with_capacity(src.len() / 2 + HEADER_LEN);
    for chunk in src.chunks(MAX_BLOCK) {
        let (tag, method, body) = match codec {
            Compression::Zlib => (b"ZL", 0x08, compress_zlib(chunk, level)?),
            Compression::Lz4 => (b"L4", 0x01, compress_lz4(chunk)),
            Compression::None => return Ok(None),
        };
        if body.len() > MAX_BLOCK {
            return Ok(None);
        }
        out.extend_from_slice(tag);
        out.push(method);
        write_le24(&mut out, body.len());
        write_le24(&mut out, chunk.len());
        out.extend_from_slice(&body);
        if out.len() >= src.len() {
            return Ok(None);
        }
    }
    Ok(Some(out))
}

/// Decompress blocks into exactly `expected_len` bytes.
pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    // Block sizes cap the real output; a corrupt length must not reserve more.
    let mut out = Vec::with_capacity(expected_len.min(src.len().saturating_mul(MAX_RATIO)));
    let mut offset = 0;

    while out.len() < expected_len && offset + HEADER_LEN <= src.len() {
        let tag = &src[offset..offset + 2];
        // byte 2 is method, skip
        let c_size = read_le24(&src[offset + 3..offset + 6]);
        let u_size = read_le24(&src[offset + 6..offset + 9]);
        offset += HEADER_LEN;

        let end = offset + c_size;
        if end > src.len() {
            return Err(StreamError::Decompression(format!(
                "compressed block claims {} bytes but only {} remain",
                c_size,
                src.len() - offset
            )));
        }
        let block = &src[offset..end];

        let decompressed = match tag {
            b"ZL" => decompress_zlib(block, u_size)?,
            b"L4" => decompress_lz4(block, u_size)?,
            _ => {
                return Err(StreamError::Decompression(format!(
                    "unsupported compression algorithm: {:?}",
                    String::from_utf8_lossy(tag)
                )));
            }
        };
        if decompressed.len() != u_size {
            return Err(StreamError::Decompression(format!(
                "expected {} uncompressed bytes, got {}",
                u_size,
                decompressed.len()
            )));
        }
        out.extend_from_slice(&decompressed);
        offset = end;
    }

    if out.len() != expected_len {
        return Err(StreamError::Decompression(format!(
            "total decompressed length {} != expected {}",
            out.len(),
            expected_len
        )));
    }
    Ok(out)
}

fn compress_zlib(data: &[u8], level: u32) -> Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(level.min(9)));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn decompress_zlib(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;

    let mut decoder = ZlibDecoder::new(data).take(expected as u64);
    let mut out = Vec::with_capacity(expected);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| StreamError::Decompression(format!("zlib: {}", e)))?;
    Ok(out)
}

fn checksum(data: &[u8]) -> u64 {
    let mut hasher = twox_hash::XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}

fn compress_lz4(data: &[u8]) -> Vec<u8> {
    let packed = lz4_flex::compress(data);
    let mut out = Vec::with_capacity(CHECKSUM_LEN + packed.len());
    out.extend_from_slice(&checksum(&packed).to_be_bytes());
    out.extend_from_slice(&packed);
    out
}

fn decompress_lz4(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    if data.len() < CHECKSUM_LEN {
        return Err(StreamError::Decompression("LZ4 block too small for checksum header".into()));
    }
    let (sum, packed) = data.split_at(CHECKSUM_LEN);
    let mut stored = [0u8; CHECKSUM_LEN];
    stored.copy_from_slice(sum);
    if u64::from_be_bytes(stored) != checksum(packed) {
        return Err(StreamError::Decompression("lz4: checksum mismatch".into()));
    }
    lz4_flex::decompress(packed, expected)
        .map_err(|e| StreamError::Decompression(format!("lz4: {}", e)))
}

/// Read a 3-byte little-endian unsigned integer.
fn read_le24(b: &[u8]) -> usize {
    b[0] as usize | ((b[1] as usize) << 8) | ((b[2] as usize) << 16)
}

fn write_le24(out: &mut Vec<u8>, v: usize) {
    out.push((v & 0xFF) as u8);
    out.push(((v >> 8) & 0xFF) as u8);
    out.push(((v >> 16) & 0xFF) as u8);
}
