//! PCB: dependency-light binary point cloud blob.
//!
//! - Positions are stored in world space as f32 triples (the writer bakes any
//!   model transform before encoding).
//! - Intensity is fixed-point: `round(intensity * 1000)` as u32 (±0.0005).
//! - Color is one u8 per channel (1/255 precision).
//! - No version field, no alignment padding.
//!
//! File layout (little-endian):
//!   00  : [u8;4]  magic = b"PCB1"
//!   04  : u32     points_count
//!   08  : for each point (19 bytes):
//!           f32 x, f32 y, f32 z
//!           u32 intensity_milli
//!           u8 r, u8 g, u8 b

use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::path::Path;

pub const PCB_MAGIC: [u8; 4] = *b"PCB1";

/// Magic + point count.
pub const HEADER_SIZE: usize = 8;

/// 12 bytes position + 4 bytes intensity + 3 bytes color.
pub const RECORD_SIZE: usize = 19;

/// Fixed-point scale applied to intensity on disk.
pub const INTENSITY_SCALE: f32 = 1000.0;

/// One on-disk point record, still in its quantized form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcbRecord {
    pub position: [f32; 3],
    /// Intensity in thousandths.
    pub intensity: u32,
    pub color: [u8; 3],
}

/// A fully parsed blob.
#[derive(Debug, Clone, Default)]
pub struct PcbFile {
    pub records: Vec<PcbRecord>,
}

#[inline]
pub fn quantize_intensity(intensity: f32) -> u32 {
    // `as` saturates: negatives become 0, NaN becomes 0.
    (intensity * INTENSITY_SCALE).round() as u32
}

#[inline]
pub fn dequantize_intensity(milli: u32) -> f32 {
    milli as f32 / INTENSITY_SCALE
}

#[inline]
pub fn quantize_channel(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
pub fn dequantize_channel(v: u8) -> f32 {
    v as f32 / 255.0
}

#[inline(always)]
fn need(buf: &[u8], want: usize) -> io::Result<()> {
    if buf.len() < want {
        Err(io::Error::new(ErrorKind::UnexpectedEof, "truncated PCB"))
    } else {
        Ok(())
    }
}

#[inline(always)]
fn take<'a>(buf: &mut &'a [u8], n: usize) -> io::Result<&'a [u8]> {
    need(buf, n)?;
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

#[inline(always)]
fn le_u32(buf: &mut &[u8]) -> io::Result<u32> {
    let b = take(buf, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[cold]
fn bad(msg: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg)
}

/// Validate the magic and return the declared point count.
///
/// The magic is checked before anything else, so a corrupt header is always
/// reported as `InvalidData` even when the rest of the header is missing.
pub fn parse_header(mut p: &[u8]) -> io::Result<u32> {
    let magic = p.get(..4).unwrap_or(p);
    if magic.len() == 4 && magic != PCB_MAGIC {
        return Err(bad("bad PCB magic"));
    }
    take(&mut p, 4)?;
    le_u32(&mut p)
}

/// Read and validate the header from a stream, leaving it positioned at the
/// first record.
pub fn read_header<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut header = [0u8; HEADER_SIZE];
    r.read_exact(&mut header[..4])?;
    if header[..4] != PCB_MAGIC {
        return Err(bad("bad PCB magic"));
    }
    r.read_exact(&mut header[4..])?;
    parse_header(&header)
}

#[inline(always)]
fn decode_record(rec: &[u8]) -> PcbRecord {
    let position: [f32; 3] = bytemuck::pod_read_unaligned(&rec[0..12]);
    let position = if cfg!(target_endian = "little") {
        position
    } else {
        position.map(|v| f32::from_bits(u32::from_le(v.to_bits())))
    };

    PcbRecord {
        position,
        intensity: u32::from_le_bytes([rec[12], rec[13], rec[14], rec[15]]),
        color: [rec[16], rec[17], rec[18]],
    }
}

/// Iterate the whole records of a block. Trailing bytes that do not form a
/// complete record are ignored.
pub fn iter_records(raw: &[u8]) -> impl Iterator<Item = PcbRecord> + '_ {
    raw.chunks_exact(RECORD_SIZE).map(decode_record)
}

/// Decode a slice holding a whole number of records.
pub fn parse_records(raw: &[u8]) -> io::Result<Vec<PcbRecord>> {
    if raw.len() % RECORD_SIZE != 0 {
        return Err(bad("record block is not a multiple of 19 bytes"));
    }

    Ok(iter_records(raw).collect())
}

/// Parse a whole PCB blob from a contiguous byte slice.
pub fn parse_pcb_bytes(mut p: &[u8]) -> io::Result<PcbFile> {
    let count = parse_header(p)? as usize;
    p = &p[HEADER_SIZE..];

    let bytes = count
        .checked_mul(RECORD_SIZE)
        .ok_or_else(|| bad("points size overflow"))?;
    let raw = take(&mut p, bytes)?;

    Ok(PcbFile {
        records: parse_records(raw)?,
    })
}

/// Fast path: prefer mmap; fall back to a single read.
#[cfg(feature = "mmap")]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<PcbFile> {
    let file = File::open(path)?;
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    parse_pcb_bytes(&map)
}

#[cfg(not(feature = "mmap"))]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<PcbFile> {
    let bytes = std::fs::read(path)?;
    parse_pcb_bytes(&bytes)
}

/// Streaming writer: header first, then records one by one.
///
/// The count is declared up front; `finish` refuses to succeed if a different
/// number of records was written.
pub struct PcbWriter<W: Write> {
    inner: W,
    declared: u32,
    written: u32,
}

impl<W: Write> PcbWriter<W> {
    pub fn new(mut inner: W, count: u32) -> io::Result<Self> {
        inner.write_all(&PCB_MAGIC)?;
        write_u32(&mut inner, count)?;

        Ok(Self {
            inner,
            declared: count,
            written: 0,
        })
    }

    pub fn write_record(&mut self, record: &PcbRecord) -> io::Result<()> {
        let mut buf = [0u8; RECORD_SIZE];
        for (axis, v) in record.position.iter().enumerate() {
            buf[axis * 4..axis * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        buf[12..16].copy_from_slice(&record.intensity.to_le_bytes());
        buf[16..19].copy_from_slice(&record.color);

        self.inner.write_all(&buf)?;
        self.written += 1;

        Ok(())
    }

    pub fn finish(mut self) -> io::Result<W> {
        if self.written != self.declared {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "PCB header declares {} points but {} were written",
                    self.declared, self.written
                ),
            ));
        }

        self.inner.flush()?;
        Ok(self.inner)
    }
}

pub fn write_file<P: AsRef<Path>>(path: P, file: &PcbFile) -> io::Result<()> {
    let count = u32::try_from(file.records.len())
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "too many points for PCB"))?;

    let out = io::BufWriter::new(File::create(path)?);
    let mut writer = PcbWriter::new(out, count)?;

    for record in &file.records {
        writer.write_record(record)?;
    }

    writer.finish()?;

    Ok(())
}

#[inline]
fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
