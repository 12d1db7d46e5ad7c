//! Plain-text point ingestion: `x y z intensity r g b` per line.

use crate::config::{BoundaryLines, LoaderConfig};
use crate::data::{Point, PointCloud};
use crate::error::{PointCloudError, Result};
use crate::workers::run_batched;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Intensity assigned to every text-loaded point. The file's own value is
/// scanned (the line must still carry it) and then discarded.
pub const TEXT_INTENSITY: f32 = 1.0;

/// Parse one line. Needs at least seven whitespace-separated fields; any
/// trailing fields are ignored.
pub fn parse_line(line: &str) -> Option<Point> {
    let mut fields = line.split_whitespace();

    let x: f32 = fields.next()?.parse().ok()?;
    let y: f32 = fields.next()?.parse().ok()?;
    let z: f32 = fields.next()?.parse().ok()?;
    let _intensity: f32 = fields.next()?.parse().ok()?;
    let r: i32 = fields.next()?.parse().ok()?;
    let g: i32 = fields.next()?.parse().ok()?;
    let b: i32 = fields.next()?.parse().ok()?;

    if !(x.is_finite() && y.is_finite() && z.is_finite()) {
        return None;
    }

    Some(Point {
        position: [x, y, z],
        intensity: TEXT_INTENSITY,
        color: [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0],
    })
}

/// Parse a block of complete lines, keeping every `downsample`-th line
/// (counted from the start of the block, empty lines included).
pub fn parse_block(block: &[u8], downsample: usize) -> Vec<Point> {
    parse_lines(block, downsample, false, false)
}

/// One worker job: the bytes of a single read buffer.
#[derive(Debug)]
pub struct TextBlock {
    pub bytes: Vec<u8>,
    /// The previous buffer ended inside a line; the first line here is its tail.
    pub starts_mid_line: bool,
    /// The buffer stops inside a line that continues in the next one.
    pub ends_mid_line: bool,
}

impl TextBlock {
    fn whole(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            starts_mid_line: false,
            ends_mid_line: false,
        }
    }

    /// Parse the block. Fragments of a line cut by a buffer boundary are
    /// skipped but still count towards the downsampling stride.
    pub fn parse(&self, downsample: usize) -> Vec<Point> {
        parse_lines(
            &self.bytes,
            downsample,
            self.starts_mid_line,
            self.ends_mid_line,
        )
    }
}

fn parse_lines(bytes: &[u8], downsample: usize, skip_first: bool, skip_last: bool) -> Vec<Point> {
    let downsample = downsample.max(1);
    let last = bytes.iter().filter(|&&b| b == b'\n').count();
    let text = String::from_utf8_lossy(bytes);

    text.split('\n')
        .enumerate()
        .filter(|(index, line)| {
            index % downsample == 0
                && !line.is_empty()
                && !(skip_first && *index == 0)
                && !(skip_last && *index == last)
        })
        .filter_map(|(_, line)| parse_line(line))
        .collect()
}

/// Hands out fixed-size buffers as they come off the disk.
struct FixedBlocks<R> {
    reader: R,
    buffer_size: usize,
    at_line_start: bool,
    bytes_read: usize,
}

impl<R: BufRead> FixedBlocks<R> {
    fn new(reader: R, buffer_size: usize) -> Self {
        Self {
            reader,
            buffer_size,
            at_line_start: true,
            bytes_read: 0,
        }
    }

    fn next_block(&mut self) -> io::Result<Option<TextBlock>> {
        let mut bytes = vec![0; self.buffer_size];
        let n = read_full(&mut self.reader, &mut bytes)?;
        if n == 0 {
            return Ok(None);
        }
        bytes.truncate(n);
        self.bytes_read += n;

        let ends_on_newline = bytes.last() == Some(&b'\n');
        // A last line without a newline that exactly fills the buffer is whole.
        let at_eof = self.reader.fill_buf()?.is_empty();

        let block = TextBlock {
            bytes,
            starts_mid_line: !self.at_line_start,
            ends_mid_line: !ends_on_newline && !at_eof,
        };
        self.at_line_start = ends_on_newline;

        Ok(Some(block))
    }
}

/// Splits a byte stream into blocks of whole lines.
///
/// Each read fills up to `buffer_size` bytes; the block handed out ends at
/// the last newline and the unterminated remainder is carried into the next
/// block. At end of file the remainder is handed out as a final block.
struct LineBlocks<R> {
    reader: R,
    buffer_size: usize,
    carry: Vec<u8>,
    eof: bool,
    bytes_read: usize,
}

impl<R: Read> LineBlocks<R> {
    fn new(reader: R, buffer_size: usize) -> Self {
        Self {
            reader,
            buffer_size,
            carry: Vec::new(),
            eof: false,
            bytes_read: 0,
        }
    }

    fn next_block(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if self.eof {
                if self.carry.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.carry)));
            }

            let mut block = std::mem::take(&mut self.carry);
            let start = block.len();
            block.resize(start + self.buffer_size, 0);

            let n = read_full(&mut self.reader, &mut block[start..])?;
            block.truncate(start + n);
            self.bytes_read += n;

            if n < self.buffer_size {
                self.eof = true;
            }

            match block.iter().rposition(|&b| b == b'\n') {
                Some(last_newline) => {
                    self.carry = block.split_off(last_newline + 1);
                    return Ok(Some(block));
                }
                // No complete line yet: keep accumulating.
                None => self.carry = block,
            }
        }
    }
}

enum Blocks<R> {
    Fixed(FixedBlocks<R>),
    Carry(LineBlocks<R>),
}

impl<R: BufRead> Blocks<R> {
    fn new(reader: R, config: &LoaderConfig) -> Self {
        match config.boundary_lines {
            BoundaryLines::Drop => Blocks::Fixed(FixedBlocks::new(reader, config.buffer_size())),
            BoundaryLines::Carry => Blocks::Carry(LineBlocks::new(reader, config.buffer_size())),
        }
    }

    fn next_block(&mut self) -> io::Result<Option<TextBlock>> {
        match self {
            Blocks::Fixed(blocks) => blocks.next_block(),
            Blocks::Carry(blocks) => Ok(blocks.next_block()?.map(TextBlock::whole)),
        }
    }

    fn bytes_read(&self) -> usize {
        match self {
            Blocks::Fixed(blocks) => blocks.bytes_read,
            Blocks::Carry(blocks) => blocks.bytes_read,
        }
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Load a text point file. Fails only if the file cannot be opened; a read
/// error part-way through keeps whatever was parsed before it.
pub fn try_load_text(path: &Path, downsample: usize, config: &LoaderConfig) -> Result<PointCloud> {
    let mut cloud = PointCloud::named_for(path);
    let file = File::open(path).map_err(|e| PointCloudError::open(path, e))?;

    log::info!("Loading point cloud from: {}", path.display());

    let reader = BufReader::with_capacity(config.buffer_size(), file);
    let mut blocks = Blocks::new(reader, config);
    let outcome = run_batched(
        || blocks.next_block(),
        config.workers(),
        |block: TextBlock| block.parse(downsample),
    );

    if let Some(err) = outcome.error {
        log::warn!(
            "{}: read error after {} bytes, keeping {} parsed points: {}",
            path.display(),
            blocks.bytes_read(),
            outcome.points.len(),
            err
        );
    }

    cloud.points = outcome.points;

    log::info!(
        "{}: {} bytes in {} blocks, {} points loaded (downsample {})",
        path.display(),
        blocks.bytes_read(),
        outcome.jobs,
        cloud.points.len(),
        downsample.max(1)
    );

    Ok(cloud)
}
