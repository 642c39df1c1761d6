//! Text formats for save bundle metadata and per-universe frame logs.

use std::fmt::Write as _;
use std::io::{self, BufRead, Seek, Write};

use super::{Result, ShowError};
use crate::schema::{Topology, UniverseSpec};

/// File name of the bundle metadata.
pub const METADATA_FILE: &str = "metadata.txt";

/// Number of lines in the metadata file.
pub const METADATA_FIELDS: usize = 5;

/// File name of the frame log for `universe`.
pub fn frame_log_name(universe: usize) -> String {
    format!("U{universe}.txt")
}

/// One RGB pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Pixels of one universe at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Seconds since the session anchor.
    pub offset: f64,
    /// Pixels of the universe's sub-range, in strip order.
    pub pixels: Vec<Rgb>,
}

/// Result of reading one frame log line.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Frame(Frame),
    /// Nothing left to read.
    EndOfStream,
}

/// Encode a topology as bundle metadata.
///
/// ```text
/// 5 #UNIVERSE COUNT
/// 2 #OUTPUT COUNT
/// 400, 300 #PIXEL COUNTS
/// 0, 0, 0, 1, 1 #UNIVERSE TO OUTPUT
/// 0, 1, 2, 0, 1 #UNIVERSE TO SUB-INDEX
/// ```
pub fn encode_metadata(topology: &Topology) -> String {
    let universes = topology.universes();
    format!(
        "{} #UNIVERSE COUNT\n{} #OUTPUT COUNT\n{} #PIXEL COUNTS\n{} #UNIVERSE TO OUTPUT\n{} #UNIVERSE TO SUB-INDEX\n",
        topology.universe_count(),
        topology.output_count(),
        join(topology.pixel_counts().iter()),
        join(universes.iter().map(|spec| &spec.output)),
        join(universes.iter().map(|spec| &spec.sub_index)),
    )
}

/// Decode bundle metadata.
///
/// Trailing `#` comments are ignored. Field lengths must agree with the
/// declared universe and output counts and every universe must point at an
/// existing output.
pub fn decode_metadata(text: &str) -> Result<Topology> {
    let mut lines = text.lines().map(|line| line.split('#').next().unwrap_or("").trim());
    let mut fields = Vec::with_capacity(METADATA_FIELDS);
    for line in 1..=METADATA_FIELDS {
        match lines.next() {
            Some(field) => fields.push(field),
            None => return Err(corrupt_metadata(line, "missing field")),
        }
    }

    let universe_count = parse_count(fields[0], 1)?;
    let output_count = parse_count(fields[1], 2)?;
    let pixel_counts = parse_list(fields[2], 3)?;
    let outputs = parse_list(fields[3], 4)?;
    let sub_indices = parse_list(fields[4], 5)?;

    if pixel_counts.len() != output_count {
        return Err(corrupt_metadata(
            3,
            format!("{} pixel counts for {output_count} outputs", pixel_counts.len()),
        ));
    }
    if outputs.len() != universe_count {
        return Err(corrupt_metadata(
            4,
            format!("{} entries for {universe_count} universes", outputs.len()),
        ));
    }
    if sub_indices.len() != universe_count {
        return Err(corrupt_metadata(
            5,
            format!("{} entries for {universe_count} universes", sub_indices.len()),
        ));
    }
    if let Some(&output) = outputs.iter().find(|&&output| output >= output_count) {
        return Err(corrupt_metadata(4, format!("output {output} does not exist")));
    }

    let universes = outputs
        .into_iter()
        .zip(sub_indices)
        .map(|(output, sub_index)| UniverseSpec { output, sub_index })
        .collect();

    Ok(Topology::from_parts(pixel_counts, universes))
}

/// Encode one frame as a log line (without the newline).
pub fn encode_frame(offset: f64, pixels: &[Rgb]) -> String {
    let mut line = offset.to_string();
    line.reserve(pixels.len() * 12);
    for pixel in pixels {
        let _ = write!(line, " {} {} {}", pixel.r, pixel.g, pixel.b);
    }
    line
}

/// Decode one raw log line.
///
/// An empty read is [`Decoded::EndOfStream`]; anything else that does not
/// parse is [`ShowError::CorruptFrame`].
pub fn decode_frame(line: &str) -> Result<Decoded> {
    if line.is_empty() {
        return Ok(Decoded::EndOfStream);
    }
    parse_frame(line)
        .map(Decoded::Frame)
        .map_err(|reason| ShowError::CorruptFrame { line: 1, reason })
}

fn parse_frame(line: &str) -> std::result::Result<Frame, String> {
    let mut tokens = line.split_whitespace();
    let stamp = tokens.next().ok_or("empty frame record")?;
    let offset: f64 = stamp
        .parse()
        .map_err(|_| format!("invalid timestamp `{stamp}`"))?;
    if !offset.is_finite() || offset < 0.0 {
        return Err(format!("invalid timestamp `{stamp}`"));
    }

    let channels = tokens
        .map(|token| {
            token
                .parse::<u8>()
                .map_err(|_| format!("invalid channel value `{token}`"))
        })
        .collect::<std::result::Result<Vec<u8>, String>>()?;
    if channels.len() % 3 != 0 {
        return Err(format!("{} channel values do not form whole pixels", channels.len()));
    }

    let pixels = channels
        .chunks_exact(3)
        .map(|c| Rgb::new(c[0], c[1], c[2]))
        .collect();
    Ok(Frame { offset, pixels })
}

/// Append-only writer for one universe's frame log.
///
/// Every frame is flushed as soon as it is written so a stopped session
/// never leaves a partial line behind.
#[derive(Debug)]
pub struct FrameWriter<W: Write> {
    writer: W,
    frames_written: u64,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames_written: 0,
        }
    }

    /// Append one frame record.
    pub fn append(&mut self, offset: f64, pixels: &[Rgb]) -> io::Result<()> {
        let mut line = encode_frame(offset, pixels);
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flush and release the underlying writer.
    pub fn close(mut self) -> io::Result<u64> {
        self.writer.flush()?;
        Ok(self.frames_written)
    }
}

/// Sequential reader for one universe's frame log.
#[derive(Debug)]
pub struct FrameReader<R: BufRead> {
    reader: R,
    line: usize,
    buffer: String,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buffer: String::new(),
        }
    }

    /// Read the next frame.
    pub fn next_frame(&mut self) -> Result<Decoded> {
        self.buffer.clear();
        if self.reader.read_line(&mut self.buffer)? == 0 {
            return Ok(Decoded::EndOfStream);
        }
        self.line += 1;
        parse_frame(&self.buffer)
            .map(Decoded::Frame)
            .map_err(|reason| ShowError::CorruptFrame {
                line: self.line,
                reason,
            })
    }

    /// Lines consumed so far.
    pub fn position(&self) -> usize {
        self.line
    }
}

impl<R: BufRead + Seek> FrameReader<R> {
    /// Move back to the first frame.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.reader.rewind()?;
        self.line = 0;
        Ok(())
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_frame() {
            Ok(Decoded::Frame(frame)) => Some(Ok(frame)),
            Ok(Decoded::EndOfStream) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

fn join<'a>(values: impl Iterator<Item = &'a usize>) -> String {
    values
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_count(field: &str, line: usize) -> Result<usize> {
    field
        .parse()
        .map_err(|_| corrupt_metadata(line, format!("`{field}` is not a count")))
}

fn parse_list(field: &str, line: usize) -> Result<Vec<usize>> {
    if field.is_empty() {
        return Ok(Vec::new());
    }
    field
        .split(',')
        .map(|token| parse_count(token.trim(), line))
        .collect()
}

fn corrupt_metadata(line: usize, reason: impl Into<String>) -> ShowError {
    ShowError::CorruptMetadata {
        line,
        reason: reason.into(),
    }
}
