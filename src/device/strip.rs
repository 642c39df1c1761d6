//! Pixel strip driver boundary.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::show::Rgb;

/// Addressable LED outputs.
///
/// Writes only touch an in-memory buffer; [`StripDriver::show`] pushes the
/// buffer of one output to the hardware.
pub trait StripDriver: Send {
    fn output_count(&self) -> usize;

    /// Set one pixel of `output`. Out-of-range pixels are ignored.
    fn set_pixel(&mut self, output: usize, index: usize, color: Rgb);

    /// Write consecutive pixels starting at `start`.
    fn write_span(&mut self, output: usize, start: usize, pixels: &[Rgb]) {
        for (i, &color) in pixels.iter().enumerate() {
            self.set_pixel(output, start + i, color);
        }
    }

    /// Flush the buffer of `output` to the hardware.
    fn show(&mut self, output: usize);

    /// Set every pixel of `output` to black (not flushed).
    fn blank(&mut self, output: usize);

    fn show_all(&mut self) {
        for output in 0..self.output_count() {
            self.show(output);
        }
    }

    fn blank_all(&mut self) {
        for output in 0..self.output_count() {
            self.blank(output);
        }
    }
}

/// Strip shared between frame delivery and the refresh loop.
///
/// Holding the lock for a whole span write or flush keeps a flush from
/// observing a half-written frame.
pub type SharedStrip<D> = Arc<Mutex<D>>;

pub fn share<D: StripDriver>(driver: D) -> SharedStrip<D> {
    Arc::new(Mutex::new(driver))
}

/// One recorded [`StripDriver::write_span`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanWrite {
    pub output: usize,
    pub start: usize,
    pub pixels: Vec<Rgb>,
}

/// Strip driver backed by memory.
///
/// Keeps a working buffer and the last shown buffer per output. Used for
/// monitoring without hardware and in tests.
#[derive(Debug, Clone)]
pub struct MemoryStrip {
    buffers: Vec<Vec<Rgb>>,
    shown: Vec<Vec<Rgb>>,
    show_count: u64,
    history: Option<Vec<SpanWrite>>,
}

impl MemoryStrip {
    pub fn new(pixel_counts: &[usize]) -> Self {
        let buffers: Vec<Vec<Rgb>> = pixel_counts.iter().map(|&n| vec![Rgb::BLACK; n]).collect();
        Self {
            shown: buffers.clone(),
            buffers,
            show_count: 0,
            history: None,
        }
    }

    /// Also keep a log of every span write.
    pub fn with_history(mut self) -> Self {
        self.history = Some(Vec::new());
        self
    }

    /// Working buffer of `output`.
    pub fn buffer(&self, output: usize) -> &[Rgb] {
        self.buffers.get(output).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Buffer of `output` as of its last show.
    pub fn shown(&self, output: usize) -> &[Rgb] {
        self.shown.get(output).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn show_count(&self) -> u64 {
        self.show_count
    }

    pub fn history(&self) -> &[SpanWrite] {
        self.history.as_deref().unwrap_or(&[])
    }
}

impl StripDriver for MemoryStrip {
    fn output_count(&self) -> usize {
        self.buffers.len()
    }

    fn set_pixel(&mut self, output: usize, index: usize, color: Rgb) {
        if let Some(pixel) = self.buffers.get_mut(output).and_then(|b| b.get_mut(index)) {
            *pixel = color;
        }
    }

    fn write_span(&mut self, output: usize, start: usize, pixels: &[Rgb]) {
        if let Some(history) = self.history.as_mut() {
            history.push(SpanWrite {
                output,
                start,
                pixels: pixels.to_vec(),
            });
        }
        if let Some(buffer) = self.buffers.get_mut(output) {
            let end = (start + pixels.len()).min(buffer.len());
            if start < end {
                buffer[start..end].copy_from_slice(&pixels[..end - start]);
            }
        }
    }

    fn show(&mut self, output: usize) {
        if let (Some(buffer), Some(shown)) = (self.buffers.get(output), self.shown.get_mut(output)) {
            shown.clone_from(buffer);
            self.show_count += 1;
        }
    }

    fn blank(&mut self, output: usize) {
        if let Some(buffer) = self.buffers.get_mut(output) {
            buffer.fill(Rgb::BLACK);
        }
    }
}
