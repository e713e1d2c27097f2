//! Per-frame palette learning and pixel mapping
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::error::{EncodingError, Result};
use crate::types::Rgb;

mod neuquant;

pub use self::neuquant::{ColorMap, NeuQuant, NETSIZE};

/// Default sample factor of the quantizer
pub const DEFAULT_SAMPLE: u32 = 10;

/// Cooperative cancellation check polled by long running loops
pub trait Interrupt {
    fn is_interrupted(&self) -> bool;
}

impl<F: Fn() -> bool> Interrupt for F {
    #[inline]
    fn is_interrupted(&self) -> bool {
        self()
    }
}

/// Shared cancellation flag.
///
/// Clones observe the same flag; cancelling is permanent.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    /// Requests cancellation of every quantization observing this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Interrupt for CancellationToken {
    #[inline]
    fn is_interrupted(&self) -> bool {
        self.is_cancelled()
    }
}

fn check_pixels(pixels: &[u8]) -> Result<()> {
    if pixels.is_empty() || pixels.len() % 3 != 0 {
        return Err(EncodingError::InvalidPixelData {
            expected: (pixels.len() / 3).max(1) * 3,
            actual: pixels.len(),
        });
    }
    Ok(())
}

/// Learns a palette for `pixels`, a buffer of RGB triples.
///
/// `sample` trades quality for speed: 1 examines every pixel, 10 is a good
/// default and values above 20 barely get faster.
pub fn quantize(pixels: &[u8], sample: u32) -> Result<ColorMap> {
    quantize_with(pixels, sample, &|| false)
}

/// Like [`quantize`] but aborts with [`EncodingError::Cancelled`] as soon as
/// `interrupt` fires.
pub fn quantize_with<I: Interrupt + ?Sized>(pixels: &[u8], sample: u32, interrupt: &I) -> Result<ColorMap> {
    check_pixels(pixels)?;
    let sample = i32::try_from(sample.max(1)).unwrap_or(i32::MAX);
    trace!(pixels = pixels.len() / 3, sample, "learning palette");
    let mut nq = NeuQuant::new(pixels, sample);
    nq.learn(interrupt)?;
    nq.build(interrupt)
}

/// A frame reduced to a palette and per-pixel indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantized {
    /// RGB palette, 768 bytes
    pub color_table: Vec<u8>,
    /// One palette index per pixel
    pub indices: Vec<u8>,
    /// Palette index nearest to the configured transparent color
    pub transparent: Option<u8>,
}

impl Quantized {
    pub fn new<I: Interrupt + ?Sized>(
        pixels: &[u8],
        sample: u32,
        transparent: Option<Rgb>,
        interrupt: &I,
    ) -> Result<Quantized> {
        let map = quantize_with(pixels, sample, interrupt)?;
        let indices = map.map_pixels(pixels, interrupt)?;
        Ok(Quantized {
            color_table: map.color_table(),
            indices,
            transparent: transparent.map(|c| map.index_of(c)),
        })
    }
}
