//! # Animated GIF encoding with per-frame palettes
//!
//! Every frame is reduced to its own 256 color palette by a NeuQuant neural
//! network quantizer. Quantization of different frames may run concurrently
//! and finish in any order, the [`Pipeline`] writes them strictly by frame
//! index.
//!
//! ```
//! use neugif::{Pipeline, Repeat, FrameRate, HasParameters};
//!
//! let mut pipeline: Pipeline<Vec<u8>> = Pipeline::new();
//! pipeline.set(Repeat::Infinite).set(FrameRate(25.0));
//! pipeline.start(Vec::new(), 4, 4).unwrap();
//! for shade in [0u8, 128, 255].iter() {
//!     pipeline.spawn(vec![*shade; 4 * 4 * 3]).unwrap();
//! }
//! pipeline.finish().unwrap();
//! pipeline.run_to_end().unwrap();
//! let gif = pipeline.into_inner().unwrap();
//! assert_eq!(&gif[..6], b"GIF89a");
//! ```

#[macro_use]
extern crate enum_primitive;

mod error;
mod params;
mod pipeline;
pub mod quant;
mod traits;
mod types;
pub mod writer;

pub use crate::error::{EncodingError, Result};
pub use crate::traits::{HasParameters, Parameter};
pub use crate::types::{Block, DisposalMethod, Extension, Rgb};

/// Stream configuration parameters
pub use crate::params::{Delay, FrameRate, Quality, Repeat, Settings, Transparent};

pub use crate::pipeline::{Pipeline, Poll, State};
pub use crate::quant::{CancellationToken, Interrupt, Quantized};
pub use crate::writer::{Compress, Encoder, Lzw};

#[cfg(test)]
#[test]
fn round_trip() {
    // left half black, right half white
    let pixels: Vec<u8> = (0..32 * 32)
        .flat_map(|i| if i % 32 < 16 { [0, 0, 0] } else { [255, 255, 255] })
        .collect();
    let pipeline = Pipeline::new();
    pipeline.start(Vec::new(), 32, 32).unwrap();
    pipeline.submit(&pixels).unwrap();
    pipeline.finish().unwrap();
    pipeline.run_to_end().unwrap();
    let data = pipeline.into_inner().unwrap();

    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(&*data).unwrap();
    let palette = decoder.global_palette().unwrap().to_vec();
    assert_eq!(palette.len(), 768);
    let frame = decoder.read_next_frame().unwrap().unwrap().clone();
    assert_eq!((frame.width, frame.height), (32, 32));
    for (px, &idx) in pixels.chunks(3).zip(frame.buffer.iter()) {
        let entry = &palette[idx as usize * 3..idx as usize * 3 + 3];
        for c in 0..3 {
            assert!((px[c] as i32 - entry[c] as i32).abs() <= 8);
        }
    }
    assert!(decoder.read_next_frame().unwrap().is_none());
}
