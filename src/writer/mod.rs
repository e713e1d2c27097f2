//! GIF bitstream writer
mod compress;
mod encoder;

pub use self::compress::{Compress, Lzw};
pub use self::encoder::{Encoder, ExtensionData, IndexedFrame, BIT_DEPTH};
