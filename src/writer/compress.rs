//! Entropy coder seam for the image data
use std::io;

/// Turns indexed pixels into a compressed code stream.
///
/// The returned bytes are the raw code stream; block framing is done by the
/// [`Encoder`](super::Encoder).
pub trait Compress: Send + Sync {
    fn compress(&self, width: u16, height: u16, indices: &[u8], bit_depth: u8) -> io::Result<Vec<u8>>;
}

/// Variable-length-code LZW with LSB first bit packing
#[derive(Debug, Default, Clone, Copy)]
pub struct Lzw;

impl Compress for Lzw {
    fn compress(&self, width: u16, height: u16, indices: &[u8], bit_depth: u8) -> io::Result<Vec<u8>> {
        if indices.is_empty() || indices.len() != width as usize * height as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "The indexed pixel buffer does not match the frame size.",
            ));
        }
        let mut data = Vec::with_capacity(indices.len() / 2);
        {
            let mut enc = lzw::Encoder::new(lzw::LsbWriter::new(&mut data), bit_depth)?;
            enc.encode_bytes(indices)?;
        }
        Ok(data)
    }
}
