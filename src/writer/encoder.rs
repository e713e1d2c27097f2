use std::io;
use std::io::prelude::*;

use crate::traits::WriteBytesExt;
use crate::types::{Block, DisposalMethod, Extension};

use super::compress::Compress;

/// Bit depth of the indexed pixel data handed to the entropy coder
pub const BIT_DEPTH: u8 = 8;

pub enum ExtensionData {
    Control { flags: u8, delay: u16, trns: u8 },
    Repetitions(u16),
}

impl ExtensionData {
    pub fn new_control_ext(
        delay: u16,
        dispose: DisposalMethod,
        needs_user_input: bool,
        trns: Option<u8>,
    ) -> ExtensionData {
        let mut flags = 0;
        let trns = match trns {
            Some(trns) => {
                flags |= 1;
                trns
            }
            None => 0,
        };
        flags |= (needs_user_input as u8) << 1;
        flags |= (dispose as u8) << 2;
        ExtensionData::Control { flags, delay, trns }
    }
}

/// A quantized frame as it goes into the file
#[derive(Debug, Clone, Copy)]
pub struct IndexedFrame<'a> {
    pub delay: u16,
    pub dispose: DisposalMethod,
    pub transparent: Option<u8>,
    /// RGB color table, at most 256 entries
    pub palette: &'a [u8],
    /// One palette index per pixel
    pub buffer: &'a [u8],
}

/// Serializes the GIF block structure.
///
/// The first frame's palette becomes the global color table, every later
/// frame carries a local one.
pub struct Encoder<W: Write> {
    w: W,
    width: u16,
    height: u16,
    repeat: Option<u16>,
    global_palette: bool,
}

impl<W: Write> Encoder<W> {
    pub fn new(w: W, width: u16, height: u16) -> Self {
        Encoder {
            w,
            width,
            height,
            repeat: None,
            global_palette: false,
        }
    }

    /// Loop count written with the global header, 0 loops forever
    pub fn with_repeat(mut self, repeat: Option<u16>) -> Self {
        self.repeat = repeat;
        self
    }

    /// Writes the file signature
    pub fn write_signature(&mut self) -> io::Result<()> {
        self.w.write_all(b"GIF89a")
    }

    /// Writes a complete frame to the image
    ///
    /// Note: the first frame also writes the logical screen descriptor, the
    /// global color table and the loop extension.
    pub fn write_frame(&mut self, frame: &IndexedFrame, compressor: &dyn Compress) -> io::Result<()> {
        let first = !self.global_palette;
        if first {
            // global table, color resolution 7, unsorted, table size
            self.write_screen_desc(0b1111_0000 | flag_size(frame.palette.len() / 3))?;
            self.write_color_table(frame.palette)?;
            if let Some(repeat) = self.repeat {
                self.write_extension(ExtensionData::Repetitions(repeat))?;
            }
            self.global_palette = true;
        }
        self.write_extension(ExtensionData::new_control_ext(
            frame.delay,
            frame.dispose,
            false,
            frame.transparent,
        ))?;
        self.w.write_le(Block::Image as u8)?;
        self.w.write_le(0u16)?; // left
        self.w.write_le(0u16)?; // top
        self.w.write_le(self.width)?;
        self.w.write_le(self.height)?;
        if first {
            self.w.write_le(0u8)?;
        } else {
            self.w.write_le(0b1000_0000 | flag_size(frame.palette.len() / 3))?;
            self.write_color_table(frame.palette)?;
        }
        self.write_image_block(frame.buffer, compressor)
    }

    /// Writes the trailer and flushes the destination
    ///
    /// A stream without frames still gets a screen descriptor, without a
    /// global color table.
    pub fn write_trailer(&mut self) -> io::Result<()> {
        if !self.global_palette {
            self.write_screen_desc(0)?;
        }
        self.w.write_le(Block::Trailer as u8)?;
        self.w.flush()
    }

    fn write_image_block(&mut self, data: &[u8], compressor: &dyn Compress) -> io::Result<()> {
        let compressed = compressor.compress(self.width, self.height, data, BIT_DEPTH)?;
        self.w.write_le(BIT_DEPTH)?;
        for chunk in compressed.chunks(0xFF) {
            self.w.write_le(chunk.len() as u8)?;
            self.w.write_all(chunk)?;
        }
        self.w.write_le(0u8)
    }

    fn write_color_table(&mut self, table: &[u8]) -> io::Result<()> {
        let num_colors = table.len() / 3;
        if num_colors == 0 || num_colors > 256 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "The GIF format requires a color palette of 1 to 256 entries.",
            ));
        }
        let size = flag_size(num_colors);
        self.w.write_all(&table[..num_colors * 3])?;
        // Waste some space as of gif spec
        for _ in 0..((2 << size) - num_colors) {
            self.w.write_all(&[0, 0, 0])?;
        }
        Ok(())
    }

    /// Writes an extension to the image
    pub fn write_extension(&mut self, extension: ExtensionData) -> io::Result<()> {
        use self::ExtensionData::*;
        self.w.write_le(Block::Extension as u8)?;
        match extension {
            Control { flags, delay, trns } => {
                self.w.write_le(Extension::Control as u8)?;
                self.w.write_le(4u8)?;
                self.w.write_le(flags)?;
                self.w.write_le(delay)?;
                self.w.write_le(trns)?;
            }
            Repetitions(repeat) => {
                self.w.write_le(Extension::Application as u8)?;
                self.w.write_le(11u8)?;
                self.w.write_all(b"NETSCAPE2.0")?;
                self.w.write_le(3u8)?;
                self.w.write_le(1u8)?;
                self.w.write_le(repeat)?;
            }
        }
        self.w.write_le(0u8)
    }

    /// Writes the logical screen descriptor
    fn write_screen_desc(&mut self, flags: u8) -> io::Result<()> {
        self.w.write_le(self.width)?;
        self.w.write_le(self.height)?;
        self.w.write_le(flags)?;
        self.w.write_le(0u8)?; // bg index
        self.w.write_le(0u8) // aspect ratio
    }

    pub fn get_ref(&self) -> &W {
        &self.w
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}

// Color table size converted to flag bits
fn flag_size(size: usize) -> u8 {
    match size {
        0..=2 => 0,
        3..=4 => 1,
        5..=8 => 2,
        9..=16 => 3,
        17..=32 => 4,
        33..=64 => 5,
        65..=128 => 6,
        _ => 7,
    }
}
