//! Common types used by the quantizer, the pipeline and the writer

/// An RGB color triple
pub type Rgb = [u8; 3];

/// Disposal method
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DisposalMethod {
    /// Decoder is not required to take any action.
    Any = 0,
    /// Do not dispose.
    Keep = 1,
    /// Restore to background color.
    Background = 2,
    /// Restore to previous.
    Previous = 3,
}

impl DisposalMethod {
    pub fn from_u8(n: u8) -> Option<DisposalMethod> {
        match n {
            0 => Some(DisposalMethod::Any),
            1 => Some(DisposalMethod::Keep),
            2 => Some(DisposalMethod::Background),
            3 => Some(DisposalMethod::Previous),
            _ => None,
        }
    }

    /// Disposal used when none was configured explicitly.
    pub(crate) fn default_for(transparent: bool) -> DisposalMethod {
        if transparent {
            DisposalMethod::Background
        } else {
            DisposalMethod::Any
        }
    }
}

/// Known block types
enum_from_primitive! {
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Block {
    Image = 0x2C,
    Extension = 0x21,
    Trailer = 0x3B
}
}

/// Known GIF extensions
enum_from_primitive! {
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Extension {
    Text = 0x01,
    Control = 0xF9,
    Comment = 0xFE,
    Application = 0xFF
}
}
