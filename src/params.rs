//! Stream configuration parameters
//!
//! Parameters are applied with [`HasParameters::set`](crate::HasParameters::set)
//! on [`Settings`] or directly on a [`Pipeline`](crate::Pipeline). Frame
//! related values are captured when a frame is submitted, so changing them
//! only affects frames submitted afterwards.
use crate::quant::DEFAULT_SAMPLE;
use crate::traits::{HasParameters, Parameter};
use crate::types::{DisposalMethod, Rgb};

/// Encoder settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    delay: u16,
    repeat: Option<u16>,
    sample: u32,
    dispose: Option<DisposalMethod>,
    transparent: Option<Rgb>,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            delay: 0,
            repeat: None,
            sample: DEFAULT_SAMPLE,
            dispose: None,
            transparent: None,
        }
    }
}

impl HasParameters for Settings {}

impl Settings {
    /// Frame delay in hundredths of a second
    pub fn delay(&self) -> u16 {
        self.delay
    }

    /// Loop count, `Some(0)` loops forever and `None` writes no loop extension
    pub fn repeat(&self) -> Option<u16> {
        self.repeat
    }

    /// Quantizer sample factor
    pub fn sample(&self) -> u32 {
        self.sample
    }

    pub fn transparent(&self) -> Option<Rgb> {
        self.transparent
    }

    /// Disposal written for each frame.
    ///
    /// An explicit override wins; otherwise frames with a transparent color
    /// restore to background and all others request no action.
    pub fn dispose(&self) -> DisposalMethod {
        self.dispose
            .unwrap_or_else(|| DisposalMethod::default_for(self.transparent.is_some()))
    }

    pub(crate) fn frame_params(&self) -> FrameParams {
        FrameParams {
            delay: self.delay,
            dispose: self.dispose(),
            transparent: self.transparent,
            sample: self.sample,
        }
    }
}

/// Per-frame snapshot of the settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameParams {
    pub delay: u16,
    pub dispose: DisposalMethod,
    pub transparent: Option<Rgb>,
    pub sample: u32,
}

/// Delay between frames in hundredths of a second
#[derive(Debug, Clone, Copy)]
pub struct Delay(pub u16);

impl Parameter<Settings> for Delay {
    fn set_param(self, this: &mut Settings) {
        this.delay = self.0
    }
}

/// Frame rate in frames per second, converted to a delay of `100 / fps`
/// rounded half to even.
/// A rate of zero leaves the delay untouched.
#[derive(Debug, Clone, Copy)]
pub struct FrameRate(pub f32);

impl Parameter<Settings> for FrameRate {
    fn set_param(self, this: &mut Settings) {
        if self.0 != 0.0 {
            this.delay = (100.0 / self.0)
                .round_ties_even()
                .clamp(0.0, f32::from(u16::MAX)) as u16;
        }
    }
}

/// Number of times the animation is played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Additional loops after the first pass
    Finite(u16),
    Infinite,
}

impl Parameter<Settings> for Repeat {
    fn set_param(self, this: &mut Settings) {
        this.repeat = Some(match self {
            Repeat::Finite(n) => n,
            Repeat::Infinite => 0,
        })
    }
}

/// Quantizer sample factor, 1 is slowest and best. Clamped to at least 1.
#[derive(Debug, Clone, Copy)]
pub struct Quality(pub u32);

impl Parameter<Settings> for Quality {
    fn set_param(self, this: &mut Settings) {
        this.sample = self.0.max(1)
    }
}

/// Color to be treated as transparent on display, `None` to disable
#[derive(Debug, Clone, Copy)]
pub struct Transparent(pub Option<Rgb>);

impl Parameter<Settings> for Transparent {
    fn set_param(self, this: &mut Settings) {
        this.transparent = self.0
    }
}

impl Parameter<Settings> for DisposalMethod {
    fn set_param(self, this: &mut Settings) {
        this.dispose = Some(self)
    }
}
