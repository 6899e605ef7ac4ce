//! Shared types for the mipmerge processing pipeline.

use std::fmt;

use image::{ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::background::BackgroundParams;
use crate::composite::{Composite, CompositeMode, PaletteSlot};

/// Single-channel image with 16-bit samples.
///
/// 8-bit acquisitions are held widened in the same buffer type; the owning
/// [`Plane`] records the original [`BitDepth`].
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Re-export `RgbImage` so downstream crates can reference flattened
/// composites without depending on `image` directly.
pub use image::RgbImage;

/// Width and height of a plane in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimensions value.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Sample bit depth of the acquisition.
///
/// Every stage clamps its output to [`BitDepth::max_value`], so a plane
/// never holds a sample its source format could not represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitDepth {
    /// Unsigned 8-bit samples (0..=255).
    Eight,
    /// Unsigned 16-bit samples (0..=65535).
    Sixteen,
}

impl BitDepth {
    /// Largest representable sample value.
    #[must_use]
    pub const fn max_value(self) -> u16 {
        match self {
            Self::Eight => u8::MAX as u16,
            Self::Sixteen => u16::MAX,
        }
    }

    /// Number of bits per sample.
    #[must_use]
    pub const fn bits(self) -> u16 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
        }
    }
}

/// Display lookup table: maps stored intensity to a displayed color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lut {
    /// Neutral gray ramp.
    #[default]
    Grays,
    Red,
    Green,
    Blue,
    Cyan,
    Magenta,
    Yellow,
}

impl Lut {
    /// Every lookup table, neutral first.
    pub const ALL: [Self; 7] = [
        Self::Grays,
        Self::Red,
        Self::Green,
        Self::Blue,
        Self::Cyan,
        Self::Magenta,
        Self::Yellow,
    ];

    /// Color displayed for a fully saturated sample.
    #[must_use]
    pub const fn rgb(self) -> [u8; 3] {
        match self {
            Self::Grays => [255, 255, 255],
            Self::Red => [255, 0, 0],
            Self::Green => [0, 255, 0],
            Self::Blue => [0, 0, 255],
            Self::Cyan => [0, 255, 255],
            Self::Magenta => [255, 0, 255],
            Self::Yellow => [255, 255, 0],
        }
    }

    /// Returns `true` for the neutral gray ramp.
    #[must_use]
    pub const fn is_neutral(self) -> bool {
        matches!(self, Self::Grays)
    }
}

impl fmt::Display for Lut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Grays => "grays",
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Cyan => "cyan",
            Self::Magenta => "magenta",
            Self::Yellow => "yellow",
        };
        f.write_str(name)
    }
}

/// Sample values mapped to the darkest and brightest display levels.
///
/// Only affects rendering and export metadata, never stored samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRange {
    /// Sample value displayed as black.
    pub min: u16,
    /// Sample value displayed at full intensity.
    pub max: u16,
}

impl DisplayRange {
    /// Create a new display range.
    #[must_use]
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    /// The data range (minimum..maximum) of `samples`.
    ///
    /// An empty slice yields `0..0`.
    #[must_use]
    pub fn of_samples(samples: &[u16]) -> Self {
        samples
            .iter()
            .fold(None, |acc: Option<Self>, &v| {
                Some(acc.map_or(Self::new(v, v), |r| {
                    Self::new(r.min.min(v), r.max.max(v))
                }))
            })
            .unwrap_or(Self::new(0, 0))
    }

    /// Map a sample to an 8-bit display level.
    ///
    /// Uses `256 / (max - min + 1)` as the scale with rounding, so `min`
    /// maps to 0 and values above `max` saturate at 255.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_u8(self, value: u16) -> u8 {
        let span = f64::from(self.max.saturating_sub(self.min)) + 1.0;
        let scaled = f64::from(value.saturating_sub(self.min)).mul_add(256.0 / span, 0.5);
        scaled.min(255.0) as u8
    }
}

/// Round a working `f32` sample to the nearest storable value.
///
/// Values are clamped to `0..=max` first; `NaN` maps to zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn round_sample(value: f32, max: f32) -> u16 {
    (value + 0.5).clamp(0.0, max) as u16
}

/// A single 2D intensity plane with its display mapping.
///
/// Planes are immutable values: every stage returns a new plane. Stage
/// outputs keep the input's bit depth and LUT and get a fresh
/// data-derived display range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    image: Gray16Image,
    depth: BitDepth,
    lut: Lut,
    display_range: DisplayRange,
}

impl Plane {
    /// Wrap sample data as a plane with a neutral LUT.
    ///
    /// Samples above `depth.max_value()` are clamped. The display range
    /// is the data range.
    #[must_use]
    pub fn new(mut image: Gray16Image, depth: BitDepth) -> Self {
        let max = depth.max_value();
        for pixel in image.pixels_mut() {
            pixel.0[0] = pixel.0[0].min(max);
        }
        let display_range = DisplayRange::of_samples(image.as_raw());
        Self {
            image,
            depth,
            lut: Lut::Grays,
            display_range,
        }
    }

    /// Build a plane by evaluating `f` at every pixel.
    #[must_use]
    pub fn from_fn(
        width: u32,
        height: u32,
        depth: BitDepth,
        mut f: impl FnMut(u32, u32) -> u16,
    ) -> Self {
        Self::new(
            Gray16Image::from_fn(width, height, |x, y| Luma([f(x, y)])),
            depth,
        )
    }

    /// A plane where every sample equals `value`.
    #[must_use]
    pub fn filled(width: u32, height: u32, depth: BitDepth, value: u16) -> Self {
        Self::from_fn(width, height, depth, |_, _| value)
    }

    /// Plane size in pixels.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.image.width(), self.image.height())
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Sample bit depth.
    #[must_use]
    pub const fn depth(&self) -> BitDepth {
        self.depth
    }

    /// Display lookup table.
    #[must_use]
    pub const fn lut(&self) -> Lut {
        self.lut
    }

    /// Display range.
    #[must_use]
    pub const fn display_range(&self) -> DisplayRange {
        self.display_range
    }

    /// The underlying sample buffer.
    #[must_use]
    pub const fn image(&self) -> &Gray16Image {
        &self.image
    }

    /// Samples in row-major order.
    #[must_use]
    pub fn samples(&self) -> &[u16] {
        self.image.as_raw()
    }

    /// Sample at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u16 {
        self.image.get_pixel(x, y).0[0]
    }

    /// Replace the display lookup table.
    #[must_use]
    pub fn with_lut(mut self, lut: Lut) -> Self {
        self.lut = lut;
        self
    }

    /// Replace the display range. Samples are unchanged.
    #[must_use]
    pub fn with_display_range(mut self, range: DisplayRange) -> Self {
        self.display_range = range;
        self
    }

    /// A new plane holding `image`, with this plane's depth and LUT.
    pub(crate) fn derive(&self, image: Gray16Image) -> Self {
        Self::new(image, self.depth).with_lut(self.lut)
    }

    /// A new plane holding rounded `samples`, with this plane's size,
    /// depth and LUT.
    pub(crate) fn derive_from_f32(&self, samples: &[f32]) -> Self {
        let max = f32::from(self.depth.max_value());
        let mut image = Gray16Image::new(self.width(), self.height());
        for (pixel, &value) in image.pixels_mut().zip(samples) {
            pixel.0[0] = round_sample(value, max);
        }
        self.derive(image)
    }

    /// Samples widened to `f32` working precision.
    pub(crate) fn to_f32(&self) -> Vec<f32> {
        self.samples().iter().map(|&v| f32::from(v)).collect()
    }
}

/// Ordered z-planes of one channel.
///
/// Invariant: at least one plane, all planes share dimensions and bit
/// depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageStack {
    channel: usize,
    planes: Vec<Plane>,
}

impl ImageStack {
    /// Create a stack for the zero-based `channel` index.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyStack`] if `planes` is empty.
    /// Returns [`PipelineError::DimensionMismatch`] or
    /// [`PipelineError::BitDepthMismatch`] if the planes disagree.
    pub fn new(channel: usize, planes: Vec<Plane>) -> Result<Self, PipelineError> {
        let Some(first) = planes.first() else {
            return Err(PipelineError::EmptyStack { channel });
        };
        let (dimensions, depth) = (first.dimensions(), first.depth());
        for plane in planes.iter().skip(1) {
            check_compatible(dimensions, depth, plane.dimensions(), plane.depth())?;
        }
        Ok(Self { channel, planes })
    }

    /// A one-plane stack.
    #[must_use]
    pub fn single(channel: usize, plane: Plane) -> Self {
        Self {
            channel,
            planes: vec![plane],
        }
    }

    /// Zero-based channel index.
    #[must_use]
    pub const fn channel(&self) -> usize {
        self.channel
    }

    /// The planes in z-order.
    #[must_use]
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// The first (lowest) plane.
    #[must_use]
    pub fn first(&self) -> &Plane {
        &self.planes[0]
    }

    /// Number of z-planes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.planes.len()
    }

    /// Always `false`: stacks hold at least one plane.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Shared plane dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        self.first().dimensions()
    }

    /// Shared bit depth.
    #[must_use]
    pub fn depth(&self) -> BitDepth {
        self.first().depth()
    }

    /// Consume the stack, returning its planes.
    #[must_use]
    pub fn into_planes(self) -> Vec<Plane> {
        self.planes
    }

    /// A new stack with `f` applied to every plane. `f` must preserve
    /// dimensions and depth.
    pub(crate) fn map_planes(&self, f: impl FnMut(&Plane) -> Plane) -> Self {
        Self {
            channel: self.channel,
            planes: self.planes.iter().map(f).collect(),
        }
    }
}

/// One acquisition: a stack per channel.
///
/// Invariant: all channels share dimensions and bit depth. The channel
/// count is not constrained here; see [`crate::split::split_channels`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultichannelImage {
    channels: Vec<ImageStack>,
}

impl MultichannelImage {
    /// Combine per-channel stacks.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] or
    /// [`PipelineError::BitDepthMismatch`] if the stacks disagree.
    pub fn new(channels: Vec<ImageStack>) -> Result<Self, PipelineError> {
        if let Some(first) = channels.first() {
            let (dimensions, depth) = (first.dimensions(), first.depth());
            for stack in channels.iter().skip(1) {
                check_compatible(dimensions, depth, stack.dimensions(), stack.depth())?;
            }
        }
        Ok(Self { channels })
    }

    /// Number of channels.
    #[must_use]
    pub const fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// The per-channel stacks.
    #[must_use]
    pub fn channels(&self) -> &[ImageStack] {
        &self.channels
    }

    /// Plane dimensions, or `None` for an image with no channels.
    #[must_use]
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.channels.first().map(ImageStack::dimensions)
    }

    /// Consume the image, returning its stacks.
    #[must_use]
    pub fn into_channels(self) -> Vec<ImageStack> {
        self.channels
    }
}

fn check_compatible(
    expected: Dimensions,
    expected_depth: BitDepth,
    found: Dimensions,
    found_depth: BitDepth,
) -> Result<(), PipelineError> {
    if found != expected {
        return Err(PipelineError::DimensionMismatch { expected, found });
    }
    if found_depth != expected_depth {
        return Err(PipelineError::BitDepthMismatch {
            expected: expected_depth,
            found: found_depth,
        });
    }
    Ok(())
}

/// Configuration for processing one acquisition.
///
/// Supplied once per batch and shared read-only by every image.
///
/// Values are not checked on construction; call
/// [`validate`](Self::validate) (done by [`crate::process`]) before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingParams {
    /// Background estimation settings, used for both subtraction passes.
    pub background: BackgroundParams,

    /// Gaussian blur standard deviation in pixels, used on both axes.
    pub blur_sigma: f64,

    /// Gaussian kernel truncation accuracy: kernel tails below this
    /// relative weight are dropped. Must be in `(0, 1)`.
    pub blur_accuracy: f64,

    /// Percentage of pixels saturated by contrast enhancement, split
    /// evenly between the dark and bright ends.
    pub saturated_percent: f64,

    /// Whether the composite keeps separate channels or is flattened.
    pub composite_mode: CompositeMode,
}

impl ProcessingParams {
    /// Default Gaussian sigma.
    pub const DEFAULT_BLUR_SIGMA: f64 = 0.5;
    /// Default Gaussian accuracy.
    pub const DEFAULT_BLUR_ACCURACY: f64 = 0.01;
    /// Default saturation percentage.
    pub const DEFAULT_SATURATED_PERCENT: f64 = 0.35;

    /// Check that every parameter is finite and in range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let radius = self.background.radius;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "background radius must be positive, got {radius}"
            )));
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "blur sigma must be non-negative, got {}",
                self.blur_sigma
            )));
        }
        if !(self.blur_accuracy > 0.0 && self.blur_accuracy < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "blur accuracy must be in (0, 1), got {}",
                self.blur_accuracy
            )));
        }
        if !(0.0..100.0).contains(&self.saturated_percent) {
            return Err(PipelineError::InvalidConfig(format!(
                "saturated percent must be in [0, 100), got {}",
                self.saturated_percent
            )));
        }
        Ok(())
    }
}

impl Default for ProcessingParams {
    fn default() -> Self {
        Self {
            background: BackgroundParams::default(),
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            blur_accuracy: Self::DEFAULT_BLUR_ACCURACY,
            saturated_percent: Self::DEFAULT_SATURATED_PERCENT,
            composite_mode: CompositeMode::default(),
        }
    }
}

/// Output of processing one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    /// Source file name up to its first period; names every output file.
    pub identifier: String,
    /// Background-subtracted, projected, smoothed fluorescence plane
    /// with its contrast-enhanced display range.
    pub fluorescence: Plane,
    /// Projected phase-contrast plane.
    pub phase: Plane,
    /// Phase (cyan) and fluorescence (magenta) composite.
    pub composite: Composite,
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// The acquisition does not expose the expected number of channels.
    #[error("expected {expected} channels, found {found}")]
    ChannelCountMismatch {
        /// Required channel count.
        expected: usize,
        /// Channel count of the input.
        found: usize,
    },

    /// Planes that must share a size do not.
    #[error("plane dimensions {found} do not match {expected}")]
    DimensionMismatch {
        /// Size of the reference plane.
        expected: Dimensions,
        /// Size of the offending plane.
        found: Dimensions,
    },

    /// Planes that must share a bit depth do not.
    #[error("plane bit depth {found:?} does not match {expected:?}")]
    BitDepthMismatch {
        /// Depth of the reference plane.
        expected: BitDepth,
        /// Depth of the offending plane.
        found: BitDepth,
    },

    /// A channel has no planes.
    #[error("channel {channel} has no planes")]
    EmptyStack {
        /// Zero-based channel index.
        channel: usize,
    },

    /// A plane handed to the compositor still has a colored LUT.
    #[error("{slot} channel input has a {lut} lookup table; reset it to grays before compositing")]
    NonNeutralLut {
        /// Palette slot the plane was destined for.
        slot: PaletteSlot,
        /// The offending lookup table.
        lut: Lut,
    },

    /// Processing parameters are out of range.
    #[error("invalid processing parameters: {0}")]
    InvalidConfig(String),
}
