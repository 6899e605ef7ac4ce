//! ImageJ image description (`ImageDescription` tag) parsing and writing.
//!
//! ImageJ stores hyperstack geometry and the display range as `key=value`
//! lines in the first page's description, starting with an `ImageJ=`
//! version line:
//!
//! ```text
//! ImageJ=1.54f
//! images=22
//! channels=2
//! slices=11
//! hyperstack=true
//! mode=composite
//! ```

use std::fmt;

use mipmerge_pipeline::DisplayRange;

/// Version written on the first line of generated descriptions.
pub const IMAGEJ_VERSION: &str = "1.54f";

/// The keys of an ImageJ description that mipmerge reads or writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageJDescription {
    /// Total page count.
    pub images: Option<usize>,
    /// Channels per z-position.
    pub channels: Option<usize>,
    /// Z-positions per time point.
    pub slices: Option<usize>,
    /// Time points.
    pub frames: Option<usize>,
    /// Whether ImageJ should open the pages as a hyperstack.
    pub hyperstack: bool,
    /// Display mode (`composite`, `color` or `grayscale`).
    pub mode: Option<String>,
    /// Display range minimum.
    pub min: Option<f64>,
    /// Display range maximum.
    pub max: Option<f64>,
}

impl ImageJDescription {
    /// Parse a description. Returns `None` unless it was written by
    /// ImageJ (first line `ImageJ=...`).
    ///
    /// Unknown keys and malformed values are ignored.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        text.lines().next()?.trim().strip_prefix("ImageJ=")?;

        let mut description = Self::default();
        for line in text.lines().skip(1) {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_end_matches('\0');
            match key.trim() {
                "images" => description.images = value.parse().ok(),
                "channels" => description.channels = value.parse().ok(),
                "slices" => description.slices = value.parse().ok(),
                "frames" => description.frames = value.parse().ok(),
                "hyperstack" => description.hyperstack = value == "true",
                "mode" => description.mode = Some(value.to_owned()),
                "min" => description.min = value.parse().ok(),
                "max" => description.max = value.parse().ok(),
                _ => {}
            }
        }
        Some(description)
    }

    /// Description for a single plane with the given display range.
    #[must_use]
    pub fn for_plane(range: DisplayRange) -> Self {
        Self {
            images: Some(1),
            min: Some(f64::from(range.min)),
            max: Some(f64::from(range.max)),
            ..Self::default()
        }
    }

    /// Description for `channels × slices` pages in channel-fastest order.
    #[must_use]
    pub fn for_hyperstack(channels: usize, slices: usize) -> Self {
        let multichannel = channels > 1;
        Self {
            images: Some(channels * slices),
            channels: multichannel.then_some(channels),
            slices: (slices > 1).then_some(slices),
            hyperstack: multichannel,
            mode: multichannel.then(|| "composite".to_owned()),
            ..Self::default()
        }
    }

    /// Attach a display range.
    #[must_use]
    pub fn with_range(mut self, range: DisplayRange) -> Self {
        self.min = Some(f64::from(range.min));
        self.max = Some(f64::from(range.max));
        self
    }

    /// The display range, when both ends are present and representable.
    #[must_use]
    pub fn display_range(&self) -> Option<DisplayRange> {
        range_from_f64(self.min?, self.max?)
    }
}

/// A display range from ImageJ's floating-point bounds, when both fit the
/// sample range and are ordered.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn range_from_f64(min: f64, max: f64) -> Option<DisplayRange> {
    let fits = |v: f64| (0.0..=f64::from(u16::MAX)).contains(&v);
    (fits(min) && fits(max) && min <= max)
        .then(|| DisplayRange::new(min.round() as u16, max.round() as u16))
}

impl fmt::Display for ImageJDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ImageJ={IMAGEJ_VERSION}")?;
        let counts = [
            ("images", self.images),
            ("channels", self.channels),
            ("slices", self.slices),
            ("frames", self.frames),
        ];
        for (key, value) in counts {
            if let Some(value) = value {
                writeln!(f, "{key}={value}")?;
            }
        }
        if self.hyperstack {
            writeln!(f, "hyperstack=true")?;
        }
        if let Some(mode) = &self.mode {
            writeln!(f, "mode={mode}")?;
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            writeln!(f, "min={min:.1}")?;
            writeln!(f, "max={max:.1}")?;
        }
        Ok(())
    }
}
