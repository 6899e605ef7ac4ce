//! Pseudo-color channel merging.
//!
//! Planes are assigned to one of seven palette slots and combined into a
//! composite that either keeps the channels separate (each with its slot
//! color as LUT) or is flattened to 8-bit RGB by additive blending.

use std::fmt;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Lut, PipelineError, Plane};

/// Color position in a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteSlot {
    Red,
    Green,
    Blue,
    Gray,
    Cyan,
    Magenta,
    Yellow,
}

impl PaletteSlot {
    /// Every slot, in merge order.
    pub const ALL: [Self; 7] = [
        Self::Red,
        Self::Green,
        Self::Blue,
        Self::Gray,
        Self::Cyan,
        Self::Magenta,
        Self::Yellow,
    ];

    /// Position in [`PaletteSlot::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// LUT given to a plane placed in this slot.
    #[must_use]
    pub const fn lut(self) -> Lut {
        match self {
            Self::Red => Lut::Red,
            Self::Green => Lut::Green,
            Self::Blue => Lut::Blue,
            Self::Gray => Lut::Grays,
            Self::Cyan => Lut::Cyan,
            Self::Magenta => Lut::Magenta,
            Self::Yellow => Lut::Yellow,
        }
    }
}

impl fmt::Display for PaletteSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Gray => "gray",
            Self::Cyan => "cyan",
            Self::Magenta => "magenta",
            Self::Yellow => "yellow",
        };
        f.write_str(name)
    }
}

/// Whether a composite keeps its channels or is flattened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMode {
    /// Separate channels, each with its slot LUT.
    #[default]
    MultiChannel,
    /// Flattened 8-bit RGB.
    Rgb,
}

/// One occupied slot of a composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeChannel {
    /// Palette slot.
    pub slot: PaletteSlot,
    /// Plane carrying the slot LUT and its own display range.
    pub plane: Plane,
}

/// Multi-channel composite: occupied slots in palette order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeImage {
    dimensions: Dimensions,
    channels: Vec<CompositeChannel>,
}

impl CompositeImage {
    /// Shared plane dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Occupied channels in palette order.
    #[must_use]
    pub fn channels(&self) -> &[CompositeChannel] {
        &self.channels
    }

    /// The plane in `slot`, if occupied.
    #[must_use]
    pub fn channel(&self, slot: PaletteSlot) -> Option<&Plane> {
        self.channels
            .iter()
            .find(|c| c.slot == slot)
            .map(|c| &c.plane)
    }

    /// Flatten to RGB.
    ///
    /// Each channel is mapped to 8 bits through its display range, scaled
    /// by its LUT color and added to the result with saturation.
    #[must_use]
    pub fn to_rgb(&self) -> RgbImage {
        let mut rgb = RgbImage::new(self.dimensions.width, self.dimensions.height);
        for channel in &self.channels {
            let color = channel.plane.lut().rgb();
            let range = channel.plane.display_range();
            for (pixel, &sample) in rgb.pixels_mut().zip(channel.plane.samples()) {
                let level = u16::from(range.to_u8(sample));
                for (component, &full) in pixel.0.iter_mut().zip(&color) {
                    let added = u8::try_from(level * u16::from(full) / 255).unwrap_or(u8::MAX);
                    *component = component.saturating_add(added);
                }
            }
        }
        rgb
    }
}

/// Output of the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Composite {
    /// Channels kept separate.
    MultiChannel(CompositeImage),
    /// Flattened to 8-bit RGB.
    Rgb(RgbImage),
}

impl Composite {
    /// Pixel dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        match self {
            Self::MultiChannel(image) => image.dimensions(),
            Self::Rgb(image) => Dimensions::new(image.width(), image.height()),
        }
    }

    /// The mode this composite was built with.
    #[must_use]
    pub const fn mode(&self) -> CompositeMode {
        match self {
            Self::MultiChannel(_) => CompositeMode::MultiChannel,
            Self::Rgb(_) => CompositeMode::Rgb,
        }
    }
}

/// Merge a phase plane (cyan) with a fluorescence plane (magenta).
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the planes differ in
/// size, or [`PipelineError::NonNeutralLut`] if either plane carries a
/// LUT other than [`Lut::Grays`].
pub fn composite(
    cyan: &Plane,
    magenta: &Plane,
    mode: CompositeMode,
) -> Result<Composite, PipelineError> {
    let mut slots = [None; PaletteSlot::ALL.len()];
    slots[PaletteSlot::Cyan.index()] = Some(cyan);
    slots[PaletteSlot::Magenta.index()] = Some(magenta);
    merge_channels(cyan.dimensions(), slots, mode)
}

/// Merge up to seven planes, one per palette slot.
fn merge_channels(
    dimensions: Dimensions,
    slots: [Option<&Plane>; PaletteSlot::ALL.len()],
    mode: CompositeMode,
) -> Result<Composite, PipelineError> {
    let mut channels = Vec::new();
    for (slot, plane) in PaletteSlot::ALL.into_iter().zip(slots) {
        let Some(plane) = plane else { continue };
        if plane.dimensions() != dimensions {
            return Err(PipelineError::DimensionMismatch {
                expected: dimensions,
                found: plane.dimensions(),
            });
        }
        if !plane.lut().is_neutral() {
            return Err(PipelineError::NonNeutralLut {
                slot,
                lut: plane.lut(),
            });
        }
        channels.push(CompositeChannel {
            slot,
            plane: plane.clone().with_lut(slot.lut()),
        });
    }

    let image = CompositeImage {
        dimensions,
        channels,
    };
    Ok(match mode {
        CompositeMode::MultiChannel => Composite::MultiChannel(image),
        CompositeMode::Rgb => Composite::Rgb(image.to_rgb()),
    })
}
