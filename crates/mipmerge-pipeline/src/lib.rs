//! mipmerge-pipeline: Pure z-stack processing pipeline (sans-IO).
//!
//! Turns a two-channel microscope acquisition into a processed
//! fluorescence plane, a projected phase plane and a pseudo-colored
//! composite through:
//! split -> background subtraction -> max projection -> background
//! subtraction -> Gaussian blur -> contrast enhancement -> merge.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! planes and returns structured data. Decoding and encoding live in
//! `mipmerge-tiff`, filesystem interaction in `mipmerge-io`.

pub mod background;
pub mod blur;
pub mod composite;
pub mod contrast;
mod lines;
mod paraboloid;
pub mod project;
mod rolling_ball;
pub mod split;
pub mod types;

pub use background::BackgroundParams;
pub use composite::{Composite, CompositeImage, CompositeMode, PaletteSlot};
pub use split::ChannelPair;
pub use types::{
    BitDepth, Dimensions, DisplayRange, Gray16Image, ImageStack, Lut, MultichannelImage,
    PipelineError, Plane, ProcessingParams, ResultRecord, RgbImage,
};

use std::path::Path;

/// Output name for a source file: its file name up to the first period.
///
/// `"cells_01.ome.tif"` becomes `"cells_01"`. A name that starts with a
/// period (nothing before it) is used whole.
#[must_use]
pub fn base_identifier(source_name: &str) -> String {
    let file_name = Path::new(source_name)
        .file_name()
        .map_or_else(|| source_name.to_owned(), |n| n.to_string_lossy().into_owned());
    match file_name.split('.').next() {
        Some(stem) if !stem.is_empty() => stem.to_owned(),
        _ => file_name,
    }
}

/// Run the full processing pipeline on one acquisition.
///
/// # Pipeline steps
///
/// 1. Validate parameters
/// 2. Derive the output identifier from `source_name`
/// 3. Split into fluorescence (channel 1) and phase (channel 2)
/// 4. Max-project the phase stack
/// 5. Background-subtract every fluorescence plane
/// 6. Max-project the fluorescence stack
/// 7. Background-subtract the projection again
/// 8. Gaussian blur
/// 9. Reset the LUT to grays and enhance contrast
/// 10. Composite phase (cyan) with fluorescence (magenta)
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `params` is out of range.
/// Returns [`PipelineError::ChannelCountMismatch`] unless the image has
/// exactly two channels; no numeric work is done in that case.
/// Returns [`PipelineError::NonNeutralLut`] if the phase channel carries
/// a colored LUT.
pub fn process(
    image: MultichannelImage,
    source_name: &str,
    params: &ProcessingParams,
) -> Result<ResultRecord, PipelineError> {
    // 1. Validate.
    params.validate()?;

    // 2. Identifier.
    let identifier = base_identifier(source_name);

    // 3. Split channels.
    let ChannelPair {
        fluorescence,
        phase,
    } = split::split_channels(image)?;
    log::debug!(
        "{identifier}: split into {} fluorescence and {} phase planes",
        fluorescence.len(),
        phase.len(),
    );

    // 4. Phase projection.
    let phase = project::max_intensity(&phase);

    // 5. Per-plane background subtraction.
    let fluorescence = background::subtract_background_stack(&fluorescence, &params.background);
    log::debug!(
        "{identifier}: subtracted background from {} planes (radius {})",
        fluorescence.len(),
        params.background.radius,
    );

    // 6. Fluorescence projection.
    let fluorescence = project::max_intensity(&fluorescence);
    log::debug!("{identifier}: projected to {}", fluorescence.dimensions());

    // 7. Background subtraction on the projection.
    let fluorescence = background::subtract_background(&fluorescence, &params.background);

    // 8. Smoothing.
    let fluorescence = blur::gaussian_blur(
        &fluorescence,
        params.blur_sigma,
        params.blur_sigma,
        params.blur_accuracy,
    );
    log::debug!("{identifier}: blurred with sigma {}", params.blur_sigma);

    // 9. Contrast.
    let fluorescence = contrast::enhance_contrast(
        fluorescence.with_lut(Lut::Grays),
        params.saturated_percent,
    );
    let range = fluorescence.display_range();
    log::debug!(
        "{identifier}: display range {}..{} ({}% saturated)",
        range.min,
        range.max,
        params.saturated_percent,
    );

    // 10. Composite.
    let composite = composite::composite(&phase, &fluorescence, params.composite_mode)?;
    log::debug!("{identifier}: merged as {:?}", params.composite_mode);

    Ok(ResultRecord {
        identifier,
        fluorescence,
        phase,
        composite,
    })
}
