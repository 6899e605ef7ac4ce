//! Channel separation.
//!
//! This is the first step in the pipeline: the acquisition is consumed and
//! its two channel stacks are handed on independently.

use crate::types::{ImageStack, MultichannelImage, PipelineError};

/// Number of channels every acquisition must expose.
pub const CHANNEL_COUNT: usize = 2;

/// The two channel stacks of an acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPair {
    /// Channel 1: fluorescence z-stack.
    pub fluorescence: ImageStack,
    /// Channel 2: phase-contrast image (usually one plane).
    pub phase: ImageStack,
}

/// Split an acquisition into its fluorescence and phase stacks.
///
/// Z-order and plane dimensions are preserved.
///
/// # Errors
///
/// Returns [`PipelineError::ChannelCountMismatch`] unless the image has
/// exactly [`CHANNEL_COUNT`] channels.
pub fn split_channels(image: MultichannelImage) -> Result<ChannelPair, PipelineError> {
    let channels: [ImageStack; CHANNEL_COUNT] = image
        .into_channels()
        .try_into()
        .map_err(|rest: Vec<ImageStack>| PipelineError::ChannelCountMismatch {
            expected: CHANNEL_COUNT,
            found: rest.len(),
        })?;
    let [fluorescence, phase] = channels;
    Ok(ChannelPair {
        fluorescence,
        phase,
    })
}
