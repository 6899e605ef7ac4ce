//! mipmerge-tiff: TIFF codecs for mipmerge (sans-IO).
//!
//! Decodes ImageJ hyperstacks from in-memory bytes into a
//! [`MultichannelImage`](mipmerge_pipeline::MultichannelImage) and encodes
//! planes and composites back to TIFF bytes with ImageJ metadata.
//!
//! This crate has **no filesystem access**; paths, directories and atomic
//! writes live in `mipmerge-io`.

pub mod decode;
pub mod description;
pub mod encode;
pub mod metadata;

pub use decode::decode_hyperstack;
pub use description::ImageJDescription;
pub use encode::{encode_composite, encode_multichannel, encode_plane};
pub use metadata::ChannelMetadata;

use mipmerge_pipeline::PipelineError;

/// Errors that can occur while decoding or encoding TIFF data.
#[derive(Debug, thiserror::Error)]
pub enum TiffCodecError {
    /// The underlying TIFF library failed.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Pages use a color type or sample format mipmerge cannot process.
    #[error("unsupported sample layout: {0}")]
    UnsupportedLayout(String),

    /// The page count or description does not describe a valid
    /// hyperstack.
    #[error("invalid hyperstack layout: {0}")]
    Layout(String),

    /// Pages could not be assembled into stacks.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
