//! ImageJ hyperstack decoding.

use std::io::Cursor;

use mipmerge_pipeline::{BitDepth, Gray16Image, ImageStack, MultichannelImage, Plane};
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::TiffCodecError;
use crate::description::ImageJDescription;
use crate::metadata::{ByteOrder, ChannelMetadata, META_DATA, META_DATA_BYTE_COUNTS};

/// Hyperstack geometry resolved from the description and page count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    channels: usize,
    slices: usize,
}

impl Geometry {
    /// Resolve the geometry of `pages` pages.
    ///
    /// Without an ImageJ description every page is a z-slice of a single
    /// channel.
    fn resolve(
        description: Option<&ImageJDescription>,
        pages: usize,
    ) -> Result<Self, TiffCodecError> {
        let Some(description) = description else {
            return Ok(Self {
                channels: 1,
                slices: pages,
            });
        };

        let frames = description.frames.unwrap_or(1);
        if frames > 1 {
            return Err(TiffCodecError::Layout(format!(
                "time series with {frames} frames are not supported"
            )));
        }
        let channels = description.channels.unwrap_or(1);
        if channels == 0 {
            return Err(TiffCodecError::Layout("zero channels".to_owned()));
        }
        let slices = description.slices.unwrap_or(pages / channels);
        if channels * slices != pages {
            return Err(TiffCodecError::Layout(format!(
                "{channels} channels x {slices} slices does not match {pages} pages"
            )));
        }
        Ok(Self { channels, slices })
    }
}

/// Decode an ImageJ hyperstack (or plain multi-page grayscale TIFF).
///
/// Pages are taken in channel-fastest order (`c0z0, c1z0, c0z1, ...`),
/// as ImageJ writes them. All pages must be 8- or 16-bit grayscale. A
/// display range in the description is applied to every plane; per-channel
/// ranges and LUTs from the ImageJ metadata tags take precedence when
/// they cover every channel.
///
/// # Errors
///
/// Returns [`TiffCodecError::Tiff`] if the bytes are not a readable TIFF,
/// [`TiffCodecError::UnsupportedLayout`] for non-gray or non-8/16-bit
/// pages, [`TiffCodecError::Layout`] if the description's geometry does
/// not fit the pages, and [`TiffCodecError::Pipeline`] if pages differ in
/// size or depth.
pub fn decode_hyperstack(bytes: &[u8]) -> Result<MultichannelImage, TiffCodecError> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?.with_limits(Limits::unlimited());

    let description = match decoder.find_tag(Tag::ImageDescription)? {
        Some(value) => ImageJDescription::parse(&value.into_string()?),
        None => None,
    };
    let metadata = match ByteOrder::of_file(bytes) {
        Some(order) => read_metadata(&mut decoder, order)?,
        None => None,
    }
    .unwrap_or_default();

    let mut pages = Vec::new();
    loop {
        pages.push(read_page(&mut decoder)?);
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    let geometry = Geometry::resolve(description.as_ref(), pages.len())?;
    log::debug!(
        "decoded {} pages as {} channels x {} slices",
        pages.len(),
        geometry.channels,
        geometry.slices,
    );

    if let Some(range) = description.as_ref().and_then(ImageJDescription::display_range) {
        pages = pages
            .into_iter()
            .map(|plane| plane.with_display_range(range))
            .collect();
    }

    let mut channels: Vec<Vec<Plane>> = vec![Vec::with_capacity(geometry.slices); geometry.channels];
    for (index, plane) in pages.into_iter().enumerate() {
        channels[index % geometry.channels].push(plane);
    }
    let covers = |len: usize| len == geometry.channels;
    let stacks = channels
        .into_iter()
        .enumerate()
        .map(|(channel, planes)| {
            let range = metadata.ranges.get(channel).filter(|_| covers(metadata.ranges.len()));
            let lut = metadata.luts.get(channel).filter(|_| covers(metadata.luts.len()));
            let planes = planes
                .into_iter()
                .map(|plane| {
                    let plane = match range {
                        Some(&range) => plane.with_display_range(range),
                        None => plane,
                    };
                    match lut {
                        Some(&lut) => plane.with_lut(lut),
                        None => plane,
                    }
                })
                .collect();
            ImageStack::new(channel, planes)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MultichannelImage::new(stacks)?)
}

/// Per-channel metadata of the first page, if present and well formed.
fn read_metadata<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    order: ByteOrder,
) -> Result<Option<ChannelMetadata>, TiffCodecError> {
    let Some(counts) = decoder.find_tag(Tag::Unknown(META_DATA_BYTE_COUNTS))? else {
        return Ok(None);
    };
    let Some(data) = decoder.find_tag(Tag::Unknown(META_DATA))? else {
        return Ok(None);
    };
    let parsed = ChannelMetadata::decode(&counts.into_u32_vec()?, &data.into_u8_vec()?, order);
    if parsed.is_none() {
        log::debug!("ignoring malformed ImageJ metadata");
    }
    Ok(parsed)
}

/// Read the decoder's current page as a plane.
fn read_page<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Plane, TiffCodecError> {
    let (width, height) = decoder.dimensions()?;
    let depth = match decoder.colortype()? {
        ColorType::Gray(8) => BitDepth::Eight,
        ColorType::Gray(16) => BitDepth::Sixteen,
        other => {
            return Err(TiffCodecError::UnsupportedLayout(format!(
                "{other:?} pages; expected 8- or 16-bit grayscale"
            )));
        }
    };
    let samples: Vec<u16> = match decoder.read_image()? {
        DecodingResult::U8(data) => data.into_iter().map(u16::from).collect(),
        DecodingResult::U16(data) => data,
        _ => {
            return Err(TiffCodecError::UnsupportedLayout(
                "non-integer sample format".to_owned(),
            ));
        }
    };
    let image = Gray16Image::from_raw(width, height, samples).ok_or_else(|| {
        TiffCodecError::Layout(format!("page holds fewer than {width}x{height} samples"))
    })?;
    Ok(Plane::new(image, depth))
}
