//! TIFF encoding of planes, composites and multichannel images.
//!
//! Every encoder returns the complete file as bytes; writing them to disk
//! is the caller's concern.

use std::io::{Cursor, Seek, Write};

use mipmerge_pipeline::{BitDepth, Composite, CompositeImage, MultichannelImage, Plane};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;

use crate::TiffCodecError;
use crate::description::ImageJDescription;
use crate::metadata::{ByteOrder, ChannelMetadata, META_DATA, META_DATA_BYTE_COUNTS};

/// Tags written on the first page only.
struct FirstPage<'a> {
    description: &'a str,
    metadata: Option<&'a ChannelMetadata>,
}

/// Encode one plane as a single-page TIFF at its own bit depth.
///
/// The ImageJ description records the plane's display range.
///
/// # Errors
///
/// Returns [`TiffCodecError::Tiff`] if encoding fails (for example for a
/// zero-sized plane).
pub fn encode_plane(plane: &Plane) -> Result<Vec<u8>, TiffCodecError> {
    let description = ImageJDescription::for_plane(plane.display_range()).to_string();
    encode_pages(&[plane], &description, None)
}

/// Encode a composite.
///
/// A multi-channel composite becomes an ImageJ composite hyperstack with
/// one page per occupied slot. Each channel's display range and palette
/// color go in the ImageJ metadata tags; the first channel's range is
/// also in the description. A flattened composite becomes an 8-bit RGB
/// TIFF.
///
/// # Errors
///
/// Returns [`TiffCodecError::Tiff`] if encoding fails.
pub fn encode_composite(composite: &Composite) -> Result<Vec<u8>, TiffCodecError> {
    match composite {
        Composite::MultiChannel(image) => encode_composite_channels(image),
        Composite::Rgb(rgb) => {
            let mut bytes = Vec::new();
            let mut encoder = TiffEncoder::new(Cursor::new(&mut bytes))?;
            write_page::<colortype::RGB8, _>(
                &mut encoder,
                rgb.width(),
                rgb.height(),
                rgb.as_raw(),
                None,
            )?;
            drop(encoder);
            Ok(bytes)
        }
    }
}

fn encode_composite_channels(image: &CompositeImage) -> Result<Vec<u8>, TiffCodecError> {
    let planes: Vec<&Plane> = image.channels().iter().map(|c| &c.plane).collect();
    let mut description = ImageJDescription::for_hyperstack(planes.len(), 1);
    if let Some(first) = planes.first() {
        description = description.with_range(first.display_range());
    }
    let metadata = ChannelMetadata {
        ranges: planes.iter().map(|plane| plane.display_range()).collect(),
        luts: image.channels().iter().map(|c| c.slot.lut()).collect(),
    };
    encode_pages(&planes, &description.to_string(), Some(&metadata))
}

/// Encode a multichannel image as an ImageJ hyperstack in channel-fastest
/// page order, with each channel's first-plane display range and LUT in
/// the metadata tags.
///
/// # Errors
///
/// Returns [`TiffCodecError::Layout`] if the image has no channels or its
/// channels hold different numbers of slices, and
/// [`TiffCodecError::Tiff`] if encoding fails.
pub fn encode_multichannel(image: &MultichannelImage) -> Result<Vec<u8>, TiffCodecError> {
    let channels = image.channels();
    let Some(first) = channels.first() else {
        return Err(TiffCodecError::Layout("image has no channels".to_owned()));
    };
    let slices = first.len();
    if let Some(odd) = channels.iter().find(|stack| stack.len() != slices) {
        return Err(TiffCodecError::Layout(format!(
            "channel {} has {} slices, expected {slices}",
            odd.channel(),
            odd.len(),
        )));
    }

    let pages: Vec<&Plane> = (0..slices)
        .flat_map(|z| channels.iter().map(move |stack| &stack.planes()[z]))
        .collect();
    let description = ImageJDescription::for_hyperstack(channels.len(), slices);
    let metadata = ChannelMetadata {
        ranges: channels.iter().map(|s| s.first().display_range()).collect(),
        luts: channels.iter().map(|s| s.first().lut()).collect(),
    };
    encode_pages(&pages, &description.to_string(), Some(&metadata))
}

/// Encode grayscale planes as consecutive pages, with `description` and
/// `metadata` on the first page.
fn encode_pages(
    planes: &[&Plane],
    description: &str,
    metadata: Option<&ChannelMetadata>,
) -> Result<Vec<u8>, TiffCodecError> {
    let mut bytes = Vec::new();
    let mut encoder = TiffEncoder::new(Cursor::new(&mut bytes))?;
    let first = FirstPage {
        description,
        metadata,
    };
    for (index, plane) in planes.iter().enumerate() {
        let text = (index == 0).then_some(&first);
        let (width, height) = (plane.width(), plane.height());
        match plane.depth() {
            BitDepth::Eight => {
                let narrow: Vec<u8> = plane
                    .samples()
                    .iter()
                    .map(|&v| u8::try_from(v).unwrap_or(u8::MAX))
                    .collect();
                write_page::<colortype::Gray8, _>(&mut encoder, width, height, &narrow, text)?;
            }
            BitDepth::Sixteen => {
                write_page::<colortype::Gray16, _>(
                    &mut encoder,
                    width,
                    height,
                    plane.samples(),
                    text,
                )?;
            }
        }
    }
    drop(encoder);
    Ok(bytes)
}

/// Append one page of color type `C`.
fn write_page<C, W>(
    encoder: &mut TiffEncoder<W>,
    width: u32,
    height: u32,
    data: &[C::Inner],
    first: Option<&FirstPage<'_>>,
) -> Result<(), TiffCodecError>
where
    C: ColorType,
    W: Write + Seek,
    [C::Inner]: TiffValue,
{
    let mut image = encoder.new_image::<C>(width, height)?;
    if let Some(first) = first {
        let directory = image.encoder();
        directory.write_tag(Tag::ImageDescription, first.description)?;
        if let Some(metadata) = first.metadata.filter(|m| !m.is_empty()) {
            let (counts, data) = metadata.encode(ByteOrder::native());
            directory.write_tag(Tag::Unknown(META_DATA_BYTE_COUNTS), counts.as_slice())?;
            directory.write_tag(Tag::Unknown(META_DATA), data.as_slice())?;
        }
    }
    image.write_data(data)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decode::decode_hyperstack;
    use mipmerge_pipeline::composite::composite;
    use mipmerge_pipeline::{CompositeMode, DisplayRange, ImageStack, Lut};

    fn ramp(width: u32, height: u32, depth: BitDepth, offset: u32) -> Plane {
        Plane::from_fn(width, height, depth, |x, y| {
            u16::try_from((x * 7 + y * 131 + offset) % 250).unwrap()
        })
    }

    /// Pages written with no description at all.
    fn bare_pages(planes: &[Plane]) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut encoder = TiffEncoder::new(Cursor::new(&mut bytes)).unwrap();
        for plane in planes {
            write_page::<colortype::Gray16, _>(
                &mut encoder,
                plane.width(),
                plane.height(),
                plane.samples(),
                None,
            )
            .unwrap();
        }
        drop(encoder);
        bytes
    }

    #[test]
    fn plane_keeps_depth_samples_and_range() {
        for depth in [BitDepth::Eight, BitDepth::Sixteen] {
            let plane = ramp(9, 5, depth, 3).with_display_range(DisplayRange::new(10, 200));
            let decoded = decode_hyperstack(&encode_plane(&plane).unwrap()).unwrap();

            assert_eq!(decoded.channel_count(), 1);
            let read = decoded.channels()[0].first();
            assert_eq!(read.depth(), depth);
            assert_eq!(read.samples(), plane.samples());
            assert_eq!(read.display_range(), DisplayRange::new(10, 200));
        }
    }

    #[test]
    fn multichannel_round_trips_in_channel_order() {
        let stack = |channel: usize, offsets: &[u32]| {
            ImageStack::new(
                channel,
                offsets
                    .iter()
                    .map(|&o| ramp(6, 4, BitDepth::Sixteen, o))
                    .collect(),
            )
            .unwrap()
        };
        let image =
            MultichannelImage::new(vec![stack(0, &[0, 1, 2]), stack(1, &[100, 101, 102])]).unwrap();

        let decoded = decode_hyperstack(&encode_multichannel(&image).unwrap()).unwrap();
        assert_eq!(decoded.channel_count(), 2);
        for (read, written) in decoded.channels().iter().zip(image.channels()) {
            assert_eq!(read.channel(), written.channel());
            assert_eq!(read.len(), 3);
            for (a, b) in read.planes().iter().zip(written.planes()) {
                assert_eq!(a.samples(), b.samples());
            }
        }
    }

    #[test]
    fn multichannel_keeps_per_channel_range_and_lut() {
        let red = ramp(5, 4, BitDepth::Eight, 0)
            .with_lut(Lut::Red)
            .with_display_range(DisplayRange::new(10, 90));
        let gray = ramp(5, 4, BitDepth::Eight, 7).with_display_range(DisplayRange::new(0, 250));
        let image = MultichannelImage::new(vec![
            ImageStack::single(0, red),
            ImageStack::single(1, gray),
        ])
        .unwrap();

        let decoded = decode_hyperstack(&encode_multichannel(&image).unwrap()).unwrap();
        let first = decoded.channels()[0].first();
        let second = decoded.channels()[1].first();
        assert_eq!(first.lut(), Lut::Red);
        assert_eq!(first.display_range(), DisplayRange::new(10, 90));
        assert_eq!(second.lut(), Lut::Grays);
        assert_eq!(second.display_range(), DisplayRange::new(0, 250));
    }

    #[test]
    fn ragged_channels_rejected() {
        let image = MultichannelImage::new(vec![
            ImageStack::new(0, vec![ramp(2, 2, BitDepth::Eight, 0); 2]).unwrap(),
            ImageStack::single(1, ramp(2, 2, BitDepth::Eight, 0)),
        ])
        .unwrap();
        assert!(matches!(
            encode_multichannel(&image),
            Err(TiffCodecError::Layout(_))
        ));
    }

    #[test]
    fn pages_without_description_form_one_channel() {
        let planes = vec![
            ramp(5, 5, BitDepth::Sixteen, 0),
            ramp(5, 5, BitDepth::Sixteen, 9),
        ];
        let decoded = decode_hyperstack(&bare_pages(&planes)).unwrap();
        assert_eq!(decoded.channel_count(), 1);
        assert_eq!(decoded.channels()[0].len(), 2);
    }

    #[test]
    fn pages_of_different_size_rejected() {
        let planes = vec![
            ramp(5, 5, BitDepth::Sixteen, 0),
            ramp(4, 5, BitDepth::Sixteen, 0),
        ];
        assert!(matches!(
            decode_hyperstack(&bare_pages(&planes)),
            Err(TiffCodecError::Pipeline(_))
        ));
    }

    #[test]
    fn multichannel_composite_is_a_two_channel_hyperstack() {
        let phase = ramp(8, 3, BitDepth::Sixteen, 0);
        let fluorescence =
            ramp(8, 3, BitDepth::Sixteen, 50).with_display_range(DisplayRange::new(1, 2));
        let merged = composite(&phase, &fluorescence, CompositeMode::MultiChannel).unwrap();

        let decoded = decode_hyperstack(&encode_composite(&merged).unwrap()).unwrap();
        assert_eq!(decoded.channel_count(), 2);
        assert_eq!(decoded.channels()[0].first().samples(), phase.samples());
        assert_eq!(decoded.channels()[1].first().samples(), fluorescence.samples());

        let cyan = decoded.channels()[0].first();
        let magenta = decoded.channels()[1].first();
        assert_eq!(cyan.lut(), Lut::Cyan);
        assert_eq!(magenta.lut(), Lut::Magenta);
        assert_eq!(cyan.display_range(), phase.display_range());
        assert_eq!(magenta.display_range(), DisplayRange::new(1, 2));
    }

    #[test]
    fn rgb_composite_is_not_a_hyperstack() {
        let plane = ramp(4, 4, BitDepth::Eight, 0);
        let merged = composite(&plane, &plane, CompositeMode::Rgb).unwrap();
        let bytes = encode_composite(&merged).unwrap();
        assert!(matches!(
            decode_hyperstack(&bytes),
            Err(TiffCodecError::UnsupportedLayout(_))
        ));
    }
}
