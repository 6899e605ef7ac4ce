//! ImageJ `IJMetaData` tags: per-channel display ranges and LUTs.
//!
//! ImageJ keeps what does not fit in the description in two private tags
//! on the first page. [`META_DATA_BYTE_COUNTS`] lists entry sizes, the
//! first being a header of `IJIJ` followed by `(type, count)` pairs.
//! [`META_DATA`] holds the header and the entries back to back. Integers
//! and doubles use the file's byte order.
//!
//! ```text
//! counts: [header, rang, luts_0, luts_1, ...]
//! data:   IJIJ | rang 1 | luts n | min_0 max_0 min_1 max_1 ... | r[256] g[256] b[256] | ...
//! ```

use mipmerge_pipeline::{DisplayRange, Lut};

use crate::description::range_from_f64;

/// Tag holding the byte count of each metadata entry.
pub const META_DATA_BYTE_COUNTS: u16 = 50838;
/// Tag holding the metadata bytes.
pub const META_DATA: u16 = 50839;

const MAGIC: u32 = 0x494a_494a; // "IJIJ"
const RANGES: u32 = 0x7261_6e67; // "rang"
const LUTS: u32 = 0x6c75_7473; // "luts"
const LUT_LEN: usize = 768;

/// Byte order of the integers and doubles inside the metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// `II` files.
    Little,
    /// `MM` files.
    Big,
}

impl ByteOrder {
    /// Order used by the encoder, which writes native-endian files.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::Little
        } else {
            Self::Big
        }
    }

    /// Order declared by a TIFF header.
    #[must_use]
    pub fn of_file(bytes: &[u8]) -> Option<Self> {
        match bytes.get(..2)? {
            b"II" => Some(Self::Little),
            b"MM" => Some(Self::Big),
            _ => None,
        }
    }

    const fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }

    const fn f64_bytes(self, value: f64) -> [u8; 8] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }

    fn read_u32(self, bytes: &[u8]) -> Option<u32> {
        let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        Some(match self {
            Self::Little => u32::from_le_bytes(raw),
            Self::Big => u32::from_be_bytes(raw),
        })
    }

    fn read_f64(self, bytes: &[u8]) -> Option<f64> {
        let raw: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
        Some(match self {
            Self::Little => f64::from_le_bytes(raw),
            Self::Big => f64::from_be_bytes(raw),
        })
    }
}

/// Display range and LUT of every channel, in channel order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMetadata {
    /// One range per channel, or empty.
    pub ranges: Vec<DisplayRange>,
    /// One LUT per channel, or empty.
    pub luts: Vec<Lut>,
}

impl ChannelMetadata {
    /// Whether there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() && self.luts.is_empty()
    }

    /// Entry byte counts and data bytes for the two metadata tags.
    #[must_use]
    pub fn encode(&self, order: ByteOrder) -> (Vec<u32>, Vec<u8>) {
        let mut kinds = Vec::new();
        if !self.ranges.is_empty() {
            kinds.push((RANGES, 1));
        }
        if !self.luts.is_empty() {
            kinds.push((LUTS, self.luts.len()));
        }

        let mut data = Vec::new();
        data.extend(order.u32_bytes(MAGIC));
        for (kind, count) in kinds {
            data.extend(order.u32_bytes(kind));
            data.extend(order.u32_bytes(len_u32(count)));
        }
        let mut counts = vec![len_u32(data.len())];

        if !self.ranges.is_empty() {
            let start = data.len();
            for range in &self.ranges {
                data.extend(order.f64_bytes(f64::from(range.min)));
                data.extend(order.f64_bytes(f64::from(range.max)));
            }
            counts.push(len_u32(data.len() - start));
        }
        for &lut in &self.luts {
            data.extend(lut_bytes(lut));
            counts.push(len_u32(LUT_LEN));
        }
        (counts, data)
    }

    /// Parse the two metadata tags.
    ///
    /// Returns `None` for a missing magic number or entries that run past
    /// the data. Entry types other than ranges and LUTs are skipped.
    #[must_use]
    pub fn decode(counts: &[u32], data: &[u8], order: ByteOrder) -> Option<Self> {
        let (&header_len, entry_lens) = counts.split_first()?;
        let header = data.get(..usize::try_from(header_len).ok()?)?;
        if order.read_u32(header)? != MAGIC {
            return None;
        }

        let mut metadata = Self::default();
        let mut lens = entry_lens.iter();
        let mut offset = header.len();
        for pair in header.get(4..)?.chunks_exact(8) {
            let kind = order.read_u32(pair)?;
            let count = order.read_u32(pair.get(4..)?)?;
            for _ in 0..count {
                let len = usize::try_from(*lens.next()?).ok()?;
                let entry = data.get(offset..offset.checked_add(len)?)?;
                offset += len;
                match kind {
                    RANGES => {
                        let ranges: Option<Vec<DisplayRange>> = entry
                            .chunks_exact(16)
                            .map(|bounds| {
                                range_from_f64(
                                    order.read_f64(bounds)?,
                                    order.read_f64(bounds.get(8..)?)?,
                                )
                            })
                            .collect();
                        if let Some(ranges) = ranges {
                            metadata.ranges = ranges;
                        }
                    }
                    LUTS => metadata.luts.push(lut_from_bytes(entry)),
                    _ => {}
                }
            }
        }
        Some(metadata)
    }
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// ImageJ LUT layout: 256 reds, 256 greens, 256 blues, each a linear ramp
/// from black to the LUT's color.
fn lut_bytes(lut: Lut) -> Vec<u8> {
    lut.rgb()
        .into_iter()
        .flat_map(|component| {
            (0..=255_u16)
                .map(move |i| u8::try_from(u16::from(component) * i / 255).unwrap_or(u8::MAX))
        })
        .collect()
}

/// The named LUT whose ramp matches `bytes`. Other tables read as grays.
fn lut_from_bytes(bytes: &[u8]) -> Lut {
    Lut::ALL
        .into_iter()
        .find(|&lut| lut_bytes(lut) == bytes)
        .unwrap_or_else(|| {
            log::debug!("unrecognised {}-byte LUT read as grays", bytes.len());
            Lut::Grays
        })
}
