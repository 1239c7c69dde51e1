//! Pattern dictionary decoding (6.7) and its segment (7.4.4).
//!
//! All patterns of a dictionary are coded as one wide collective bitmap,
//! which is then cut into GRAYMAX + 1 sub-bitmaps of HDPW × HDPH pixels.

use crate::arithmetic::{ArithmeticDecoder, DecoderStats};
use crate::bitmap::Bitmap;
use crate::decode::{AtPixel, AtPixels, GenericTemplate, generic};
use crate::error::{ParseError, RegionError, Result};
use crate::mmr::MmrDecoder;
use crate::reader::Reader;

/// A decoded pattern dictionary.
#[derive(Debug, Clone)]
pub(crate) struct PatternDictionary {
    /// `HDPATS` - one bitmap per gray value, each HDPW × HDPH.
    pub(crate) patterns: Vec<Bitmap>,
    pub(crate) pattern_width: u8,
    pub(crate) pattern_height: u8,
}

/// Decode a pattern dictionary segment (6.7.5).
pub(crate) fn decode(reader: &mut Reader<'_>) -> Result<PatternDictionary> {
    // 7.4.4.1.1: Pattern dictionary flags.
    let flags = reader.read_byte().ok_or(ParseError::UnexpectedEof)?;
    let mmr = flags & 0x01 != 0;
    let template = GenericTemplate::from_bits(flags >> 1);

    // 7.4.4.1.2 / 7.4.4.1.3: HDPW and HDPH must be at least one.
    let pattern_width = reader
        .read_nonzero_byte()
        .ok_or(RegionError::InvalidDimension)?;
    let pattern_height = reader
        .read_nonzero_byte()
        .ok_or(RegionError::InvalidDimension)?;

    // 7.4.4.1.4: GRAYMAX.
    let gray_max = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;

    let num_patterns = gray_max.checked_add(1).ok_or(RegionError::InvalidDimension)?;

    // "1) Create a bitmap B_HDC. The height of this bitmap is HDPH. The
    // width of the bitmap is (GRAYMAX + 1) × HDPW." (6.7.5)
    let collective_width = num_patterns
        .checked_mul(pattern_width as u32)
        .filter(|&w| w as u64 * pattern_height as u64 <= 1 << 31)
        .ok_or(RegionError::InvalidDimension)?;

    let data = reader.tail().ok_or(ParseError::UnexpectedEof)?;

    // "2) Decode the collective bitmap using a generic region decoding
    // procedure." (6.7.5)
    let collective = if mmr {
        let (bitmap, _) =
            MmrDecoder::new(data, collective_width, pattern_height as u32).uncompress()?;
        bitmap
    } else {
        let mut decoder = ArithmeticDecoder::new(data);
        let mut cx = DecoderStats::new(template.context_size());
        let params = generic::GenericParams {
            width: collective_width,
            height: pattern_height as u32,
            template,
            use_ext_templates: false,
            tpgdon: false,
            at: pattern_at_pixels(template, pattern_width),
        };
        generic::decode_bitmap(&mut decoder, &mut cx, &params)?
    };

    // "4) While GRAY ≤ GRAYMAX: let the subimage of B_HDC consisting of HDPH
    // rows and columns HDPW × GRAY through HDPW × (GRAY + 1) − 1 be denoted
    // B_P." (6.7.5)
    let mut patterns = Vec::with_capacity(num_patterns as usize);
    for gray in 0..num_patterns {
        let x = gray * pattern_width as u32;
        patterns.push(collective.extract(x, 0, pattern_width as u32, pattern_height as u32));
    }

    Ok(PatternDictionary {
        patterns,
        pattern_width,
        pattern_height,
    })
}

/// The fixed AT pixel convention of pattern dictionaries (6.7.5, Table 22):
/// AT1 is (-HDPW, 0), the remaining template 0 pixels keep their nominal
/// places.
fn pattern_at_pixels(template: GenericTemplate, pattern_width: u8) -> AtPixels {
    let at1 = AtPixel {
        x: (-(pattern_width.min(128) as i16)) as i8,
        y: 0,
    };

    let mut at = AtPixels::new();
    at.push(at1);

    if template == GenericTemplate::Template0 {
        at.push(AtPixel { x: -3, y: -1 });
        at.push(AtPixel { x: 2, y: -2 });
        at.push(AtPixel { x: -2, y: -2 });
    }

    at
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_extraction_splits_the_collective_bitmap() {
        // Four 4x4 patterns concatenated into one 16x4 bitmap: pattern g has
        // its g-th column set.
        let mut collective = Bitmap::new(16, 4);
        for gray in 0..4_u32 {
            for y in 0..4 {
                collective.set_pixel(gray * 4 + gray, y, 1);
            }
        }

        let mut patterns = Vec::new();
        for gray in 0..4_u32 {
            patterns.push(collective.extract(gray * 4, 0, 4, 4));
        }

        for (gray, pattern) in patterns.iter().enumerate() {
            assert_eq!(pattern.width(), 4);
            assert_eq!(pattern.height(), 4);
            for y in 0..4 {
                for x in 0..4_u32 {
                    let expected = u8::from(x as usize == gray);
                    assert_eq!(pattern.get_pixel(x, y), expected);
                }
            }
        }

        // Re-concatenating the patterns yields the collective bitmap.
        let mut rebuilt = Bitmap::new(16, 4);
        for (gray, pattern) in patterns.iter().enumerate() {
            crate::blit::blit(
                pattern,
                &mut rebuilt,
                gray as i32 * 4,
                0,
                crate::bitmap::CombinationOperator::Or,
            );
        }
        assert_eq!(rebuilt, collective);
    }
}
