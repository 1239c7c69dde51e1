//! Halftone region decoding (6.6) and its segment (7.4.5).
//!
//! A halftone region is a grid of gray-scale values, each selecting a
//! pattern from a referred pattern dictionary; the patterns are drawn into
//! the region along a (possibly skewed) grid.

use crate::bitmap::{Bitmap, CombinationOperator};
use crate::blit::blit;
use crate::decode::pattern::PatternDictionary;
use crate::decode::{GenericTemplate, RegionBitmap, parse_region_segment_info};
use crate::error::{DecodeError, ParseError, RegionError, Result, bail};
use crate::gray_scale::{GrayScaleParams, decode_gray_scale_image};
use crate::reader::Reader;

/// Parsed halftone region segment header (7.4.5.1).
struct HalftoneHeader {
    mmr: bool,
    template: GenericTemplate,
    enable_skip: bool,
    combination_operator: CombinationOperator,
    default_pixel: bool,
    /// `HGW`, `HGH` - the gray-scale grid size.
    grid_width: u32,
    grid_height: u32,
    /// `HGX`, `HGY` - the grid offset.
    grid_x: i32,
    grid_y: i32,
    /// `HRX`, `HRY` - 256 times the grid vector.
    vector_x: u16,
    vector_y: u16,
}

/// Decode a halftone region segment (6.6.5).
pub(crate) fn decode(
    reader: &mut Reader<'_>,
    pattern_dict: &PatternDictionary,
) -> Result<RegionBitmap> {
    let info = parse_region_segment_info(reader)?;

    let flags = reader.read_byte().ok_or(ParseError::UnexpectedEof)?;
    let header = HalftoneHeader {
        mmr: flags & 0x01 != 0,
        template: GenericTemplate::from_bits(flags >> 1),
        enable_skip: flags & 0x08 != 0,
        combination_operator: CombinationOperator::from_value((flags >> 4) & 0x07)?,
        default_pixel: flags & 0x80 != 0,
        grid_width: reader.read_u32().ok_or(ParseError::UnexpectedEof)?,
        grid_height: reader.read_u32().ok_or(ParseError::UnexpectedEof)?,
        grid_x: reader.read_i32().ok_or(ParseError::UnexpectedEof)?,
        grid_y: reader.read_i32().ok_or(ParseError::UnexpectedEof)?,
        vector_x: reader.read_u16().ok_or(ParseError::UnexpectedEof)?,
        vector_y: reader.read_u16().ok_or(ParseError::UnexpectedEof)?,
    };

    if header.grid_width as u64 * header.grid_height as u64 > 1 << 28 {
        bail!(RegionError::InvalidDimension);
    }

    let mut region = Bitmap::new(info.width, info.height);
    if header.default_pixel {
        region.set_default_pixel();
    }

    // "1) If HENABLESKIP is 1, compute the bitmap HSKIP as described in
    // 6.6.5.1." (6.6.5)
    let skip = if header.enable_skip {
        Some(compute_skip_bitmap(&header, pattern_dict, &region)?)
    } else {
        None
    };

    // "3) Set HBPP to ⌈log2(HNUMPATS)⌉." (6.6.5)
    let bits_per_pixel = (pattern_dict.patterns.len() as u32)
        .saturating_sub(1)
        .checked_ilog2()
        .map_or(1, |n| n + 1);

    let data = reader.tail().ok_or(ParseError::UnexpectedEof)?;

    // "4) Decode an image GI of size HGW by HGH with HBPP bits per pixel
    // using the gray-scale image decoding procedure of Annex C." (6.6.5)
    let gray_params = GrayScaleParams {
        use_mmr: header.mmr,
        bits_per_pixel,
        width: header.grid_width,
        height: header.grid_height,
        template: header.template,
        skip: skip.as_ref(),
    };
    let gray_image = decode_gray_scale_image(data, &gray_params)?;

    // "5) Place sequentially the patterns corresponding to the values in GI
    // into HTREG." (6.6.5)
    render_patterns(&mut region, &gray_image, &header, pattern_dict)?;

    Ok(RegionBitmap {
        bitmap: region,
        info,
    })
}

/// The grid coordinates of cell (m, n) (6.6.5.1, 6.6.5.2):
///
///   x = (HGX + m × HRY + n × HRX) >> 8
///   y = (HGY + m × HRX − n × HRY) >> 8
fn grid_coords(header: &HalftoneHeader, m: u32, n: u32) -> Result<(i32, i32)> {
    let hrx = header.vector_x as i32;
    let hry = header.vector_y as i32;
    let m = m as i32;
    let n = n as i32;

    let x = m
        .checked_mul(hry)
        .and_then(|v| v.checked_add(n.checked_mul(hrx)?))
        .and_then(|v| v.checked_add(header.grid_x))
        .ok_or(DecodeError::Overflow)?
        >> 8;

    let y = m
        .checked_mul(hrx)
        .and_then(|v| v.checked_sub(n.checked_mul(hry)?))
        .and_then(|v| v.checked_add(header.grid_y))
        .ok_or(DecodeError::Overflow)?
        >> 8;

    Ok((x, y))
}

/// Compute the HSKIP bitmap: grid cells whose pattern falls entirely outside
/// the region are never coded (6.6.5.1).
fn compute_skip_bitmap(
    header: &HalftoneHeader,
    pattern_dict: &PatternDictionary,
    region: &Bitmap,
) -> Result<Bitmap> {
    let pattern_width = pattern_dict.pattern_width as i32;
    let pattern_height = pattern_dict.pattern_height as i32;
    let region_width = region.width() as i32;
    let region_height = region.height() as i32;

    let mut skip = Bitmap::new(header.grid_width, header.grid_height);

    for m in 0..header.grid_height {
        for n in 0..header.grid_width {
            let (x, y) = grid_coords(header, m, n)?;

            // "If ((x + HPW ≤ 0) OR (x ≥ HBW) OR (y + HPH ≤ 0) OR
            // (y ≥ HBH)) then set: HSKIP[n, m] = 1" (6.6.5.1)
            let out = (x + pattern_width <= 0)
                || (x >= region_width)
                || (y + pattern_height <= 0)
                || (y >= region_height);
            if out {
                skip.set_pixel(n, m, 1);
            }
        }
    }

    Ok(skip)
}

/// Draw the selected pattern of every grid cell (6.6.5.2).
fn render_patterns(
    region: &mut Bitmap,
    gray_image: &[u32],
    header: &HalftoneHeader,
    pattern_dict: &PatternDictionary,
) -> Result<()> {
    for m in 0..header.grid_height {
        for n in 0..header.grid_width {
            let (x, y) = grid_coords(header, m, n)?;

            // "Draw the pattern HPATS[GI[n, m]] into HTREG such that its
            // upper left pixel is at location (x, y)." (6.6.5.2)
            let gray = gray_image[(m * header.grid_width + n) as usize] as usize;
            let pattern = pattern_dict
                .patterns
                .get(gray)
                .ok_or(RegionError::InvalidDimension)?;

            blit(pattern, region, x, y, header.combination_operator);
        }
    }

    Ok(())
}
