//! Generic region decoding (6.2) and the generic region segment (7.4.6).
//!
//! The arithmetic path walks each scan line eight pixels at a time: two
//! shift registers slide along the two rows above the current one, the
//! template context is updated incrementally per pixel, and the finished
//! byte is stored whole. Template neighbours moved away from their nominal
//! positions (AT pixels) are patched into the context per pixel.

use crate::arithmetic::{ArithmeticDecoder, DecoderStats};
use crate::bitmap::Bitmap;
use crate::decode::{
    AtPixel, AtPixels, GenericTemplate, RegionBitmap, parse_at_pixels, parse_region_segment_info,
};
use crate::error::{ParseError, RegionError, Result, bail};
use crate::mmr::MmrDecoder;
use crate::reader::Reader;

/// Parameters of one generic bitmap decoding (Table 2).
#[derive(Debug, Clone)]
pub(crate) struct GenericParams {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) template: GenericTemplate,
    pub(crate) use_ext_templates: bool,
    pub(crate) tpgdon: bool,
    pub(crate) at: AtPixels,
}

/// Decode a generic region segment (7.4.6).
///
/// `had_unknown_length` marks an immediate generic region whose data length
/// was 0xFFFFFFFF; its data then ends with a four-byte row count:
///
/// "In this case, it also indicates the height of the generic region (i.e.
/// the number of rows that have been decoded in this segment); it must be no
/// greater than the region segment bitmap height value." (7.4.6.4)
pub(crate) fn decode(reader: &mut Reader<'_>, had_unknown_length: bool) -> Result<RegionBitmap> {
    let mut info = parse_region_segment_info(reader)?;

    let flags = reader.read_byte().ok_or(ParseError::UnexpectedEof)?;
    let mmr = flags & 0x01 != 0;
    let template = GenericTemplate::from_bits(flags >> 1);
    let tpgdon = flags & 0x08 != 0;
    let use_ext_templates = flags & 0x10 != 0;

    let at = if mmr {
        AtPixels::new()
    } else {
        parse_at_pixels(reader, template.at_pixel_count(use_ext_templates))?
    };

    let mut data = reader.tail().ok_or(ParseError::UnexpectedEof)?;

    if had_unknown_length {
        if data.len() < 4 {
            bail!(ParseError::UnexpectedEof);
        }
        let (head, tail) = data.split_at(data.len() - 4);
        let row_count = u32::from_be_bytes(tail.try_into().unwrap());

        if row_count > info.height {
            bail!(RegionError::InvalidDimension);
        }
        info.height = row_count;
        data = head;
    }

    let bitmap = if mmr {
        let (bitmap, _) = MmrDecoder::new(data, info.width, info.height).uncompress()?;
        bitmap
    } else {
        let mut decoder = ArithmeticDecoder::new(data);
        let mut cx = DecoderStats::new(template.context_size());
        let params = GenericParams {
            width: info.width,
            height: info.height,
            template,
            use_ext_templates,
            tpgdon,
            at,
        };
        decode_bitmap(&mut decoder, &mut cx, &params)?
    };

    Ok(RegionBitmap { bitmap, info })
}

/// Which AT pixels sit away from their nominal template positions.
struct Overrides {
    flags: [bool; 12],
    any: bool,
}

/// Nominal AT pixel positions per template (Figures 3 to 6).
fn nominal_at(template: GenericTemplate, ext: bool) -> &'static [(i8, i8)] {
    match template {
        GenericTemplate::Template0 if ext => &[
            (-2, 0),
            (0, -2),
            (-2, -1),
            (-1, -2),
            (1, -2),
            (2, -1),
            (-3, 0),
            (-4, 0),
            (2, -2),
            (3, -1),
            (-2, -2),
            (-3, -1),
        ],
        GenericTemplate::Template0 => &[(3, -1), (-3, -1), (2, -2), (-2, -2)],
        GenericTemplate::Template1 => &[(3, -1)],
        GenericTemplate::Template2 | GenericTemplate::Template3 => &[(2, -1)],
    }
}

fn compute_overrides(params: &GenericParams) -> Result<Overrides> {
    let nominal = nominal_at(params.template, params.use_ext_templates);
    if params.at.len() != nominal.len() {
        bail!(RegionError::InvalidAtPixel);
    }

    let mut overrides = Overrides {
        flags: [false; 12],
        any: false,
    };

    for (i, (at, &(nx, ny))) in params.at.iter().zip(nominal).enumerate() {
        if at.x != nx || at.y != ny {
            overrides.flags[i] = true;
            overrides.any = true;
        }
    }

    Ok(overrides)
}

/// The generic region decoding procedure with arithmetic coding (6.2.5.7).
pub(crate) fn decode_bitmap(
    decoder: &mut ArithmeticDecoder<'_>,
    cx: &mut DecoderStats,
    params: &GenericParams,
) -> Result<Bitmap> {
    let overrides = compute_overrides(params)?;
    let mut bitmap = Bitmap::new(params.width, params.height);
    let padded_width = (params.width + 7) & !7;

    // "1) Set: LTP = 0" (6.2.5.7)
    let mut ltp = 0_u8;

    for line in 0..params.height {
        // "b) If TPGDON is 1, then decode a bit using the arithmetic entropy
        // coder ... Set: LTP = LTP XOR SLTP" (6.2.5.7)
        if params.tpgdon {
            cx.set_index(sltp_context(params.template));
            ltp ^= decoder.decode_bit(cx);
        }

        if ltp == 1 {
            // "c) If LTP = 1 then set every pixel of the current row of
            // GBREG equal to the corresponding pixel of the row immediately
            // above." (6.2.5.7)
            if line > 0 {
                copy_line_above(&mut bitmap, line);
            }
        } else {
            decode_line(
                &mut bitmap,
                decoder,
                cx,
                params,
                &overrides,
                line,
                padded_width,
            );
        }
    }

    Ok(bitmap)
}

/// The SLTP pseudo-pixel context per template (Figures 8 to 11).
fn sltp_context(template: GenericTemplate) -> usize {
    match template {
        GenericTemplate::Template0 => 0x9B25,
        GenericTemplate::Template1 => 0x0795,
        GenericTemplate::Template2 => 0x00E5,
        GenericTemplate::Template3 => 0x0195,
    }
}

fn copy_line_above(bitmap: &mut Bitmap, line: u32) {
    let stride = bitmap.row_stride();
    let target = line as usize * stride;
    for i in 0..stride {
        let byte = bitmap.get_byte(target - stride + i);
        bitmap.set_byte(target + i, byte);
    }
}

fn decode_line(
    bitmap: &mut Bitmap,
    decoder: &mut ArithmeticDecoder<'_>,
    cx: &mut DecoderStats,
    params: &GenericParams,
    overrides: &Overrides,
    line: u32,
    padded_width: u32,
) {
    match params.template {
        GenericTemplate::Template0 if !params.use_ext_templates => {
            decode_template0(bitmap, decoder, cx, params, overrides, line, padded_width);
        }
        GenericTemplate::Template0 => {
            decode_template0_ext(bitmap, decoder, cx, params, overrides, line, padded_width);
        }
        GenericTemplate::Template1 => {
            decode_template1(bitmap, decoder, cx, params, overrides, line, padded_width);
        }
        GenericTemplate::Template2 => {
            decode_template2(bitmap, decoder, cx, params, overrides, line, padded_width);
        }
        GenericTemplate::Template3 => {
            decode_template3(bitmap, decoder, cx, params, overrides, line, padded_width);
        }
    }
}

/// The value of an AT neighbour during decoding: taken from the byte being
/// assembled when the neighbour lies in it, and from the stored bitmap
/// otherwise.
#[inline(always)]
fn at_pixel_value(bitmap: &Bitmap, x: u32, line: u32, result: u8, minor_x: u32, at: AtPixel) -> u32 {
    if at.y == 0 && at.x as i32 >= -(minor_x as i32) {
        let to_shift = 7 - minor_x as i32;
        (result as u32 >> (to_shift - at.x as i32)) & 1
    } else {
        bitmap.get_pixel_signed(x as i32 + at.x as i32, line as i32 + at.y as i32) as u32
    }
}

/// Patch overridden AT pixels into the context at the given bit positions.
#[inline(always)]
fn apply_overrides(
    bitmap: &Bitmap,
    context: u32,
    x: u32,
    line: u32,
    result: u8,
    minor_x: u32,
    at: &[AtPixel],
    overrides: &Overrides,
    bits: &[u32],
) -> u32 {
    let mut context = context;
    for (i, &bit_pos) in bits.iter().enumerate() {
        if overrides.flags[i] {
            let value = at_pixel_value(bitmap, x, line, result, minor_x, at[i]);
            context = (context & !(1 << bit_pos)) | (value << bit_pos);
        }
    }
    context
}

macro_rules! line_fetch {
    ($bitmap:expr, $line1:ident, $line2:ident, $line:expr, $next_byte:expr, $width:expr,
     $idx:expr, $stride:expr, $shift2:expr) => {
        if $line > 0 {
            $line1 <<= 8;
            if $next_byte < $width {
                $line1 |= $bitmap.get_byte(($idx + 1) as usize) as u32;
            }
        }
        if $line > 1 {
            $line2 <<= 8;
            if $next_byte < $width {
                $line2 |=
                    ($bitmap.get_byte(($idx + 1) as usize - $stride) as u32) << $shift2;
            }
        }
    };
}

fn decode_template0(
    bitmap: &mut Bitmap,
    decoder: &mut ArithmeticDecoder<'_>,
    cx: &mut DecoderStats,
    params: &GenericParams,
    overrides: &Overrides,
    line: u32,
    padded_width: u32,
) {
    /// Context bit positions of AT1 to AT4 (Figure 4).
    const AT_BITS: [u32; 4] = [4, 10, 11, 15];

    let width = params.width;
    let stride = bitmap.row_stride();
    let mut byte_index = bitmap.byte_index(0, line);
    let mut idx = byte_index as i64 - stride as i64;

    let mut line1: u32 = 0;
    let mut line2: u32 = 0;
    if line >= 1 {
        line1 = bitmap.get_byte(idx as usize) as u32;
    }
    if line >= 2 {
        line2 = (bitmap.get_byte(idx as usize - stride) as u32) << 6;
    }
    let mut context = (line1 & 0xF0) | (line2 & 0x3800);

    let mut x = 0;
    while x < padded_width {
        let mut result: u8 = 0;
        let next_byte = x + 8;
        let minor_width = (width - x).min(8);

        line_fetch!(bitmap, line1, line2, line, next_byte, width, idx, stride, 6);

        for minor_x in 0..minor_width {
            let to_shift = 7 - minor_x;

            if overrides.any {
                let overridden = apply_overrides(
                    bitmap,
                    context,
                    x + minor_x,
                    line,
                    result,
                    minor_x,
                    &params.at,
                    overrides,
                    &AT_BITS,
                );
                cx.set_index(overridden as usize);
            } else {
                cx.set_index(context as usize);
            }

            let bit = decoder.decode_bit(cx) as u32;
            result |= (bit as u8) << to_shift;

            context = ((context & 0x7BF7) << 1)
                | bit
                | ((line1 >> to_shift) & 0x10)
                | ((line2 >> to_shift) & 0x800);
        }

        bitmap.set_byte(byte_index, result);
        byte_index += 1;
        idx += 1;
        x = next_byte;
    }
}

fn decode_template0_ext(
    bitmap: &mut Bitmap,
    decoder: &mut ArithmeticDecoder<'_>,
    cx: &mut DecoderStats,
    params: &GenericParams,
    overrides: &Overrides,
    line: u32,
    padded_width: u32,
) {
    /// Context bit positions of AT1 to AT12 of the extended template.
    const AT_BITS: [u32; 12] = [1, 13, 9, 14, 12, 5, 2, 3, 11, 4, 15, 10];

    let width = params.width;
    let stride = bitmap.row_stride();
    let mut byte_index = bitmap.byte_index(0, line);
    let mut idx = byte_index as i64 - stride as i64;

    let mut line1: u32 = 0;
    let mut line2: u32 = 0;
    if line >= 1 {
        line1 = bitmap.get_byte(idx as usize) as u32;
    }
    if line >= 2 {
        line2 = (bitmap.get_byte(idx as usize - stride) as u32) << 6;
    }
    let mut context = (line1 & 0xF0) | (line2 & 0x3800);

    let mut x = 0;
    while x < padded_width {
        let mut result: u8 = 0;
        let next_byte = x + 8;
        let minor_width = (width - x).min(8);

        line_fetch!(bitmap, line1, line2, line, next_byte, width, idx, stride, 6);

        for minor_x in 0..minor_width {
            let to_shift = 7 - minor_x;

            let overridden = apply_overrides(
                bitmap,
                context,
                x + minor_x,
                line,
                result,
                minor_x,
                &params.at,
                overrides,
                &AT_BITS,
            );
            cx.set_index(overridden as usize);

            let bit = decoder.decode_bit(cx) as u32;
            result |= (bit as u8) << to_shift;

            context = ((context & 0x7BF7) << 1)
                | bit
                | ((line1 >> to_shift) & 0x10)
                | ((line2 >> to_shift) & 0x800);
        }

        bitmap.set_byte(byte_index, result);
        byte_index += 1;
        idx += 1;
        x = next_byte;
    }
}

fn decode_template1(
    bitmap: &mut Bitmap,
    decoder: &mut ArithmeticDecoder<'_>,
    cx: &mut DecoderStats,
    params: &GenericParams,
    overrides: &Overrides,
    line: u32,
    padded_width: u32,
) {
    const AT_BITS: [u32; 1] = [3];

    let width = params.width;
    let stride = bitmap.row_stride();
    let mut byte_index = bitmap.byte_index(0, line);
    let mut idx = byte_index as i64 - stride as i64;

    let mut line1: u32 = 0;
    let mut line2: u32 = 0;
    if line >= 1 {
        line1 = bitmap.get_byte(idx as usize) as u32;
    }
    if line >= 2 {
        line2 = (bitmap.get_byte(idx as usize - stride) as u32) << 5;
    }
    let mut context = ((line1 >> 1) & 0x1F8) | ((line2 >> 1) & 0x1E00);

    let mut x = 0;
    while x < padded_width {
        let mut result: u8 = 0;
        let next_byte = x + 8;
        let minor_width = (width - x).min(8);

        line_fetch!(bitmap, line1, line2, line, next_byte, width, idx, stride, 5);

        for minor_x in 0..minor_width {
            if overrides.any {
                let overridden = apply_overrides(
                    bitmap,
                    context,
                    x + minor_x,
                    line,
                    result,
                    minor_x,
                    &params.at,
                    overrides,
                    &AT_BITS,
                );
                cx.set_index(overridden as usize);
            } else {
                cx.set_index(context as usize);
            }

            let bit = decoder.decode_bit(cx) as u32;
            result |= (bit as u8) << (7 - minor_x);

            let to_shift = 8 - minor_x;
            context = ((context & 0x0EFB) << 1)
                | bit
                | ((line1 >> to_shift) & 0x8)
                | ((line2 >> to_shift) & 0x200);
        }

        bitmap.set_byte(byte_index, result);
        byte_index += 1;
        idx += 1;
        x = next_byte;
    }
}

fn decode_template2(
    bitmap: &mut Bitmap,
    decoder: &mut ArithmeticDecoder<'_>,
    cx: &mut DecoderStats,
    params: &GenericParams,
    overrides: &Overrides,
    line: u32,
    padded_width: u32,
) {
    const AT_BITS: [u32; 1] = [2];

    let width = params.width;
    let stride = bitmap.row_stride();
    let mut byte_index = bitmap.byte_index(0, line);
    let mut idx = byte_index as i64 - stride as i64;

    let mut line1: u32 = 0;
    let mut line2: u32 = 0;
    if line >= 1 {
        line1 = bitmap.get_byte(idx as usize) as u32;
    }
    if line >= 2 {
        line2 = (bitmap.get_byte(idx as usize - stride) as u32) << 4;
    }
    let mut context = ((line1 >> 3) & 0x7C) | ((line2 >> 3) & 0x380);

    let mut x = 0;
    while x < padded_width {
        let mut result: u8 = 0;
        let next_byte = x + 8;
        let minor_width = (width - x).min(8);

        line_fetch!(bitmap, line1, line2, line, next_byte, width, idx, stride, 4);

        for minor_x in 0..minor_width {
            let to_shift = 10 - minor_x;

            if overrides.any {
                let overridden = apply_overrides(
                    bitmap,
                    context,
                    x + minor_x,
                    line,
                    result,
                    minor_x,
                    &params.at,
                    overrides,
                    &AT_BITS,
                );
                cx.set_index(overridden as usize);
            } else {
                cx.set_index(context as usize);
            }

            let bit = decoder.decode_bit(cx) as u32;
            result |= (bit as u8) << (7 - minor_x);

            context = ((context & 0x01BD) << 1)
                | bit
                | ((line1 >> to_shift) & 0x4)
                | ((line2 >> to_shift) & 0x80);
        }

        bitmap.set_byte(byte_index, result);
        byte_index += 1;
        idx += 1;
        x = next_byte;
    }
}

fn decode_template3(
    bitmap: &mut Bitmap,
    decoder: &mut ArithmeticDecoder<'_>,
    cx: &mut DecoderStats,
    params: &GenericParams,
    overrides: &Overrides,
    line: u32,
    padded_width: u32,
) {
    const AT_BITS: [u32; 1] = [4];

    let width = params.width;
    let stride = bitmap.row_stride();
    let mut byte_index = bitmap.byte_index(0, line);
    let mut idx = byte_index as i64 - stride as i64;

    let mut line1: u32 = 0;
    if line >= 1 {
        line1 = bitmap.get_byte(idx as usize) as u32;
    }
    let mut context = (line1 >> 1) & 0x70;

    let mut x = 0;
    while x < padded_width {
        let mut result: u8 = 0;
        let next_byte = x + 8;
        let minor_width = (width - x).min(8);

        if line >= 1 {
            line1 <<= 8;
            if next_byte < width {
                line1 |= bitmap.get_byte((idx + 1) as usize) as u32;
            }
        }

        for minor_x in 0..minor_width {
            if overrides.any {
                let overridden = apply_overrides(
                    bitmap,
                    context,
                    x + minor_x,
                    line,
                    result,
                    minor_x,
                    &params.at,
                    overrides,
                    &AT_BITS,
                );
                cx.set_index(overridden as usize);
            } else {
                cx.set_index(context as usize);
            }

            let bit = decoder.decode_bit(cx) as u32;
            result |= (bit as u8) << (7 - minor_x);

            context = ((context & 0x01F7) << 1) | bit | ((line1 >> (8 - minor_x)) & 0x10);
        }

        bitmap.set_byte(byte_index, result);
        byte_index += 1;
        idx += 1;
        x = next_byte;
    }
}

/// Per-pixel context gathering for the same templates, used where the
/// byte-wise walk does not apply (gray-scale bitplanes with skip pixels,
/// Annex C). The bit numbering matches the incremental walk above.
pub(crate) fn pixel_context(
    bitmap: &Bitmap,
    x: u32,
    y: u32,
    template: GenericTemplate,
    at: &[AtPixel],
) -> u32 {
    let get = |dx: i32, dy: i32| bitmap.get_pixel_signed(x as i32 + dx, y as i32 + dy) as u32;
    let get_at = |i: usize| get(at[i].x as i32, at[i].y as i32);

    match template {
        GenericTemplate::Template0 => {
            (get(-1, 0))
                | (get(-2, 0) << 1)
                | (get(-3, 0) << 2)
                | (get(-4, 0) << 3)
                | (get_at(0) << 4)
                | (get(2, -1) << 5)
                | (get(1, -1) << 6)
                | (get(0, -1) << 7)
                | (get(-1, -1) << 8)
                | (get(-2, -1) << 9)
                | (get_at(1) << 10)
                | (get_at(2) << 11)
                | (get(1, -2) << 12)
                | (get(0, -2) << 13)
                | (get(-1, -2) << 14)
                | (get_at(3) << 15)
        }
        GenericTemplate::Template1 => {
            (get(-1, 0))
                | (get(-2, 0) << 1)
                | (get(-3, 0) << 2)
                | (get_at(0) << 3)
                | (get(2, -1) << 4)
                | (get(1, -1) << 5)
                | (get(0, -1) << 6)
                | (get(-1, -1) << 7)
                | (get(-2, -1) << 8)
                | (get(2, -2) << 9)
                | (get(1, -2) << 10)
                | (get(0, -2) << 11)
                | (get(-1, -2) << 12)
        }
        GenericTemplate::Template2 => {
            (get(-1, 0))
                | (get(-2, 0) << 1)
                | (get_at(0) << 2)
                | (get(1, -1) << 3)
                | (get(0, -1) << 4)
                | (get(-1, -1) << 5)
                | (get(-2, -1) << 6)
                | (get(1, -2) << 7)
                | (get(0, -2) << 8)
                | (get(-1, -2) << 9)
        }
        GenericTemplate::Template3 => {
            (get(-1, 0))
                | (get(-2, 0) << 1)
                | (get(-3, 0) << 2)
                | (get(-4, 0) << 3)
                | (get_at(0) << 4)
                | (get(1, -1) << 5)
                | (get(0, -1) << 6)
                | (get(-1, -1) << 7)
                | (get(-2, -1) << 8)
                | (get(-3, -1) << 9)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn nominal_params(width: u32, height: u32, template: GenericTemplate) -> GenericParams {
        let at = nominal_at(template, false)
            .iter()
            .map(|&(x, y)| AtPixel { x, y })
            .collect();
        GenericParams {
            width,
            height,
            template,
            use_ext_templates: false,
            tpgdon: false,
            at,
        }
    }

    #[test]
    fn template0_zero_data_row() {
        // With all-zero coded data every pixel of the first row resolves
        // through the same renormalisation path; the resulting byte pins the
        // incremental context update.
        let data = [0_u8; 8];
        let mut decoder = ArithmeticDecoder::new(&data);
        let mut cx = DecoderStats::new(GenericTemplate::Template0.context_size());
        let params = nominal_params(8, 1, GenericTemplate::Template0);

        let bitmap = decode_bitmap(&mut decoder, &mut cx, &params).unwrap();
        assert_eq!(bitmap.data(), &[0b0111_1111]);
    }

    #[test]
    fn at_count_mismatch_is_rejected() {
        let data = [0_u8; 4];
        let mut decoder = ArithmeticDecoder::new(&data);
        let mut cx = DecoderStats::new(GenericTemplate::Template0.context_size());

        let mut params = nominal_params(8, 1, GenericTemplate::Template0);
        params.at = smallvec![AtPixel { x: 3, y: -1 }];

        assert!(decode_bitmap(&mut decoder, &mut cx, &params).is_err());
    }

    #[test]
    fn pixel_context_matches_incremental_walk_numbering() {
        // A single black pixel at (2, 0); decoding position (3, 1) must see
        // it at bit 8 of the template 0 context (pixel (-1, -1)).
        let mut bitmap = Bitmap::new(8, 2);
        bitmap.set_pixel(2, 0, 1);

        let at: Vec<AtPixel> = nominal_at(GenericTemplate::Template0, false)
            .iter()
            .map(|&(x, y)| AtPixel { x, y })
            .collect();

        let context = pixel_context(&bitmap, 3, 1, GenericTemplate::Template0, &at);
        assert_eq!(context, 1 << 8);

        // The same pixel seen from (1, 1) sits at (1, -1): bit 6.
        let context = pixel_context(&bitmap, 1, 1, GenericTemplate::Template0, &at);
        assert_eq!(context, 1 << 6);
    }
}
