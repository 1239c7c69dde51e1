//! Generic refinement region decoding (6.3) and its segment (7.4.7).
//!
//! A refinement decodes a new bitmap against a reference bitmap shifted by
//! (GRREFERENCEDX, GRREFERENCEDY): the 13-pixel template of template 0 (or
//! the 10-pixel template of template 1) mixes already-decoded target pixels
//! with a 3 × 3 neighbourhood of the reference.

use crate::arithmetic::{ArithmeticDecoder, DecoderStats};
use crate::bitmap::Bitmap;
use crate::decode::{
    AtPixel, AtPixels, RefinementTemplate, RegionBitmap, parse_refinement_at_pixels,
    parse_region_segment_info,
};
use crate::error::{ParseError, RegionError, Result, bail};
use crate::reader::Reader;

/// Decode a generic refinement region segment (7.4.7).
///
/// `reference` is the bitmap selected per 7.4.7.5 ("If there are no
/// referred-to segments, then use the page bitmap"), and (`ref_x`, `ref_y`)
/// is its location on the page.
pub(crate) fn decode(
    reader: &mut Reader<'_>,
    reference: &Bitmap,
    ref_x: u32,
    ref_y: u32,
) -> Result<RegionBitmap> {
    let info = parse_region_segment_info(reader)?;

    if info.width > reference.width() || info.height > reference.height() {
        bail!(RegionError::InvalidDimension);
    }

    let flags = reader.read_byte().ok_or(ParseError::UnexpectedEof)?;
    let template = RefinementTemplate::from_bit(flags);
    let tpgron = flags & 0x02 != 0;

    let at = if template == RefinementTemplate::Template0 {
        parse_refinement_at_pixels(reader)?
    } else {
        AtPixels::new()
    };

    let reference_dx = ref_x as i32 - info.x_location as i32;
    let reference_dy = ref_y as i32 - info.y_location as i32;

    let data = reader.tail().ok_or(ParseError::UnexpectedEof)?;
    let mut decoder = ArithmeticDecoder::new(data);
    let mut cx = DecoderStats::new(template.context_size());

    let mut bitmap = Bitmap::new(info.width, info.height);
    decode_bitmap(
        &mut decoder,
        &mut cx,
        &mut bitmap,
        reference,
        reference_dx,
        reference_dy,
        template,
        &at,
        tpgron,
    )?;

    Ok(RegionBitmap { bitmap, info })
}

/// The generic refinement region decoding procedure (6.3.5.6).
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_bitmap(
    decoder: &mut ArithmeticDecoder<'_>,
    cx: &mut DecoderStats,
    region: &mut Bitmap,
    reference: &Bitmap,
    reference_dx: i32,
    reference_dy: i32,
    template: RefinementTemplate,
    at: &[AtPixel],
    tpgron: bool,
) -> Result<()> {
    if template == RefinementTemplate::Template0 && at.len() != 2 {
        bail!(RegionError::InvalidAtPixel);
    }

    let width = region.width();
    let height = region.height();

    // "1) Set: LTP = 0" (6.3.5.6)
    let mut ltp = 0_u8;

    for y in 0..height {
        // "b) If TPGRON is 1, then decode a bit using the arithmetic entropy
        // coder ... Set: LTP = LTP XOR SLTP" (6.3.5.6)
        if tpgron {
            cx.set_index(sltp_context(template));
            ltp ^= decoder.decode_bit(cx);
        }

        for x in 0..width {
            if ltp == 1 {
                // "i) Set TPGRPIX equal to 1 if ... a 3 × 3 pixel array in
                // the reference bitmap, centred at the location corresponding
                // to the current pixel, contains pixels all of the same
                // value." (6.3.5.6)
                let ref_x = x as i32 - reference_dx;
                let ref_y = y as i32 - reference_dy;
                let center = reference.get_pixel_signed(ref_x, ref_y);

                let mut all_same = true;
                'around: for dy in -1..=1 {
                    for dx in -1..=1 {
                        if reference.get_pixel_signed(ref_x + dx, ref_y + dy) != center {
                            all_same = false;
                            break 'around;
                        }
                    }
                }

                if all_same {
                    // "ii) If TPGRPIX is 1 then implicitly decode the current
                    // pixel by setting it equal to its predicted value."
                    // (6.3.5.6)
                    region.set_pixel(x, y, center);
                    continue;
                }
            }

            let context = gather_context(
                region,
                reference,
                x,
                y,
                reference_dx,
                reference_dy,
                template,
                at,
            );
            cx.set_index(context as usize);
            let pixel = decoder.decode_bit(cx);
            region.set_pixel(x, y, pixel);
        }
    }

    Ok(())
}

/// The SLTP pseudo-pixel context per refinement template.
fn sltp_context(template: RefinementTemplate) -> usize {
    match template {
        RefinementTemplate::Template0 => 0x0010,
        RefinementTemplate::Template1 => 0x0008,
    }
}

/// Gather the refinement context of a pixel (6.3.5.3).
#[allow(clippy::too_many_arguments)]
fn gather_context(
    region: &Bitmap,
    reference: &Bitmap,
    x: u32,
    y: u32,
    reference_dx: i32,
    reference_dy: i32,
    template: RefinementTemplate,
    at: &[AtPixel],
) -> u32 {
    let x = x as i32;
    let y = y as i32;
    let ref_x = x - reference_dx;
    let ref_y = y - reference_dy;

    let cur = |dx: i32, dy: i32| region.get_pixel_signed(x + dx, y + dy) as u32;
    let referred = |dx: i32, dy: i32| reference.get_pixel_signed(ref_x + dx, ref_y + dy) as u32;

    match template {
        // The 13-pixel template with two AT pixels (Figure 12): four pixels
        // of the bitmap being decoded, nine of the reference.
        RefinementTemplate::Template0 => {
            let at1 = at[0];
            let at2 = at[1];

            let mut context = cur(at1.x as i32, at1.y as i32);
            context = (context << 1) | cur(0, -1);
            context = (context << 1) | cur(1, -1);
            context = (context << 1) | cur(-1, 0);

            context = (context << 1) | referred(at2.x as i32, at2.y as i32);
            context = (context << 1) | referred(0, -1);
            context = (context << 1) | referred(1, -1);
            context = (context << 1) | referred(-1, 0);
            context = (context << 1) | referred(0, 0);
            context = (context << 1) | referred(1, 0);
            context = (context << 1) | referred(-1, 1);
            context = (context << 1) | referred(0, 1);
            context = (context << 1) | referred(1, 1);

            context
        }
        // The 10-pixel template (Figure 13).
        RefinementTemplate::Template1 => {
            let mut context = cur(-1, -1);
            context = (context << 1) | cur(0, -1);
            context = (context << 1) | cur(1, -1);
            context = (context << 1) | cur(-1, 0);

            context = (context << 1) | referred(0, -1);
            context = (context << 1) | referred(-1, 0);
            context = (context << 1) | referred(0, 0);
            context = (context << 1) | referred(1, 0);
            context = (context << 1) | referred(0, 1);
            context = (context << 1) | referred(1, 1);

            context
        }
    }
}
