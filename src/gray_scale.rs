//! Gray-scale image decoding (Annex C).
//!
//! A gray-scale image is coded as GSBPP bitplanes, most significant first,
//! Gray-coded against each other. Each bitplane is a generic bitmap; with
//! GSUSESKIP set, pixels under the skip mask are not coded at all, which is
//! why the planes are decoded pixel by pixel here rather than with the
//! byte-wise walk.

use crate::arithmetic::{ArithmeticDecoder, DecoderStats};
use crate::bitmap::Bitmap;
use crate::decode::generic::pixel_context;
use crate::decode::{AtPixel, GenericTemplate};
use crate::error::Result;
use crate::mmr::MmrDecoder;

/// Input parameters of the gray-scale image decoding procedure (Table C.1).
pub(crate) struct GrayScaleParams<'a> {
    /// `GSMMR`
    pub(crate) use_mmr: bool,
    /// `GSBPP`
    pub(crate) bits_per_pixel: u32,
    /// `GSW`, `GSH`
    pub(crate) width: u32,
    pub(crate) height: u32,
    /// `GSTEMPLATE`
    pub(crate) template: GenericTemplate,
    /// `GSKIP`, present when `GSUSESKIP` is 1.
    pub(crate) skip: Option<&'a Bitmap>,
}

/// The gray-scale image decoding procedure (C.5). Returns `GSVALS`, row
/// major.
pub(crate) fn decode_gray_scale_image(data: &[u8], params: &GrayScaleParams<'_>) -> Result<Vec<u32>> {
    let size = params.width as usize * params.height as usize;
    let mut values = vec![0_u32; size];
    if params.bits_per_pixel == 0 || size == 0 {
        return Ok(values);
    }

    // Table C.4 fixes the AT pixels used for the bitplanes.
    let at: &[AtPixel] = match params.template {
        GenericTemplate::Template0 => &[
            AtPixel { x: 3, y: -1 },
            AtPixel { x: -3, y: -1 },
            AtPixel { x: 2, y: -2 },
            AtPixel { x: -2, y: -2 },
        ],
        GenericTemplate::Template1 => &[AtPixel { x: 3, y: -1 }],
        GenericTemplate::Template2 | GenericTemplate::Template3 => &[AtPixel { x: 2, y: -1 }],
    };

    let mut mmr_offset = 0_usize;
    let mut arith = if params.use_mmr {
        None
    } else {
        Some((
            ArithmeticDecoder::new(data),
            DecoderStats::new(params.template.context_size()),
        ))
    };

    let mut decode_plane = |mmr_offset: &mut usize| -> Result<Bitmap> {
        if let Some((decoder, cx)) = arith.as_mut() {
            decode_bitplane_arithmetic(decoder, cx, params, at)
        } else {
            let (plane, consumed) =
                MmrDecoder::new(&data[*mmr_offset..], params.width, params.height).uncompress()?;
            *mmr_offset += consumed;
            Ok(plane)
        }
    };

    // "1) Decode GSPLANES[GSBPP − 1] using the generic region decoding
    // procedure." (C.5)
    let mut prev_plane = decode_plane(&mut mmr_offset)?;
    accumulate_plane(&prev_plane, &mut values, params.bits_per_pixel - 1);

    // "3) While J ≥ 0: decode GSPLANES[J]; set GSPLANES[J][x, y] =
    // GSPLANES[J + 1][x, y] XOR GSPLANES[J][x, y]." (C.5)
    for j in (0..params.bits_per_pixel - 1).rev() {
        let mut plane = decode_plane(&mut mmr_offset)?;
        xor_plane(&mut plane, &prev_plane);
        accumulate_plane(&plane, &mut values, j);
        prev_plane = plane;
    }

    Ok(values)
}

fn decode_bitplane_arithmetic(
    decoder: &mut ArithmeticDecoder<'_>,
    cx: &mut DecoderStats,
    params: &GrayScaleParams<'_>,
    at: &[AtPixel],
) -> Result<Bitmap> {
    let mut plane = Bitmap::new(params.width, params.height);

    for y in 0..params.height {
        for x in 0..params.width {
            // "USESKIP = GSUSESKIP, SKIP = GSKIP" (Table C.4): skipped
            // pixels are not coded and stay 0.
            if let Some(skip) = params.skip {
                if skip.get_pixel(x, y) != 0 {
                    continue;
                }
            }

            let context = pixel_context(&plane, x, y, params.template, at);
            cx.set_index(context as usize);
            let pixel = decoder.decode_bit(cx);
            plane.set_pixel(x, y, pixel);
        }
    }

    Ok(plane)
}

/// `GSVALS[x, y] |= GSPLANES[J][x, y] × 2^J` (C.5, step 4).
fn accumulate_plane(plane: &Bitmap, values: &mut [u32], j: u32) {
    let width = plane.width();
    for y in 0..plane.height() {
        for x in 0..width {
            if plane.get_pixel(x, y) != 0 {
                values[(y * width + x) as usize] |= 1 << j;
            }
        }
    }
}

/// Gray-decode one plane against the one above it, eight pixels at a time.
/// Both planes have zero row padding, so whole bytes can be combined.
fn xor_plane(plane: &mut Bitmap, prev: &Bitmap) {
    for i in 0..plane.data().len() {
        let byte = plane.get_byte(i) ^ prev.get_byte(i);
        plane.set_byte(i, byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_decoding_combines_planes() {
        // Two 2x1 planes: MSB plane = [1, 0], LSB plane (before Gray
        // decoding) = [1, 1]. Gray decoding XORs the LSB plane with the MSB
        // plane: [0, 1]; values are [0b10, 0b01].
        let mut msb = Bitmap::new(2, 1);
        msb.set_pixel(0, 0, 1);
        let mut lsb = Bitmap::new(2, 1);
        lsb.set_pixel(0, 0, 1);
        lsb.set_pixel(1, 0, 1);

        let mut values = vec![0_u32; 2];
        accumulate_plane(&msb, &mut values, 1);
        xor_plane(&mut lsb, &msb);
        accumulate_plane(&lsb, &mut values, 0);

        assert_eq!(values, [0b10, 0b01]);
    }
}
