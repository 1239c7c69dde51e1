//! Text region decoding (6.4) and its segment (7.4.3).
//!
//! A text region places instances of previously decoded symbol bitmaps into
//! an initially uniform region, strip by strip: each instance decodes its S
//! and T coordinates as deltas, its symbol ID, and optionally a refinement
//! of the symbol bitmap (6.4.11).

use crate::arithmetic::{ArithmeticDecoder, DecoderStats, IntStats};
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::blit::blit;
use crate::decode::refinement;
use crate::decode::{
    AtPixel, AtPixels, RefinementTemplate, RegionBitmap, parse_refinement_at_pixels,
    parse_region_segment_info,
};
use crate::error::{
    DecodeError, HuffmanError, ParseError, Result, SymbolError, bail,
};
use crate::huffman::{self, HuffmanTable, TableLine};
use crate::reader::Reader;

/// "REFCORNER - The corner of each symbol's bitmap used in placement."
/// (6.4.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReferenceCorner {
    BottomLeft,
    TopLeft,
    BottomRight,
    TopRight,
}

impl ReferenceCorner {
    fn from_bits(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::BottomLeft,
            1 => Self::TopLeft,
            2 => Self::BottomRight,
            _ => Self::TopRight,
        }
    }
}

/// The parameters of one text region decoding (Table 10).
#[derive(Debug, Clone)]
pub(crate) struct TextParams<'a> {
    /// `SBW`, `SBH`
    pub(crate) width: u32,
    pub(crate) height: u32,
    /// `SBNUMINSTANCES`
    pub(crate) num_instances: u32,
    /// `LOGSBSTRIPS`
    pub(crate) log_strip_size: u8,
    /// `SBDEFPIXEL`
    pub(crate) default_pixel: bool,
    /// `SBCOMBOP`
    pub(crate) combination_operator: CombinationOperator,
    /// `TRANSPOSED`
    pub(crate) transposed: bool,
    /// `REFCORNER`
    pub(crate) reference_corner: ReferenceCorner,
    /// `SBDSOFFSET`
    pub(crate) ds_offset: i8,
    /// `SBREFINE`
    pub(crate) refine: bool,
    /// `SBRTEMPLATE`
    pub(crate) refinement_template: RefinementTemplate,
    /// `SBRAT`
    pub(crate) refinement_at: &'a [AtPixel],
}

impl TextParams<'_> {
    fn strip_size(&self) -> u32 {
        1 << self.log_strip_size
    }
}

/// The entropy-coding side of a text region decoding: either the bit reader
/// with its selected Huffman tables, or the arithmetic decoder with its
/// integer contexts.
pub(crate) enum TextDecodeContext<'a, 'b> {
    Huffman {
        reader: &'a mut Reader<'b>,
        tables: TextHuffmanTables<'a>,
        symbol_codes: &'a HuffmanTable,
    },
    Arithmetic {
        decoder: &'a mut ArithmeticDecoder<'b>,
        stats: &'a mut IntStats,
        refinement_cx: &'a mut DecoderStats,
        symbol_code_length: u32,
    },
}

/// The Huffman tables a text region selects per 7.4.3.1.6 / Table 17.
pub(crate) struct TextHuffmanTables<'a> {
    pub(crate) first_s: &'a HuffmanTable,
    pub(crate) delta_s: &'a HuffmanTable,
    pub(crate) delta_t: &'a HuffmanTable,
    pub(crate) refinement_width: &'a HuffmanTable,
    pub(crate) refinement_height: &'a HuffmanTable,
    pub(crate) refinement_x: &'a HuffmanTable,
    pub(crate) refinement_y: &'a HuffmanTable,
    pub(crate) refinement_size: &'a HuffmanTable,
}

impl<'a, 'b> TextDecodeContext<'a, 'b> {
    /// Strip delta T (6.4.6), scaled by the strip size.
    fn read_strip_delta_t(&mut self, strip_size: u32) -> Result<i32> {
        let value = match self {
            Self::Huffman { reader, tables, .. } => tables.delta_t.decode_no_oob(reader)?,
            Self::Arithmetic { decoder, stats, .. } => decoder
                .decode_int(&mut stats.iadt)
                .ok_or(SymbolError::UnexpectedOob)?,
        };
        value
            .checked_mul(strip_size as i32)
            .ok_or(DecodeError::Overflow)
    }

    /// First symbol instance S coordinate delta (6.4.7).
    fn read_first_s(&mut self) -> Result<i32> {
        match self {
            Self::Huffman { reader, tables, .. } => tables.first_s.decode_no_oob(reader),
            Self::Arithmetic { decoder, stats, .. } => decoder
                .decode_int(&mut stats.iafs)
                .ok_or_else(|| SymbolError::UnexpectedOob.into()),
        }
    }

    /// Subsequent symbol instance S delta (6.4.8); OOB ends the strip.
    fn read_delta_s(&mut self) -> Result<Option<i32>> {
        match self {
            Self::Huffman { reader, tables, .. } => tables.delta_s.decode(reader),
            Self::Arithmetic { decoder, stats, .. } => Ok(decoder.decode_int(&mut stats.iads)),
        }
    }

    /// Symbol instance T coordinate within the strip (6.4.9).
    fn read_symbol_t(&mut self, log_strip_size: u8) -> Result<i32> {
        if log_strip_size == 0 {
            return Ok(0);
        }

        match self {
            Self::Huffman { reader, .. } => Ok(reader
                .read_bits(log_strip_size)
                .ok_or(ParseError::UnexpectedEof)? as i32),
            Self::Arithmetic { decoder, stats, .. } => decoder
                .decode_int(&mut stats.iait)
                .ok_or_else(|| SymbolError::UnexpectedOob.into()),
        }
    }

    /// Symbol instance symbol ID (6.4.10).
    fn read_symbol_id(&mut self) -> Result<usize> {
        match self {
            Self::Huffman {
                reader,
                symbol_codes,
                ..
            } => Ok(symbol_codes.decode_no_oob(reader)? as usize),
            Self::Arithmetic {
                decoder,
                stats,
                symbol_code_length,
                ..
            } => Ok(decoder.decode_iaid(*symbol_code_length, &mut stats.iaid) as usize),
        }
    }

    /// The refinement indicator bit `R_I` (6.4.11).
    fn read_refinement_flag(&mut self) -> Result<u8> {
        match self {
            Self::Huffman { reader, .. } => {
                reader.read_bit().ok_or_else(|| ParseError::UnexpectedEof.into())
            }
            Self::Arithmetic { decoder, stats, .. } => Ok(decoder
                .decode_int(&mut stats.iari)
                .ok_or(SymbolError::UnexpectedOob)? as u8),
        }
    }

    fn read_refinement_delta(&mut self, which: RefinementDelta) -> Result<i32> {
        match self {
            Self::Huffman { reader, tables, .. } => {
                let table = match which {
                    RefinementDelta::Width => tables.refinement_width,
                    RefinementDelta::Height => tables.refinement_height,
                    RefinementDelta::X => tables.refinement_x,
                    RefinementDelta::Y => tables.refinement_y,
                };
                table.decode_no_oob(reader)
            }
            Self::Arithmetic { decoder, stats, .. } => {
                let role = match which {
                    RefinementDelta::Width => &mut stats.iardw,
                    RefinementDelta::Height => &mut stats.iardh,
                    RefinementDelta::X => &mut stats.iardx,
                    RefinementDelta::Y => &mut stats.iardy,
                };
                decoder
                    .decode_int(role)
                    .ok_or_else(|| SymbolError::UnexpectedOob.into())
            }
        }
    }

    /// Steps 5) to 7) of 6.4.11: decode the refined symbol bitmap.
    fn decode_refinement_bitmap(
        &mut self,
        refined: &mut Bitmap,
        reference: &Bitmap,
        reference_dx: i32,
        reference_dy: i32,
        template: RefinementTemplate,
        at: &[AtPixel],
    ) -> Result<()> {
        match self {
            Self::Huffman { reader, tables, .. } => {
                // "Decode the size in bytes of the refinement data using the
                // SBHUFFRSIZE table; skip over any remaining bits in the last
                // byte read." (6.4.11)
                let size = tables.refinement_size.decode_no_oob(reader)?;
                if size < 0 {
                    bail!(HuffmanError::InvalidCode);
                }
                reader.align();

                let data = reader
                    .read_bytes(size as usize)
                    .ok_or(ParseError::UnexpectedEof)?;

                let mut decoder = ArithmeticDecoder::new(data);
                let mut cx = DecoderStats::new(template.context_size());
                refinement::decode_bitmap(
                    &mut decoder,
                    &mut cx,
                    refined,
                    reference,
                    reference_dx,
                    reference_dy,
                    template,
                    at,
                    false,
                )
            }
            Self::Arithmetic {
                decoder,
                refinement_cx,
                ..
            } => refinement::decode_bitmap(
                decoder,
                refinement_cx,
                refined,
                reference,
                reference_dx,
                reference_dy,
                template,
                at,
                false,
            ),
        }
    }
}

enum RefinementDelta {
    Width,
    Height,
    X,
    Y,
}

/// A symbol instance bitmap: the pool symbol itself, or its refinement.
enum SymbolBitmap {
    Reference(usize),
    Owned(Bitmap),
}

/// The text region decoding procedure (6.4.5).
pub(crate) fn decode_with(
    mut ctx: TextDecodeContext<'_, '_>,
    symbols: &[&Bitmap],
    params: &TextParams<'_>,
) -> Result<Bitmap> {
    let mut region = Bitmap::new(params.width, params.height);
    if params.default_pixel {
        region.set_default_pixel();
    }

    let strip_size = params.strip_size();

    // "1) Decode the initial STRIPT value ... Negate the decoded value and
    // assign the negated value to the variable STRIPT." (6.4.5)
    let mut strip_t = ctx
        .read_strip_delta_t(strip_size)?
        .checked_neg()
        .ok_or(DecodeError::Overflow)?;
    let mut first_s: i32 = 0;
    let mut instance_count = 0;

    while instance_count < params.num_instances {
        // "b) Decode the strip's delta T ... STRIPT = STRIPT + DT" (6.4.5)
        let delta_t = ctx.read_strip_delta_t(strip_size)?;
        strip_t = strip_t.checked_add(delta_t).ok_or(DecodeError::Overflow)?;

        let mut first_symbol_in_strip = true;
        let mut current_s = 0;

        loop {
            if instance_count > params.num_instances {
                bail!(SymbolError::TooManySymbols);
            }

            if first_symbol_in_strip {
                // "i) If the current symbol instance is the first symbol
                // instance in the strip, then decode the first symbol
                // instance's S coordinate." (6.4.5, c)
                let delta_first_s = ctx.read_first_s()?;
                first_s = first_s
                    .checked_add(delta_first_s)
                    .ok_or(DecodeError::Overflow)?;
                current_s = first_s;
                first_symbol_in_strip = false;
            } else {
                // "Otherwise, decode the symbol instance's S coordinate
                // delta; OOB signals the end of the strip." (6.4.5, c)
                let Some(delta_s) = ctx.read_delta_s()? else {
                    break;
                };

                current_s = current_s
                    .checked_add(delta_s)
                    .and_then(|s| s.checked_add(params.ds_offset as i32))
                    .ok_or(DecodeError::Overflow)?;
            }

            let current_t = ctx.read_symbol_t(params.log_strip_size)?;
            let symbol_t = strip_t
                .checked_add(current_t)
                .ok_or(DecodeError::Overflow)?;

            let symbol_id = ctx.read_symbol_id()?;
            let symbol_bitmap = decode_instance_bitmap(&mut ctx, symbols, params, symbol_id)?;
            let bitmap: &Bitmap = match &symbol_bitmap {
                SymbolBitmap::Reference(id) => symbols.get(*id).ok_or(SymbolError::OutOfRange)?,
                SymbolBitmap::Owned(bitmap) => bitmap,
            };

            let symbol_width = bitmap.width() as i32;
            let symbol_height = bitmap.height() as i32;

            // Right-corner placement advances S before drawing (6.4.5, viii).
            if !params.transposed
                && matches!(
                    params.reference_corner,
                    ReferenceCorner::TopRight | ReferenceCorner::BottomRight
                )
            {
                current_s = current_s
                    .checked_add(symbol_width - 1)
                    .ok_or(DecodeError::Overflow)?;
            } else if params.transposed
                && matches!(
                    params.reference_corner,
                    ReferenceCorner::BottomLeft | ReferenceCorner::BottomRight
                )
            {
                current_s = current_s
                    .checked_add(symbol_height - 1)
                    .ok_or(DecodeError::Overflow)?;
            }

            let (x, y) = if !params.transposed {
                match params.reference_corner {
                    ReferenceCorner::TopLeft => (current_s, symbol_t),
                    ReferenceCorner::TopRight => (current_s - symbol_width + 1, symbol_t),
                    ReferenceCorner::BottomLeft => (current_s, symbol_t - symbol_height + 1),
                    ReferenceCorner::BottomRight => {
                        (current_s - symbol_width + 1, symbol_t - symbol_height + 1)
                    }
                }
            } else {
                match params.reference_corner {
                    ReferenceCorner::TopLeft => (symbol_t, current_s),
                    ReferenceCorner::TopRight => (symbol_t - symbol_width + 1, current_s),
                    ReferenceCorner::BottomLeft => (symbol_t, current_s - symbol_height + 1),
                    ReferenceCorner::BottomRight => {
                        (symbol_t - symbol_width + 1, current_s - symbol_height + 1)
                    }
                }
            };

            // "x) Draw SB_I into SBREG ... using the external combination
            // operator SBCOMBOP." (6.4.5)
            blit(bitmap, &mut region, x, y, params.combination_operator);

            // Left-corner placement advances S after drawing (6.4.5, xi).
            if !params.transposed
                && matches!(
                    params.reference_corner,
                    ReferenceCorner::TopLeft | ReferenceCorner::BottomLeft
                )
            {
                current_s = current_s
                    .checked_add(symbol_width - 1)
                    .ok_or(DecodeError::Overflow)?;
            } else if params.transposed
                && matches!(
                    params.reference_corner,
                    ReferenceCorner::TopLeft | ReferenceCorner::TopRight
                )
            {
                current_s = current_s
                    .checked_add(symbol_height - 1)
                    .ok_or(DecodeError::Overflow)?;
            }

            instance_count += 1;
        }
    }

    Ok(region)
}

/// Decode the symbol instance bitmap, refining it when `R_I` is 1 (6.4.11).
fn decode_instance_bitmap(
    ctx: &mut TextDecodeContext<'_, '_>,
    symbols: &[&Bitmap],
    params: &TextParams<'_>,
    symbol_id: usize,
) -> Result<SymbolBitmap> {
    if !params.refine || ctx.read_refinement_flag()? == 0 {
        return Ok(SymbolBitmap::Reference(symbol_id));
    }

    let reference = symbols.get(symbol_id).ok_or(SymbolError::OutOfRange)?;

    let rdw = ctx.read_refinement_delta(RefinementDelta::Width)?;
    let rdh = ctx.read_refinement_delta(RefinementDelta::Height)?;
    let rdx = ctx.read_refinement_delta(RefinementDelta::X)?;
    let rdy = ctx.read_refinement_delta(RefinementDelta::Y)?;

    let refined_width = u32::try_from(reference.width() as i64 + rdw as i64)
        .map_err(|_| DecodeError::Overflow)?;
    let refined_height = u32::try_from(reference.height() as i64 + rdh as i64)
        .map_err(|_| DecodeError::Overflow)?;

    // "GRREFERENCEDX = floor(RDW / 2) + RDX" (6.4.11, Table 12)
    let reference_dx = rdw
        .div_euclid(2)
        .checked_add(rdx)
        .ok_or(DecodeError::Overflow)?;
    let reference_dy = rdh
        .div_euclid(2)
        .checked_add(rdy)
        .ok_or(DecodeError::Overflow)?;

    let mut refined = Bitmap::new(refined_width, refined_height);
    ctx.decode_refinement_bitmap(
        &mut refined,
        reference,
        reference_dx,
        reference_dy,
        params.refinement_template,
        params.refinement_at,
    )?;

    Ok(SymbolBitmap::Owned(refined))
}

/// Parsed text region segment flags (7.4.3.1.1).
#[derive(Debug, Clone)]
struct TextRegionFlags {
    use_huffman: bool,
    refine: bool,
    log_strip_size: u8,
    reference_corner: ReferenceCorner,
    transposed: bool,
    combination_operator: CombinationOperator,
    default_pixel: bool,
    ds_offset: i8,
    refinement_template: RefinementTemplate,
}

/// Text region segment Huffman flags (7.4.3.1.2).
#[derive(Debug, Clone)]
struct TextRegionHuffmanFlags {
    first_s_table: u8,
    delta_s_table: u8,
    delta_t_table: u8,
    refinement_width_table: u8,
    refinement_height_table: u8,
    refinement_y_table: u8,
    refinement_x_table: u8,
    refinement_size_table: u8,
}

fn parse_text_region_flags(reader: &mut Reader<'_>) -> Result<TextRegionFlags> {
    let flags = reader.read_u16().ok_or(ParseError::UnexpectedEof)?;

    let use_huffman = flags & 0x0001 != 0;
    let refine = flags & 0x0002 != 0;
    let log_strip_size = ((flags >> 2) & 0x03) as u8;
    let reference_corner = ReferenceCorner::from_bits(((flags >> 4) & 0x03) as u8);
    let transposed = flags & 0x0040 != 0;
    let combination_operator = CombinationOperator::from_value(((flags >> 7) & 0x03) as u8)?;
    let default_pixel = flags & 0x0200 != 0;

    // "Bits 10-14: SBDSOFFSET ... a signed value in the range -16...15."
    // (7.4.3.1.1)
    let ds_offset_raw = ((flags >> 10) & 0x1F) as u8;
    let ds_offset = if ds_offset_raw & 0x10 != 0 {
        (ds_offset_raw | 0xE0) as i8
    } else {
        ds_offset_raw as i8
    };

    let refinement_template = RefinementTemplate::from_bit((flags >> 15) as u8);

    Ok(TextRegionFlags {
        use_huffman,
        refine,
        log_strip_size,
        reference_corner,
        transposed,
        combination_operator,
        default_pixel,
        ds_offset,
        refinement_template,
    })
}

fn parse_text_region_huffman_flags(reader: &mut Reader<'_>) -> Result<TextRegionHuffmanFlags> {
    let flags = reader.read_u16().ok_or(ParseError::UnexpectedEof)?;

    Ok(TextRegionHuffmanFlags {
        first_s_table: (flags & 0x03) as u8,
        delta_s_table: ((flags >> 2) & 0x03) as u8,
        delta_t_table: ((flags >> 4) & 0x03) as u8,
        refinement_width_table: ((flags >> 6) & 0x03) as u8,
        refinement_height_table: ((flags >> 8) & 0x03) as u8,
        refinement_y_table: ((flags >> 10) & 0x03) as u8,
        refinement_x_table: ((flags >> 12) & 0x03) as u8,
        refinement_size_table: ((flags >> 14) & 0x01) as u8,
    })
}

/// Select the text region Huffman tables (7.4.3.1.6).
fn select_huffman_tables<'a>(
    flags: &TextRegionHuffmanFlags,
    referred_tables: &[&'a HuffmanTable],
) -> Result<TextHuffmanTables<'a>> {
    let mut referred_idx = 0;

    let first_s = match flags.first_s_table {
        0 => &*huffman::TABLE_F,
        1 => &*huffman::TABLE_G,
        3 => huffman::take_referred(referred_tables, &mut referred_idx)?,
        _ => bail!(HuffmanError::InvalidSelection),
    };

    let delta_s = match flags.delta_s_table {
        0 => &*huffman::TABLE_H,
        1 => &*huffman::TABLE_I,
        2 => &*huffman::TABLE_J,
        3 => huffman::take_referred(referred_tables, &mut referred_idx)?,
        _ => bail!(HuffmanError::InvalidSelection),
    };

    let delta_t = match flags.delta_t_table {
        0 => &*huffman::TABLE_K,
        1 => &*huffman::TABLE_L,
        2 => &*huffman::TABLE_M,
        3 => huffman::take_referred(referred_tables, &mut referred_idx)?,
        _ => bail!(HuffmanError::InvalidSelection),
    };

    let refinement_width = match flags.refinement_width_table {
        0 => &*huffman::TABLE_N,
        1 => &*huffman::TABLE_O,
        3 => huffman::take_referred(referred_tables, &mut referred_idx)?,
        _ => bail!(HuffmanError::InvalidSelection),
    };

    let refinement_height = match flags.refinement_height_table {
        0 => &*huffman::TABLE_N,
        1 => &*huffman::TABLE_O,
        3 => huffman::take_referred(referred_tables, &mut referred_idx)?,
        _ => bail!(HuffmanError::InvalidSelection),
    };

    let refinement_y = match flags.refinement_y_table {
        0 => &*huffman::TABLE_N,
        1 => &*huffman::TABLE_O,
        3 => huffman::take_referred(referred_tables, &mut referred_idx)?,
        _ => bail!(HuffmanError::InvalidSelection),
    };

    let refinement_x = match flags.refinement_x_table {
        0 => &*huffman::TABLE_N,
        1 => &*huffman::TABLE_O,
        3 => huffman::take_referred(referred_tables, &mut referred_idx)?,
        _ => bail!(HuffmanError::InvalidSelection),
    };

    let refinement_size = match flags.refinement_size_table {
        0 => &*huffman::TABLE_A,
        _ => huffman::take_referred(referred_tables, &mut referred_idx)?,
    };

    Ok(TextHuffmanTables {
        first_s,
        delta_s,
        delta_t,
        refinement_width,
        refinement_height,
        refinement_x,
        refinement_y,
        refinement_size,
    })
}

/// Decode the symbol ID code table (7.4.3.1.7): 35 runcode prefix lengths,
/// then runcode-coded per-symbol code lengths.
fn decode_symbol_id_codes(reader: &mut Reader<'_>, num_symbols: u32) -> Result<HuffmanTable> {
    let mut runcode_lines = Vec::with_capacity(35);
    for runcode in 0..35 {
        let preflen = reader.read_bits(4).ok_or(ParseError::UnexpectedEof)? as u8;
        runcode_lines.push(TableLine::new(runcode, preflen, 0));
    }
    let runcode_table = HuffmanTable::build(&runcode_lines);

    let mut code_lengths: Vec<u8> = Vec::with_capacity(num_symbols as usize);
    while code_lengths.len() < num_symbols as usize {
        let runcode = runcode_table.decode_no_oob(reader)?;

        match runcode {
            0..=31 => code_lengths.push(runcode as u8),
            32 => {
                // "Repeat the previous code length 3 + (2 bits) times."
                let repeat = reader.read_bits(2).ok_or(ParseError::UnexpectedEof)? as usize + 3;
                let previous = *code_lengths.last().ok_or(HuffmanError::InvalidCode)?;
                code_lengths.extend(std::iter::repeat(previous).take(repeat));
            }
            33 => {
                // "Repeat a code length of 0 for 3 + (3 bits) times."
                let repeat = reader.read_bits(3).ok_or(ParseError::UnexpectedEof)? as usize + 3;
                code_lengths.extend(std::iter::repeat(0).take(repeat));
            }
            34 => {
                // "Repeat a code length of 0 for 11 + (7 bits) times."
                let repeat = reader.read_bits(7).ok_or(ParseError::UnexpectedEof)? as usize + 11;
                code_lengths.extend(std::iter::repeat(0).take(repeat));
            }
            _ => bail!(HuffmanError::InvalidCode),
        }
    }

    if code_lengths.len() != num_symbols as usize {
        bail!(HuffmanError::InvalidCode);
    }

    // "Skip over the remaining bits in the last byte read." (7.4.3.1.7)
    reader.align();

    let lines: Vec<TableLine> = code_lengths
        .iter()
        .enumerate()
        .map(|(id, &preflen)| TableLine::new(id as i32, preflen, 0))
        .collect();
    Ok(HuffmanTable::build(&lines))
}

/// Decode a text region segment (7.4.3).
pub(crate) fn decode(
    reader: &mut Reader<'_>,
    symbols: &[&Bitmap],
    referred_tables: &[&HuffmanTable],
) -> Result<RegionBitmap> {
    let info = parse_region_segment_info(reader)?;
    let flags = parse_text_region_flags(reader)?;

    let huffman_flags = if flags.use_huffman {
        Some(parse_text_region_huffman_flags(reader)?)
    } else {
        None
    };

    let refinement_at = if flags.refine && flags.refinement_template == RefinementTemplate::Template0
    {
        parse_refinement_at_pixels(reader)?
    } else {
        AtPixels::new()
    };

    let num_instances = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;

    let params = TextParams {
        width: info.width,
        height: info.height,
        num_instances,
        log_strip_size: flags.log_strip_size,
        default_pixel: flags.default_pixel,
        combination_operator: flags.combination_operator,
        transposed: flags.transposed,
        reference_corner: flags.reference_corner,
        ds_offset: flags.ds_offset,
        refine: flags.refine,
        refinement_template: flags.refinement_template,
        refinement_at: &refinement_at,
    };

    let bitmap = if let Some(huffman_flags) = &huffman_flags {
        let symbol_codes = decode_symbol_id_codes(reader, symbols.len() as u32)?;
        let tables = select_huffman_tables(huffman_flags, referred_tables)?;

        let ctx = TextDecodeContext::Huffman {
            reader,
            tables,
            symbol_codes: &symbol_codes,
        };
        decode_with(ctx, symbols, &params)?
    } else {
        let num_symbols = symbols.len() as u32;
        let symbol_code_length = 32 - num_symbols.saturating_sub(1).leading_zeros();

        let mut decoder = ArithmeticDecoder::from_reader(reader);
        let mut stats = IntStats::new(symbol_code_length);
        let mut refinement_cx = DecoderStats::new(flags.refinement_template.context_size());

        let ctx = TextDecodeContext::Arithmetic {
            decoder: &mut decoder,
            stats: &mut stats,
            refinement_cx: &mut refinement_cx,
            symbol_code_length,
        };
        decode_with(ctx, symbols, &params)?
    };

    Ok(RegionBitmap { bitmap, info })
}
