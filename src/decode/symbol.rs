//! Symbol dictionary decoding (6.5) and its segment (7.4.2).
//!
//! A symbol dictionary builds a library of small bitmaps, grouped into
//! height classes of equal height and increasing width. Each symbol is coded
//! either directly with the generic procedure, by refining a previously
//! decoded symbol, or as an aggregate of several symbol instances placed by
//! the text region procedure. A final run-length pass selects which of the
//! input and new symbols the dictionary exports.

use log::warn;

use crate::arithmetic::{ArithmeticDecoder, DecoderStats, IntStats};
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::decode::text::{
    ReferenceCorner, TextDecodeContext, TextHuffmanTables, TextParams, decode_with,
};
use crate::decode::{
    AtPixels, GenericTemplate, RefinementTemplate, generic, parse_at_pixels,
    parse_refinement_at_pixels, refinement,
};
use crate::error::{
    HuffmanError, ParseError, RegionError, Result, SymbolError, bail,
};
use crate::huffman::{self, HuffmanTable};
use crate::mmr::MmrDecoder;
use crate::reader::Reader;

/// A decoded symbol dictionary.
#[derive(Debug, Clone, Default)]
pub(crate) struct SymbolDictionary {
    /// `SDEXSYMS` - the exported symbol bitmaps, in export order.
    pub(crate) exported: Vec<Bitmap>,
    /// Estimator state retained for later dictionaries (7.4.2.1.1, bit 9).
    pub(crate) generic_stats: Option<DecoderStats>,
    pub(crate) refinement_stats: Option<DecoderStats>,
}

/// Parsed symbol dictionary flags (7.4.2.1.1).
#[derive(Debug, Clone)]
struct SymbolDictionaryFlags {
    use_huffman: bool,
    use_refagg: bool,
    delta_height_table: u8,
    delta_width_table: u8,
    bitmap_size_table: u8,
    aggregate_instance_table: u8,
    bitmap_cc_used: bool,
    bitmap_cc_retained: bool,
    template: GenericTemplate,
    refinement_template: RefinementTemplate,
}

/// Parsed symbol dictionary header (7.4.2.1).
struct SymbolDictionaryHeader {
    flags: SymbolDictionaryFlags,
    at: AtPixels,
    refinement_at: AtPixels,
    /// `SDNUMEXSYMS`
    num_exported: u32,
    /// `SDNUMNEWSYMS`
    num_new: u32,
}

fn parse(reader: &mut Reader<'_>) -> Result<SymbolDictionaryHeader> {
    let flags_word = reader.read_u16().ok_or(ParseError::UnexpectedEof)?;

    let use_huffman = flags_word & 0x0001 != 0;
    let use_refagg = flags_word & 0x0002 != 0;
    let delta_height_table = ((flags_word >> 2) & 0x03) as u8;
    let delta_width_table = ((flags_word >> 4) & 0x03) as u8;
    let bitmap_size_table = ((flags_word >> 6) & 0x01) as u8;
    let aggregate_instance_table = ((flags_word >> 7) & 0x01) as u8;
    let bitmap_cc_used = flags_word & 0x0100 != 0;
    let bitmap_cc_retained = flags_word & 0x0200 != 0;
    let template = GenericTemplate::from_bits((flags_word >> 10) as u8);
    let refinement_template = RefinementTemplate::from_bit((flags_word >> 12) as u8);

    let flags = SymbolDictionaryFlags {
        use_huffman,
        use_refagg,
        delta_height_table,
        delta_width_table,
        bitmap_size_table,
        aggregate_instance_table,
        bitmap_cc_used,
        bitmap_cc_retained,
        template,
        refinement_template,
    };

    // "If SDHUFF is 1, then this field is not present." (7.4.2.1.2)
    let at = if !use_huffman {
        parse_at_pixels(reader, template.at_pixel_count(false))?
    } else {
        AtPixels::new()
    };

    // "This field is only present if SDREFAGG is 1 and SDRTEMPLATE is 0."
    // (7.4.2.1.3)
    let refinement_at = if use_refagg && refinement_template == RefinementTemplate::Template0 {
        parse_refinement_at_pixels(reader)?
    } else {
        AtPixels::new()
    };

    let num_exported = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;
    let num_new = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;

    Ok(SymbolDictionaryHeader {
        flags,
        at,
        refinement_at,
        num_exported,
        num_new,
    })
}

/// Decode a symbol dictionary segment (6.5.5).
///
/// `input_symbols` is `SDINSYMS`: the concatenated exports of the referred
/// symbol dictionaries, in referral order. `inherited` is the last referred
/// dictionary, whose retained estimator state is adopted when the bitmap
/// coding context used flag is set.
pub(crate) fn decode(
    reader: &mut Reader<'_>,
    input_symbols: &[&Bitmap],
    inherited: Option<&SymbolDictionary>,
    referred_tables: &[&HuffmanTable],
) -> Result<SymbolDictionary> {
    let header = parse(reader)?;
    let flags = &header.flags;

    let num_input = input_symbols.len() as u32;
    let total_symbols = num_input
        .checked_add(header.num_new)
        .ok_or(SymbolError::TooManySymbols)?;

    // "SDNUMINSYMS + SDNUMNEWSYMS symbols need ⌈log2(...)⌉ bits." (6.5.8.2.3)
    let mut symbol_code_length = 32 - total_symbols.saturating_sub(1).leading_zeros();
    if flags.use_huffman {
        symbol_code_length = symbol_code_length.max(1);
    }

    // Huffman table selection (7.4.2.1.6).
    let mut referred_idx = 0;

    let (dh_table, dw_table, bm_size_table, agg_inst_table) = if flags.use_huffman {
        let dh = match flags.delta_height_table {
            0 => &*huffman::TABLE_D,
            1 => &*huffman::TABLE_E,
            3 => huffman::take_referred(referred_tables, &mut referred_idx)?,
            _ => bail!(HuffmanError::InvalidSelection),
        };
        let dw = match flags.delta_width_table {
            0 => &*huffman::TABLE_B,
            1 => &*huffman::TABLE_C,
            3 => huffman::take_referred(referred_tables, &mut referred_idx)?,
            _ => bail!(HuffmanError::InvalidSelection),
        };
        let bm_size = match flags.bitmap_size_table {
            0 => &*huffman::TABLE_A,
            _ => huffman::take_referred(referred_tables, &mut referred_idx)?,
        };
        let agg_inst = match flags.aggregate_instance_table {
            0 => &*huffman::TABLE_A,
            _ => huffman::take_referred(referred_tables, &mut referred_idx)?,
        };
        (dh, dw, bm_size, agg_inst)
    } else {
        let a = &*huffman::TABLE_A;
        (a, a, a, a)
    };

    let mut decoder = ArithmeticDecoder::from_reader(reader);
    let mut int_stats = IntStats::new(symbol_code_length);
    let mut generic_cx = DecoderStats::new(flags.template.context_size());
    let mut refinement_cx = DecoderStats::new(flags.refinement_template.context_size());

    if !flags.use_huffman {
        let previous = if flags.bitmap_cc_used {
            inherited.and_then(|dict| dict.generic_stats.as_ref())
        } else {
            None
        };
        generic_cx.reset_or_adopt(flags.template.context_size(), previous);
        int_stats.reset(symbol_code_length);
    }

    if flags.use_refagg {
        let previous = if flags.bitmap_cc_used {
            inherited.and_then(|dict| dict.refinement_stats.as_ref())
        } else {
            None
        };
        refinement_cx.reset_or_adopt(flags.refinement_template.context_size(), previous);
    }

    let mut new_symbols: Vec<Bitmap> = Vec::with_capacity(header.num_new as usize);
    // Symbol widths, needed to split collective bitmaps (SDHUFF = 1,
    // SDREFAGG = 0 only).
    let mut symbol_widths: Vec<u32> = Vec::new();
    let mut num_decoded: u32 = 0;
    let mut height_class_height: u32 = 0;

    // "4) Decode each height class as follows:" (6.5.5)
    while num_decoded < header.num_new {
        // "b) Decode the height class delta height ... HCHEIGHT = HCHEIGHT +
        // HCDH" (6.5.5)
        let delta_height = if flags.use_huffman {
            dh_table.decode(reader)?
        } else {
            decoder.decode_int(&mut int_stats.iadh)
        };
        let Some(delta_height) = delta_height else {
            warn!("symbol dictionary ended its height classes early");
            break;
        };

        height_class_height = height_class_height
            .checked_add_signed(delta_height)
            .ok_or(RegionError::InvalidDimension)?;

        let mut symbol_width: u32 = 0;
        let mut total_width: u32 = 0;
        let height_class_first = num_decoded;

        // "c) Decode each symbol within the height class:" (6.5.5)
        loop {
            // "i) Decode the delta width ... If the result of this decoding
            // is OOB then all the symbols in this height class have been
            // decoded." (6.5.5)
            let delta_width = if flags.use_huffman {
                dw_table.decode(reader)?
            } else {
                decoder.decode_int(&mut int_stats.iadw)
            };
            let Some(delta_width) = delta_width else {
                break;
            };

            if num_decoded >= header.num_new {
                bail!(SymbolError::TooManySymbols);
            }

            symbol_width = symbol_width
                .checked_add_signed(delta_width)
                .ok_or(RegionError::InvalidDimension)?;
            total_width = total_width
                .checked_add(symbol_width)
                .ok_or(RegionError::InvalidDimension)?;

            if symbol_width == 0 || height_class_height == 0 {
                bail!(RegionError::InvalidDimension);
            }

            if flags.use_huffman && !flags.use_refagg {
                // The bitmap is deferred: this height class is coded as one
                // collective bitmap, split after the class ends (6.5.9).
                symbol_widths.push(symbol_width);
            } else if flags.use_refagg {
                let symbol = decode_refagg_symbol(
                    reader,
                    &mut decoder,
                    &mut int_stats,
                    &mut refinement_cx,
                    agg_inst_table,
                    &header,
                    input_symbols,
                    &new_symbols,
                    symbol_code_length,
                    symbol_width,
                    height_class_height,
                )?;
                new_symbols.push(symbol);
            } else {
                // "ii) Decode the symbol's bitmap using a generic region
                // decoding procedure." (6.5.8.1)
                let params = generic::GenericParams {
                    width: symbol_width,
                    height: height_class_height,
                    template: flags.template,
                    use_ext_templates: false,
                    tpgdon: false,
                    at: header.at.clone(),
                };
                let symbol = generic::decode_bitmap(&mut decoder, &mut generic_cx, &params)?;
                new_symbols.push(symbol);
            }

            num_decoded += 1;
        }

        if flags.use_huffman && !flags.use_refagg {
            decode_collective_bitmap(
                reader,
                bm_size_table,
                &mut new_symbols,
                &symbol_widths[height_class_first as usize..num_decoded as usize],
                total_width,
                height_class_height,
            )?;
        }
    }

    let exported = export_symbols(
        reader,
        &mut decoder,
        &mut int_stats,
        flags.use_huffman,
        input_symbols,
        &new_symbols,
        header.num_exported,
    )?;

    let mut dictionary = SymbolDictionary {
        exported,
        generic_stats: None,
        refinement_stats: None,
    };

    // "If the bitmap coding context retained flag is 1, then the contents of
    // the generic region (and refinement) coding contexts are retained."
    // (7.4.2.1.1)
    if !flags.use_huffman && flags.bitmap_cc_retained {
        dictionary.generic_stats = Some(generic_cx);
        if flags.use_refagg {
            dictionary.refinement_stats = Some(refinement_cx);
        }
    }

    reader.align();

    Ok(dictionary)
}

/// Decode one symbol with refinement/aggregate coding (6.5.8.2).
#[allow(clippy::too_many_arguments)]
fn decode_refagg_symbol(
    reader: &mut Reader<'_>,
    decoder: &mut ArithmeticDecoder<'_>,
    int_stats: &mut IntStats,
    refinement_cx: &mut DecoderStats,
    agg_inst_table: &HuffmanTable,
    header: &SymbolDictionaryHeader,
    input_symbols: &[&Bitmap],
    new_symbols: &[Bitmap],
    symbol_code_length: u32,
    symbol_width: u32,
    height_class_height: u32,
) -> Result<Bitmap> {
    let flags = &header.flags;

    // "6.5.8.2.1 Number of symbol instances in aggregation"
    let instances = if flags.use_huffman {
        agg_inst_table.decode_no_oob(reader)?
    } else {
        decoder
            .decode_int(&mut int_stats.iaai)
            .ok_or(SymbolError::UnexpectedOob)?
    };

    if instances == 1 {
        // "6.5.8.2.2 Decoding a bitmap when REFAGGNINST = 1"
        let (id, rdx, rdy) = if flags.use_huffman {
            let id = reader
                .read_bits(symbol_code_length as u8)
                .ok_or(ParseError::UnexpectedEof)? as usize;
            let rdx = huffman::TABLE_O.decode_no_oob(reader)?;
            let rdy = huffman::TABLE_O.decode_no_oob(reader)?;
            (id, rdx, rdy)
        } else {
            let id = decoder.decode_iaid(symbol_code_length, &mut int_stats.iaid) as usize;
            let rdx = decoder
                .decode_int(&mut int_stats.iardx)
                .ok_or(SymbolError::UnexpectedOob)?;
            let rdy = decoder
                .decode_int(&mut int_stats.iardy)
                .ok_or(SymbolError::UnexpectedOob)?;
            (id, rdx, rdy)
        };

        let reference = if id < input_symbols.len() {
            input_symbols[id]
        } else {
            new_symbols
                .get(id - input_symbols.len())
                .ok_or(SymbolError::OutOfRange)?
        };

        let mut symbol = Bitmap::new(symbol_width, height_class_height);

        if flags.use_huffman {
            // The refinement data is a BMSIZE-delimited arithmetic window
            // with fresh contexts (6.5.8.2.2, Table 18).
            let size = huffman::TABLE_A.decode_no_oob(reader)?;
            if size < 0 {
                bail!(HuffmanError::InvalidCode);
            }
            reader.align();
            let data = reader
                .read_bytes(size as usize)
                .ok_or(ParseError::UnexpectedEof)?;

            let mut window_decoder = ArithmeticDecoder::new(data);
            let mut window_cx = DecoderStats::new(flags.refinement_template.context_size());
            refinement::decode_bitmap(
                &mut window_decoder,
                &mut window_cx,
                &mut symbol,
                reference,
                rdx,
                rdy,
                flags.refinement_template,
                &header.refinement_at,
                false,
            )?;
        } else {
            refinement::decode_bitmap(
                decoder,
                refinement_cx,
                &mut symbol,
                reference,
                rdx,
                rdy,
                flags.refinement_template,
                &header.refinement_at,
                false,
            )?;
        }

        Ok(symbol)
    } else {
        // "2) If REFAGGNINST is greater than one, then decode the bitmap
        // itself using a text region decoding procedure as described in 6.4.
        // Set the parameters to this decoding procedure as shown in
        // Table 17." (6.5.8.2)
        let instances = u32::try_from(instances).map_err(|_| SymbolError::UnexpectedOob)?;

        let mut pool: Vec<&Bitmap> =
            Vec::with_capacity(input_symbols.len() + new_symbols.len());
        pool.extend(input_symbols.iter().copied());
        pool.extend(new_symbols.iter());

        let params = TextParams {
            width: symbol_width,
            height: height_class_height,
            num_instances: instances,
            log_strip_size: 0,
            default_pixel: false,
            combination_operator: CombinationOperator::Or,
            transposed: false,
            reference_corner: ReferenceCorner::TopLeft,
            ds_offset: 0,
            refine: true,
            refinement_template: flags.refinement_template,
            refinement_at: &header.refinement_at,
        };

        if flags.use_huffman {
            // Table 17 fixes the table selection for aggregates; symbol IDs
            // are plain fixed-length codes.
            let symbol_codes =
                HuffmanTable::fixed_length(pool.len() as u32, symbol_code_length as u8);
            return decode_aggregate_huffman(reader, &pool, &params, symbol_codes);
        }

        let ctx = TextDecodeContext::Arithmetic {
            decoder,
            stats: int_stats,
            refinement_cx,
            symbol_code_length,
        };
        decode_with(ctx, &pool, &params)
    }
}

fn decode_aggregate_huffman(
    reader: &mut Reader<'_>,
    pool: &[&Bitmap],
    params: &TextParams<'_>,
    symbol_codes: HuffmanTable,
) -> Result<Bitmap> {
    let tables = TextHuffmanTables {
        first_s: &huffman::TABLE_F,
        delta_s: &huffman::TABLE_H,
        delta_t: &huffman::TABLE_K,
        refinement_width: &huffman::TABLE_O,
        refinement_height: &huffman::TABLE_O,
        refinement_x: &huffman::TABLE_O,
        refinement_y: &huffman::TABLE_O,
        refinement_size: &huffman::TABLE_A,
    };

    let ctx = TextDecodeContext::Huffman {
        reader,
        tables,
        symbol_codes: &symbol_codes,
    };

    decode_with(ctx, pool, params)
}

/// Decode a height class collective bitmap and split it into symbols
/// (6.5.9).
fn decode_collective_bitmap(
    reader: &mut Reader<'_>,
    bm_size_table: &HuffmanTable,
    new_symbols: &mut Vec<Bitmap>,
    widths: &[u32],
    total_width: u32,
    height: u32,
) -> Result<()> {
    // "1) Decode the size of the collective bitmap using the SDHUFFBMSIZE
    // table." (6.5.9)
    let bm_size = bm_size_table.decode_no_oob(reader)?;
    if bm_size < 0 {
        bail!(HuffmanError::InvalidCode);
    }

    // "2) Skip over any bits remaining in the last byte read." (6.5.9)
    reader.align();

    if total_width == 0 {
        reader
            .skip_bytes(bm_size as usize)
            .ok_or(ParseError::UnexpectedEof)?;
        return Ok(());
    }

    let collective = if bm_size == 0 {
        // "3) If BMSIZE is 0, then the bitmap is present in uncompressed
        // form." (6.5.9)
        let row_bytes = (total_width as usize).div_ceil(8);
        let mut bitmap = Bitmap::new(total_width, height);

        for y in 0..height {
            let row = reader
                .read_bytes(row_bytes)
                .ok_or(ParseError::UnexpectedEof)?;
            let base = bitmap.byte_index(0, y);
            for (i, &byte) in row.iter().enumerate() {
                bitmap.set_byte(base + i, byte);
            }
            // Keep row padding zero.
            if total_width & 7 != 0 {
                let index = bitmap.byte_index(total_width - 1, y);
                let byte = bitmap.get_byte(index);
                bitmap.set_byte(index, byte & (0xFF << (8 - (total_width & 7))));
            }
        }

        bitmap
    } else {
        // "4) Otherwise, decode the bitmap using a generic bitmap decoding
        // procedure ... MMR = 1." (6.5.9, Table 19)
        let data = reader
            .read_bytes(bm_size as usize)
            .ok_or(ParseError::UnexpectedEof)?;
        let (bitmap, _) = MmrDecoder::new(data, total_width, height).uncompress()?;
        bitmap
    };

    // "Break up the bitmap B_HC ... the symbols are concatenated
    // left-to-right, with no intervening gaps." (6.5.5, 4d)
    let mut x = 0;
    for &width in widths {
        new_symbols.push(collective.extract(x, 0, width, height));
        x += width;
    }

    Ok(())
}

/// The export flag pass (6.5.10).
#[allow(clippy::too_many_arguments)]
fn export_symbols(
    reader: &mut Reader<'_>,
    decoder: &mut ArithmeticDecoder<'_>,
    int_stats: &mut IntStats,
    use_huffman: bool,
    input_symbols: &[&Bitmap],
    new_symbols: &[Bitmap],
    num_exported: u32,
) -> Result<Vec<Bitmap>> {
    let total = input_symbols.len() + new_symbols.len();

    // "1) Set: EXINDEX = 0, CUREXFLAG = 0" (6.5.10)
    let mut index: usize = 0;
    let mut export = false;
    let mut exported = Vec::with_capacity(num_exported as usize);

    // "5) Repeat steps 2) through 4) until EXINDEX = SDNUMINSYMS +
    // SDNUMNEWSYMS." (6.5.10)
    while index < total {
        // "2) Decode a value using Table B.1 if SDHUFF is 1, or the IAEX
        // integer arithmetic decoding procedure if SDHUFF is 0." (6.5.10)
        let run = if use_huffman {
            huffman::TABLE_A.decode_no_oob(reader)?
        } else {
            decoder
                .decode_int(&mut int_stats.iaex)
                .ok_or(SymbolError::UnexpectedOob)?
        };

        if run < 0 || index + run as usize > total {
            bail!(SymbolError::ExportMismatch);
        }

        if export {
            for i in index..index + run as usize {
                let symbol = if i < input_symbols.len() {
                    input_symbols[i].clone()
                } else {
                    new_symbols[i - input_symbols.len()].clone()
                };
                exported.push(symbol);
            }
        }

        index += run as usize;
        export = !export;
    }

    if exported.len() != num_exported as usize {
        bail!(SymbolError::ExportMismatch);
    }

    Ok(exported)
}
