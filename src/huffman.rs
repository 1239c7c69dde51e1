//! Huffman-coded integer decoding (Annex B).
//!
//! A table is a list of lines, each pairing a prefix code with a value range:
//! decoding walks the canonical prefix tree bit by bit, then reads RANGELEN
//! extra bits and offsets them against the line's RANGELOW (B.4). The
//! fifteen standard tables of B.1–B.15 are built once; custom tables arrive
//! in their own segments (7.4.13) and are decoded per B.2.

use std::sync::LazyLock;

use crate::error::{HuffmanError, ParseError, Result, bail};
use crate::reader::Reader;

/// One line of a code table (B.1).
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableLine {
    /// "RANGELOW - The lower end of the range covered by the line." For
    /// lower range lines this is instead the upper end.
    range_low: i32,
    /// "PREFLEN - The length of the line's prefix code, in bits."
    preflen: u8,
    /// "RANGELEN - The number of value bits the line codes."
    range_len: u8,
    /// A lower range line covers −∞…`range_low` and subtracts its offset.
    is_lower: bool,
    /// The out-of-band line (HTOOB = 1 tables only).
    is_oob: bool,
}

impl TableLine {
    pub(crate) const fn new(range_low: i32, preflen: u8, range_len: u8) -> Self {
        Self {
            range_low,
            preflen,
            range_len,
            is_lower: false,
            is_oob: false,
        }
    }

    /// The lower range line, covering −∞...`range_high`.
    const fn lower(range_high: i32, preflen: u8) -> Self {
        Self {
            range_low: range_high,
            preflen,
            range_len: 32,
            is_lower: true,
            is_oob: false,
        }
    }

    /// The upper range line, covering `range_low`...+∞.
    const fn upper(range_low: i32, preflen: u8) -> Self {
        Self {
            range_low,
            preflen,
            range_len: 32,
            is_lower: false,
            is_oob: false,
        }
    }

    /// The out-of-band line.
    const fn oob(preflen: u8) -> Self {
        Self {
            range_low: 0,
            preflen,
            range_len: 0,
            is_lower: false,
            is_oob: true,
        }
    }
}

/// A node of the prefix tree, stored in a flat arena indexed by `u32`.
#[derive(Debug, Clone, Copy)]
enum Node {
    Branch { zero: u32, one: u32 },
    Leaf(TableLine),
}

/// Sentinel for an absent child (not every prefix is assigned).
const NO_CHILD: u32 = u32::MAX;

/// A runtime Huffman table.
#[derive(Debug, Clone)]
pub(crate) struct HuffmanTable {
    nodes: Vec<Node>,
}

impl HuffmanTable {
    /// Build a table from its lines, assigning canonical prefix codes.
    ///
    /// This implements B.3 "Assigning the prefix codes": count the lines per
    /// prefix length, derive the first code of each length, then hand out
    /// consecutive codes in line order.
    pub(crate) fn build(lines: &[TableLine]) -> Self {
        let len_max = lines.iter().map(|line| line.preflen).max().unwrap_or(0) as usize;

        // "LENCOUNT[I] is the number of times that the value I occurs in the
        // array PREFLEN." (B.3, step 1)
        let mut len_count = vec![0_u32; len_max + 1];
        for line in lines {
            len_count[line.preflen as usize] += 1;
        }
        len_count[0] = 0;

        // "FIRSTCODE[CURLEN] = (FIRSTCODE[CURLEN − 1] + LENCOUNT[CURLEN − 1]) × 2"
        // (B.3, step 3a)
        let mut codes = vec![0_u32; lines.len()];
        let mut first_code = 0_u32;
        for cur_len in 1..=len_max {
            first_code = (first_code + len_count[cur_len - 1]) * 2;
            let mut cur_code = first_code;

            for (i, line) in lines.iter().enumerate() {
                if line.preflen as usize == cur_len {
                    codes[i] = cur_code;
                    cur_code += 1;
                }
            }
        }

        let mut table = Self {
            nodes: vec![Node::Branch {
                zero: NO_CHILD,
                one: NO_CHILD,
            }],
        };

        // "The PREFLEN value 0 indicates that the table line is never used."
        // (B.3)
        for (i, line) in lines.iter().enumerate() {
            if line.preflen != 0 {
                table.insert(codes[i], *line);
            }
        }

        table
    }

    /// Insert a line under its prefix code, creating branches as needed.
    fn insert(&mut self, code: u32, line: TableLine) {
        let mut node = 0_usize;

        for bit_pos in (0..line.preflen).rev() {
            let bit = (code >> bit_pos) & 1;
            let next = self.nodes.len() as u32;

            let Node::Branch { zero, one } = &mut self.nodes[node] else {
                // Prefix codes are prefix-free by construction.
                unreachable!("huffman prefix collision");
            };

            let child = if bit == 0 { zero } else { one };
            if *child == NO_CHILD {
                *child = next;
                node = next as usize;
                let new_node = if bit_pos == 0 {
                    Node::Leaf(line)
                } else {
                    Node::Branch {
                        zero: NO_CHILD,
                        one: NO_CHILD,
                    }
                };
                self.nodes.push(new_node);
            } else {
                node = *child as usize;
            }
        }
    }

    /// Decode one value (B.4). Returns `None` for the out-of-band line.
    pub(crate) fn decode(&self, reader: &mut Reader<'_>) -> Result<Option<i32>> {
        let mut node = 0_usize;

        loop {
            match self.nodes[node] {
                Node::Branch { zero, one } => {
                    let bit = reader.read_bit().ok_or(ParseError::UnexpectedEof)?;
                    let child = if bit == 0 { zero } else { one };
                    if child == NO_CHILD {
                        bail!(HuffmanError::InvalidCode);
                    }
                    node = child as usize;
                }
                Node::Leaf(line) => {
                    if line.is_oob {
                        return Ok(None);
                    }

                    // "Decode the HTOFFSET value by reading RANGELEN bits."
                    // (B.4, step 3)
                    let offset = reader
                        .read_bits(line.range_len)
                        .ok_or(ParseError::UnexpectedEof)? as i32;

                    let value = if line.is_lower {
                        line.range_low.wrapping_sub(offset)
                    } else {
                        line.range_low.wrapping_add(offset)
                    };

                    return Ok(Some(value));
                }
            }
        }
    }

    /// Decode one value, treating the out-of-band line as an error.
    pub(crate) fn decode_no_oob(&self, reader: &mut Reader<'_>) -> Result<i32> {
        self.decode(reader)?
            .ok_or_else(|| HuffmanError::UnexpectedOob.into())
    }

    /// Build a table assigning fixed-length codes 0..`count`, each coding its
    /// own index. Used for the symbol IDs of refinement/aggregate coding
    /// (6.5.8.2.3, SDHUFF = 1).
    pub(crate) fn fixed_length(count: u32, code_len: u8) -> Self {
        let lines: Vec<TableLine> = (0..count)
            .map(|value| TableLine::new(value as i32, code_len, 0))
            .collect();
        Self::build(&lines)
    }

    /// Decode a custom code table segment (B.2, segment type 7.4.13).
    pub(crate) fn read_custom(reader: &mut Reader<'_>) -> Result<Self> {
        // "B.2 1) Decode the code table flags field."
        let flags = reader.read_byte().ok_or(ParseError::UnexpectedEof)?;

        // "Bit 0 is HTOOB for this code table."
        let htoob = flags & 1 != 0;
        // "Bits 1-3 specify the value of HTPS – 1."
        let htps = ((flags >> 1) & 7) + 1;
        // "Bits 4-6 specify the value of HTRS – 1."
        let htrs = ((flags >> 4) & 7) + 1;

        // "2) Decode the code table lowest value field HTLOW."
        let htlow = reader.read_i32().ok_or(ParseError::UnexpectedEof)?;
        // "3) Decode the code table highest value field HTHIGH."
        let hthigh = reader.read_i32().ok_or(ParseError::UnexpectedEof)?;

        let mut lines = Vec::new();
        let mut cur_range_low = htlow;

        // "Repeat ... until CURRANGELOW ≥ HTHIGH." (B.2, step 4)
        while cur_range_low < hthigh {
            let preflen = reader.read_bits(htps).ok_or(ParseError::UnexpectedEof)? as u8;
            let range_len = reader.read_bits(htrs).ok_or(ParseError::UnexpectedEof)? as u8;
            lines.push(TableLine::new(cur_range_low, preflen, range_len));

            let range_size = 1_i64 << range_len.min(32);
            let next = cur_range_low as i64 + range_size;
            if next > i32::MAX as i64 {
                break;
            }
            cur_range_low = next as i32;
        }

        // "5) Decode the lower range table line."
        let preflen = reader.read_bits(htps).ok_or(ParseError::UnexpectedEof)? as u8;
        lines.push(TableLine::lower(htlow - 1, preflen));

        // "6) Decode the upper range table line."
        let preflen = reader.read_bits(htps).ok_or(ParseError::UnexpectedEof)? as u8;
        lines.push(TableLine::upper(cur_range_low, preflen));

        // "7) If HTOOB is 1, decode the out-of-band table line."
        if htoob {
            let preflen = reader.read_bits(htps).ok_or(ParseError::UnexpectedEof)? as u8;
            lines.push(TableLine::oob(preflen));
        }

        Ok(Self::build(&lines))
    }
}

/// Take the next referred custom table during table selection (7.4.2.1.6,
/// 7.4.3.1.6): each "user supplied" selection consumes one code table
/// segment from the referred-to list, in order.
pub(crate) fn take_referred<'t>(
    tables: &[&'t HuffmanTable],
    index: &mut usize,
) -> Result<&'t HuffmanTable> {
    let table = tables
        .get(*index)
        .copied()
        .ok_or(HuffmanError::MissingTables)?;
    *index += 1;
    Ok(table)
}

/// Table B.1 – Standard Huffman table A (HTOOB = 0)
pub(crate) static TABLE_A: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(0, 1, 4),      // 0...15
        TableLine::new(16, 2, 8),     // 16...271
        TableLine::new(272, 3, 16),   // 272...65807
        TableLine::upper(65808, 3),   // 65808...∞
    ])
});

/// Table B.2 – Standard Huffman table B (HTOOB = 1)
pub(crate) static TABLE_B: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(0, 1, 0),  // 0
        TableLine::new(1, 2, 0),  // 1
        TableLine::new(2, 3, 0),  // 2
        TableLine::new(3, 4, 3),  // 3...10
        TableLine::new(11, 5, 6), // 11...74
        TableLine::upper(75, 6),  // 75...∞
        TableLine::oob(6),        // OOB
    ])
});

/// Table B.3 – Standard Huffman table C (HTOOB = 1)
pub(crate) static TABLE_C: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(-256, 8, 8), // -256...-1
        TableLine::new(0, 1, 0),    // 0
        TableLine::new(1, 2, 0),    // 1
        TableLine::new(2, 3, 0),    // 2
        TableLine::new(3, 4, 3),    // 3...10
        TableLine::new(11, 5, 6),   // 11...74
        TableLine::lower(-257, 8),  // -∞...-257
        TableLine::upper(75, 7),    // 75...∞
        TableLine::oob(6),          // OOB
    ])
});

/// Table B.4 – Standard Huffman table D (HTOOB = 0)
pub(crate) static TABLE_D: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(1, 1, 0),  // 1
        TableLine::new(2, 2, 0),  // 2
        TableLine::new(3, 3, 0),  // 3
        TableLine::new(4, 4, 3),  // 4...11
        TableLine::new(12, 5, 6), // 12...75
        TableLine::upper(76, 5),  // 76...∞
    ])
});

/// Table B.5 – Standard Huffman table E (HTOOB = 0)
pub(crate) static TABLE_E: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(-255, 7, 8), // -255...0
        TableLine::new(1, 1, 0),    // 1
        TableLine::new(2, 2, 0),    // 2
        TableLine::new(3, 3, 0),    // 3
        TableLine::new(4, 4, 3),    // 4...11
        TableLine::new(12, 5, 6),   // 12...75
        TableLine::lower(-256, 7),  // -∞...-256
        TableLine::upper(76, 6),    // 76...∞
    ])
});

/// Table B.6 – Standard Huffman table F (HTOOB = 0)
pub(crate) static TABLE_F: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(-2048, 5, 10), // -2048...-1025
        TableLine::new(-1024, 4, 9),  // -1024...-513
        TableLine::new(-512, 4, 8),   // -512...-257
        TableLine::new(-256, 4, 7),   // -256...-129
        TableLine::new(-128, 5, 6),   // -128...-65
        TableLine::new(-64, 5, 5),    // -64...-33
        TableLine::new(-32, 4, 5),    // -32...-1
        TableLine::new(0, 2, 7),      // 0...127
        TableLine::new(128, 3, 7),    // 128...255
        TableLine::new(256, 3, 8),    // 256...511
        TableLine::new(512, 4, 9),    // 512...1023
        TableLine::new(1024, 4, 10),  // 1024...2047
        TableLine::lower(-2049, 6),   // -∞...-2049
        TableLine::upper(2048, 6),    // 2048...∞
    ])
});

/// Table B.7 – Standard Huffman table G (HTOOB = 0)
pub(crate) static TABLE_G: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(-1024, 4, 9), // -1024...-513
        TableLine::new(-512, 3, 8),  // -512...-257
        TableLine::new(-256, 4, 7),  // -256...-129
        TableLine::new(-128, 5, 6),  // -128...-65
        TableLine::new(-64, 5, 5),   // -64...-33
        TableLine::new(-32, 4, 5),   // -32...-1
        TableLine::new(0, 4, 5),     // 0...31
        TableLine::new(32, 5, 5),    // 32...63
        TableLine::new(64, 5, 6),    // 64...127
        TableLine::new(128, 4, 7),   // 128...255
        TableLine::new(256, 3, 8),   // 256...511
        TableLine::new(512, 3, 9),   // 512...1023
        TableLine::new(1024, 3, 10), // 1024...2047
        TableLine::lower(-1025, 5),  // -∞...-1025
        TableLine::upper(2048, 5),   // 2048...∞
    ])
});

/// Table B.8 – Standard Huffman table H (HTOOB = 1)
pub(crate) static TABLE_H: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(-15, 8, 3),  // -15...-8
        TableLine::new(-7, 9, 1),   // -7...-6
        TableLine::new(-5, 8, 1),   // -5...-4
        TableLine::new(-3, 9, 0),   // -3
        TableLine::new(-2, 7, 0),   // -2
        TableLine::new(-1, 4, 0),   // -1
        TableLine::new(0, 2, 1),    // 0...1
        TableLine::new(2, 5, 0),    // 2
        TableLine::new(3, 6, 0),    // 3
        TableLine::new(4, 3, 4),    // 4...19
        TableLine::new(20, 6, 1),   // 20...21
        TableLine::new(22, 4, 4),   // 22...37
        TableLine::new(38, 4, 5),   // 38...69
        TableLine::new(70, 5, 6),   // 70...133
        TableLine::new(134, 5, 7),  // 134...261
        TableLine::new(262, 6, 7),  // 262...389
        TableLine::new(390, 7, 8),  // 390...645
        TableLine::new(646, 6, 10), // 646...1669
        TableLine::lower(-16, 9),   // -∞...-16
        TableLine::upper(1670, 9),  // 1670...∞
        TableLine::oob(2),          // OOB
    ])
});

/// Table B.9 – Standard Huffman table I (HTOOB = 1)
pub(crate) static TABLE_I: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(-31, 8, 4),   // -31...-16
        TableLine::new(-15, 9, 2),   // -15...-12
        TableLine::new(-11, 8, 2),   // -11...-8
        TableLine::new(-7, 9, 1),    // -7...-6
        TableLine::new(-5, 7, 1),    // -5...-4
        TableLine::new(-3, 4, 1),    // -3...-2
        TableLine::new(-1, 3, 1),    // -1...0
        TableLine::new(1, 3, 1),     // 1...2
        TableLine::new(3, 5, 1),     // 3...4
        TableLine::new(5, 6, 1),     // 5...6
        TableLine::new(7, 3, 5),     // 7...38
        TableLine::new(39, 6, 2),    // 39...42
        TableLine::new(43, 4, 5),    // 43...74
        TableLine::new(75, 4, 6),    // 75...138
        TableLine::new(139, 5, 7),   // 139...266
        TableLine::new(267, 5, 8),   // 267...522
        TableLine::new(523, 6, 8),   // 523...778
        TableLine::new(779, 7, 9),   // 779...1290
        TableLine::new(1291, 6, 11), // 1291...3338
        TableLine::lower(-32, 9),    // -∞...-32
        TableLine::upper(3339, 9),   // 3339...∞
        TableLine::oob(2),           // OOB
    ])
});

/// Table B.10 – Standard Huffman table J (HTOOB = 1)
pub(crate) static TABLE_J: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(-21, 7, 4),   // -21...-6
        TableLine::new(-5, 8, 0),    // -5
        TableLine::new(-4, 7, 0),    // -4
        TableLine::new(-3, 5, 0),    // -3
        TableLine::new(-2, 2, 2),    // -2...1
        TableLine::new(2, 5, 0),     // 2
        TableLine::new(3, 6, 0),     // 3
        TableLine::new(4, 7, 0),     // 4
        TableLine::new(5, 8, 0),     // 5
        TableLine::new(6, 2, 6),     // 6...69
        TableLine::new(70, 5, 5),    // 70...101
        TableLine::new(102, 6, 5),   // 102...133
        TableLine::new(134, 6, 6),   // 134...197
        TableLine::new(198, 6, 7),   // 198...325
        TableLine::new(326, 6, 8),   // 326...581
        TableLine::new(582, 6, 9),   // 582...1093
        TableLine::new(1094, 6, 10), // 1094...2117
        TableLine::new(2118, 7, 11), // 2118...4165
        TableLine::lower(-22, 8),    // -∞...-22
        TableLine::upper(4166, 8),   // 4166...∞
        TableLine::oob(2),           // OOB
    ])
});

/// Table B.11 – Standard Huffman table K (HTOOB = 0)
pub(crate) static TABLE_K: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(1, 1, 0),   // 1
        TableLine::new(2, 2, 1),   // 2...3
        TableLine::new(4, 4, 0),   // 4
        TableLine::new(5, 4, 1),   // 5...6
        TableLine::new(7, 5, 1),   // 7...8
        TableLine::new(9, 5, 2),   // 9...12
        TableLine::new(13, 6, 2),  // 13...16
        TableLine::new(17, 7, 2),  // 17...20
        TableLine::new(21, 7, 3),  // 21...28
        TableLine::new(29, 7, 4),  // 29...44
        TableLine::new(45, 7, 5),  // 45...76
        TableLine::new(77, 7, 6),  // 77...140
        TableLine::upper(141, 7),  // 141...∞
    ])
});

/// Table B.12 – Standard Huffman table L (HTOOB = 0)
pub(crate) static TABLE_L: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(1, 1, 0),  // 1
        TableLine::new(2, 2, 0),  // 2
        TableLine::new(3, 3, 1),  // 3...4
        TableLine::new(5, 5, 0),  // 5
        TableLine::new(6, 5, 1),  // 6...7
        TableLine::new(8, 6, 1),  // 8...9
        TableLine::new(10, 7, 0), // 10
        TableLine::new(11, 7, 1), // 11...12
        TableLine::new(13, 7, 2), // 13...16
        TableLine::new(17, 7, 3), // 17...24
        TableLine::new(25, 7, 4), // 25...40
        TableLine::new(41, 8, 5), // 41...72
        TableLine::upper(73, 8),  // 73...∞
    ])
});

/// Table B.13 – Standard Huffman table M (HTOOB = 0)
pub(crate) static TABLE_M: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(1, 1, 0),  // 1
        TableLine::new(2, 3, 0),  // 2
        TableLine::new(3, 4, 0),  // 3
        TableLine::new(4, 5, 0),  // 4
        TableLine::new(5, 4, 1),  // 5...6
        TableLine::new(7, 3, 3),  // 7...14
        TableLine::new(15, 6, 1), // 15...16
        TableLine::new(17, 6, 2), // 17...20
        TableLine::new(21, 6, 3), // 21...28
        TableLine::new(29, 6, 4), // 29...44
        TableLine::new(45, 6, 5), // 45...76
        TableLine::new(77, 7, 6), // 77...140
        TableLine::upper(141, 7), // 141...∞
    ])
});

/// Table B.14 – Standard Huffman table N (HTOOB = 0)
pub(crate) static TABLE_N: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(-2, 3, 0), // -2
        TableLine::new(-1, 3, 0), // -1
        TableLine::new(0, 1, 0),  // 0
        TableLine::new(1, 3, 0),  // 1
        TableLine::new(2, 3, 0),  // 2
    ])
});

/// Table B.15 – Standard Huffman table O (HTOOB = 0)
pub(crate) static TABLE_O: LazyLock<HuffmanTable> = LazyLock::new(|| {
    HuffmanTable::build(&[
        TableLine::new(-24, 7, 4), // -24...-9
        TableLine::new(-8, 6, 2),  // -8...-5
        TableLine::new(-4, 5, 1),  // -4...-3
        TableLine::new(-2, 4, 0),  // -2
        TableLine::new(-1, 3, 0),  // -1
        TableLine::new(0, 1, 0),   // 0
        TableLine::new(1, 3, 0),   // 1
        TableLine::new(2, 4, 0),   // 2
        TableLine::new(3, 5, 1),   // 3...4
        TableLine::new(5, 6, 2),   // 5...8
        TableLine::new(9, 7, 4),   // 9...24
        TableLine::lower(-25, 7),  // -∞...-25
        TableLine::upper(25, 7),   // 25...∞
    ])
});

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(table: &HuffmanTable, data: &[u8]) -> Option<i32> {
        let mut reader = Reader::new(data);
        table.decode(&mut reader).unwrap()
    }

    #[test]
    fn table_a_code_lengths() {
        // Canonical codes for prefix lengths {1, 2, 3, 3}: 0, 10, 110, 111.
        // 0...15: one prefix bit plus four value bits.
        assert_eq!(decode_one(&TABLE_A, &[0b0_0000_000]), Some(0));
        assert_eq!(decode_one(&TABLE_A, &[0b0_0111_000]), Some(7));
        assert_eq!(decode_one(&TABLE_A, &[0b0_1111_000]), Some(15));

        // 16...271: prefix 10 plus eight value bits.
        assert_eq!(decode_one(&TABLE_A, &[0b10_000000, 0b00_000000]), Some(16));
        assert_eq!(decode_one(&TABLE_A, &[0b10_111111, 0b11_000000]), Some(271));

        // 272...: prefix 110 plus sixteen value bits.
        assert_eq!(decode_one(&TABLE_A, &[0b110_00000, 0x00, 0b000_00000]), Some(272));

        // 65808...∞: prefix 111 plus thirty-two value bits.
        assert_eq!(
            decode_one(&TABLE_A, &[0b111_00000, 0x00, 0x00, 0x00, 0b00000_000]),
            Some(65808)
        );
    }

    #[test]
    fn table_b_oob() {
        // Preflens {1, 2, 3, 4, 5, 6, 6}: OOB is the second 6-bit code 111111.
        assert_eq!(decode_one(&TABLE_B, &[0b111111_00]), None);
        assert_eq!(decode_one(&TABLE_B, &[0b111110_00, 0x00, 0x00, 0x00, 0x00]), Some(75));
        assert_eq!(decode_one(&TABLE_B, &[0b0_0000000]), Some(0));
    }

    #[test]
    fn table_o_is_symmetric_around_zero() {
        assert_eq!(decode_one(&TABLE_O, &[0b0_0000000]), Some(0));
        // Preflen-3 lines in order: -1 then 1 -> codes 100, 101.
        assert_eq!(decode_one(&TABLE_O, &[0b100_00000]), Some(-1));
        assert_eq!(decode_one(&TABLE_O, &[0b101_00000]), Some(1));
    }

    #[test]
    fn fixed_length_codes_are_identity() {
        let table = HuffmanTable::fixed_length(4, 2);
        assert_eq!(decode_one(&table, &[0b00_000000]), Some(0));
        assert_eq!(decode_one(&table, &[0b01_000000]), Some(1));
        assert_eq!(decode_one(&table, &[0b10_000000]), Some(2));
        assert_eq!(decode_one(&table, &[0b11_000000]), Some(3));
    }

    #[test]
    fn custom_table_equivalent_to_table_a() {
        // The example of B.2: HTPS = 2, HTRS = 5, HTLOW = 0, HTHIGH = 65808,
        // lines (1,4), (2,8), (3,16) plus the lower/upper lines.
        let data = [
            0x42, // flags: HTOOB = 0, HTPS - 1 = 1, HTRS - 1 = 4
            0x00, 0x00, 0x00, 0x00, // HTLOW = 0
            0x00, 0x01, 0x01, 0x10, // HTHIGH = 65808
            0x49, 0x23, 0x81, 0x80, // packed table lines
        ];
        let mut reader = Reader::new(&data);
        let table = HuffmanTable::read_custom(&mut reader).unwrap();

        assert_eq!(decode_one(&table, &[0b0_1111_000]), Some(15));
        assert_eq!(decode_one(&table, &[0b10_000000, 0b00_000000]), Some(16));
        assert_eq!(
            decode_one(&table, &[0b110_00000, 0x00, 0b000_00000]),
            Some(272)
        );
        assert_eq!(
            decode_one(&table, &[0b111_00000, 0x00, 0x00, 0x00, 0b00000_000]),
            Some(65808)
        );
    }
}
