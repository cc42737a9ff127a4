//! CCITT Fax decode implementation according to ISO 32000-1 Section 7.4.6
//!
//! Decodes CCITT Group 3 (T.4, one- and two-dimensional) and Group 4 (T.6)
//! fax data into packed 1-bit rows.

use super::bit_reader::BitReader;
use crate::parser::objects::PdfDictionary;
use crate::parser::{ParseError, ParseResult};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// CCITT compression types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcittK {
    /// Pure two-dimensional encoding (Group 4)
    Group4,
    /// Pure one-dimensional encoding (Group 3, 1-D)
    Group3OneDimensional,
    /// Mixed one and two-dimensional encoding (Group 3, 2-D)
    Group3TwoDimensional,
}

/// CCITT decode parameters from DecodeParms dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcittDecodeParams {
    /// K parameter determines compression type
    pub k: CcittK,
    /// Width of the image in pixels
    pub columns: u32,
    /// Height of the image in pixels (0 means unknown)
    pub rows: u32,
    /// End-of-line patterns are present
    pub end_of_line: bool,
    /// Rows start on byte boundaries
    pub encoded_byte_align: bool,
    /// Data is terminated by an end-of-block pattern
    pub end_of_block: bool,
    /// 1 bits represent black pixels
    pub black_is_1: bool,
    /// Damaged rows tolerated before an error is reported
    pub damaged_rows_before_error: u32,
}

impl Default for CcittDecodeParams {
    fn default() -> Self {
        Self {
            k: CcittK::Group3OneDimensional,
            columns: 1728, // Standard fax width
            rows: 0,
            end_of_line: false,
            encoded_byte_align: false,
            end_of_block: true,
            black_is_1: false,
            damaged_rows_before_error: 0,
        }
    }
}

impl CcittDecodeParams {
    /// Parse CCITT decode parameters from PDF dictionary
    pub fn from_dict(dict: &PdfDictionary) -> Self {
        let mut params = CcittDecodeParams::default();
        let integer = |key: &str| dict.get(key).and_then(|obj| obj.as_integer());
        let boolean = |key: &str| dict.get(key).and_then(|obj| obj.as_bool());

        if let Some(k) = integer("K") {
            params.k = match k {
                k if k < 0 => CcittK::Group4,
                0 => CcittK::Group3OneDimensional,
                _ => CcittK::Group3TwoDimensional,
            };
        }

        if let Some(columns) = integer("Columns").or_else(|| integer("Width")) {
            params.columns = columns.clamp(1, i64::from(u32::MAX)) as u32;
        }
        if let Some(rows) = integer("Rows").or_else(|| integer("Height")) {
            params.rows = rows.clamp(0, i64::from(u32::MAX)) as u32;
        }
        if let Some(damaged) = integer("DamagedRowsBeforeError") {
            params.damaged_rows_before_error = damaged.clamp(0, i64::from(u32::MAX)) as u32;
        }

        if let Some(eol) = boolean("EndOfLine") {
            params.end_of_line = eol;
        }
        if let Some(align) = boolean("EncodedByteAlign") {
            params.encoded_byte_align = align;
        }
        if let Some(eob) = boolean("EndOfBlock") {
            params.end_of_block = eob;
        }
        if let Some(black_is_1) = boolean("BlackIs1") {
            params.black_is_1 = black_is_1;
        }

        params
    }
}

/// T.4 Table 2: white terminating codes as (run length, code length, code)
const WHITE_TERMINATING: [(u16, u8, u16); 64] = [
    (0, 8, 0b00110101),
    (1, 6, 0b000111),
    (2, 4, 0b0111),
    (3, 4, 0b1000),
    (4, 4, 0b1011),
    (5, 4, 0b1100),
    (6, 4, 0b1110),
    (7, 4, 0b1111),
    (8, 5, 0b10011),
    (9, 5, 0b10100),
    (10, 5, 0b00111),
    (11, 5, 0b01000),
    (12, 6, 0b001000),
    (13, 6, 0b000011),
    (14, 6, 0b110100),
    (15, 6, 0b110101),
    (16, 6, 0b101010),
    (17, 6, 0b101011),
    (18, 7, 0b0100111),
    (19, 7, 0b0001100),
    (20, 7, 0b0001000),
    (21, 7, 0b0010111),
    (22, 7, 0b0000011),
    (23, 7, 0b0000100),
    (24, 7, 0b0101000),
    (25, 7, 0b0101011),
    (26, 7, 0b0010011),
    (27, 7, 0b0100100),
    (28, 7, 0b0011000),
    (29, 8, 0b00000010),
    (30, 8, 0b00000011),
    (31, 8, 0b00011010),
    (32, 8, 0b00011011),
    (33, 8, 0b00010010),
    (34, 8, 0b00010011),
    (35, 8, 0b00010100),
    (36, 8, 0b00010101),
    (37, 8, 0b00010110),
    (38, 8, 0b00010111),
    (39, 8, 0b00101000),
    (40, 8, 0b00101001),
    (41, 8, 0b00101010),
    (42, 8, 0b00101011),
    (43, 8, 0b00101100),
    (44, 8, 0b00101101),
    (45, 8, 0b00000100),
    (46, 8, 0b00000101),
    (47, 8, 0b00001010),
    (48, 8, 0b00001011),
    (49, 8, 0b01010010),
    (50, 8, 0b01010011),
    (51, 8, 0b01010100),
    (52, 8, 0b01010101),
    (53, 8, 0b00100100),
    (54, 8, 0b00100101),
    (55, 8, 0b01011000),
    (56, 8, 0b01011001),
    (57, 8, 0b01011010),
    (58, 8, 0b01011011),
    (59, 8, 0b01001010),
    (60, 8, 0b01001011),
    (61, 8, 0b00110010),
    (62, 8, 0b00110011),
    (63, 8, 0b00110100),
];

/// T.4 Table 3: white make-up codes
const WHITE_MAKEUP: [(u16, u8, u16); 27] = [
    (64, 5, 0b11011),
    (128, 5, 0b10010),
    (192, 6, 0b010111),
    (256, 7, 0b0110111),
    (320, 8, 0b00110110),
    (384, 8, 0b00110111),
    (448, 8, 0b01100100),
    (512, 8, 0b01100101),
    (576, 8, 0b01101000),
    (640, 8, 0b01100111),
    (704, 9, 0b011001100),
    (768, 9, 0b011001101),
    (832, 9, 0b011010010),
    (896, 9, 0b011010011),
    (960, 9, 0b011010100),
    (1024, 9, 0b011010101),
    (1088, 9, 0b011010110),
    (1152, 9, 0b011010111),
    (1216, 9, 0b011011000),
    (1280, 9, 0b011011001),
    (1344, 9, 0b011011010),
    (1408, 9, 0b011011011),
    (1472, 9, 0b010011000),
    (1536, 9, 0b010011001),
    (1600, 9, 0b010011010),
    (1664, 6, 0b011000),
    (1728, 9, 0b010011011),
];

/// T.4 Table 2: black terminating codes
const BLACK_TERMINATING: [(u16, u8, u16); 64] = [
    (0, 10, 0b0000110111),
    (1, 3, 0b010),
    (2, 2, 0b11),
    (3, 2, 0b10),
    (4, 3, 0b011),
    (5, 4, 0b0011),
    (6, 4, 0b0010),
    (7, 5, 0b00011),
    (8, 6, 0b000101),
    (9, 6, 0b000100),
    (10, 7, 0b0000100),
    (11, 7, 0b0000101),
    (12, 7, 0b0000111),
    (13, 8, 0b00000100),
    (14, 8, 0b00000111),
    (15, 9, 0b000011000),
    (16, 10, 0b0000010111),
    (17, 10, 0b0000011000),
    (18, 10, 0b0000001000),
    (19, 11, 0b00001100111),
    (20, 11, 0b00001101000),
    (21, 11, 0b00001101100),
    (22, 11, 0b00000110111),
    (23, 11, 0b00000101000),
    (24, 11, 0b00000010111),
    (25, 11, 0b00000011000),
    (26, 12, 0b000011001010),
    (27, 12, 0b000011001011),
    (28, 12, 0b000011001100),
    (29, 12, 0b000011001101),
    (30, 12, 0b000001101000),
    (31, 12, 0b000001101001),
    (32, 12, 0b000001101010),
    (33, 12, 0b000001101011),
    (34, 12, 0b000011010010),
    (35, 12, 0b000011010011),
    (36, 12, 0b000011010100),
    (37, 12, 0b000011010101),
    (38, 12, 0b000011010110),
    (39, 12, 0b000011010111),
    (40, 12, 0b000001101100),
    (41, 12, 0b000001101101),
    (42, 12, 0b000011011010),
    (43, 12, 0b000011011011),
    (44, 12, 0b000001010100),
    (45, 12, 0b000001010101),
    (46, 12, 0b000001010110),
    (47, 12, 0b000001010111),
    (48, 12, 0b000001100100),
    (49, 12, 0b000001100101),
    (50, 12, 0b000001010010),
    (51, 12, 0b000001010011),
    (52, 12, 0b000000100100),
    (53, 12, 0b000000110111),
    (54, 12, 0b000000111000),
    (55, 12, 0b000000100111),
    (56, 12, 0b000000101000),
    (57, 12, 0b000001011000),
    (58, 12, 0b000001011001),
    (59, 12, 0b000000101011),
    (60, 12, 0b000000101100),
    (61, 12, 0b000001011010),
    (62, 12, 0b000001100110),
    (63, 12, 0b000001100111),
];

/// T.4 Table 3: black make-up codes
const BLACK_MAKEUP: [(u16, u8, u16); 27] = [
    (64, 10, 0b0000001111),
    (128, 12, 0b000011001000),
    (192, 12, 0b000011001001),
    (256, 12, 0b000001011011),
    (320, 12, 0b000000110011),
    (384, 12, 0b000000110100),
    (448, 12, 0b000000110101),
    (512, 13, 0b0000001101100),
    (576, 13, 0b0000001101101),
    (640, 13, 0b0000001001010),
    (704, 13, 0b0000001001011),
    (768, 13, 0b0000001001100),
    (832, 13, 0b0000001001101),
    (896, 13, 0b0000001110010),
    (960, 13, 0b0000001110011),
    (1024, 13, 0b0000001110100),
    (1088, 13, 0b0000001110101),
    (1152, 13, 0b0000001110110),
    (1216, 13, 0b0000001110111),
    (1280, 13, 0b0000001010010),
    (1344, 13, 0b0000001010011),
    (1408, 13, 0b0000001010100),
    (1472, 13, 0b0000001010101),
    (1536, 13, 0b0000001011010),
    (1600, 13, 0b0000001011011),
    (1664, 13, 0b0000001100100),
    (1728, 13, 0b0000001100101),
];

/// T.4 Table 3: make-up codes shared by both colors
const COMMON_MAKEUP: [(u16, u8, u16); 13] = [
    (1792, 11, 0b00000001000),
    (1856, 11, 0b00000001100),
    (1920, 11, 0b00000001101),
    (1984, 12, 0b000000010010),
    (2048, 12, 0b000000010011),
    (2112, 12, 0b000000010100),
    (2176, 12, 0b000000010101),
    (2240, 12, 0b000000010110),
    (2304, 12, 0b000000010111),
    (2368, 12, 0b000000011100),
    (2432, 12, 0b000000011101),
    (2496, 12, 0b000000011110),
    (2560, 12, 0b000000011111),
];

/// Two-dimensional coding modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Pass,
    Horizontal,
    Vertical(i8),
}

/// T.4 Table 4: mode codes
const MODE_CODES: [(Mode, u8, u16); 9] = [
    (Mode::Pass, 4, 0b0001),
    (Mode::Horizontal, 3, 0b001),
    (Mode::Vertical(0), 1, 0b1),
    (Mode::Vertical(1), 3, 0b011),
    (Mode::Vertical(2), 6, 0b000011),
    (Mode::Vertical(3), 7, 0b0000011),
    (Mode::Vertical(-1), 3, 0b010),
    (Mode::Vertical(-2), 6, 0b000010),
    (Mode::Vertical(-3), 7, 0b0000010),
];

const MAX_RUN_CODE_LENGTH: u8 = 13;
const MAX_MODE_CODE_LENGTH: u8 = 7;
const EOL: u32 = 0x001;
const EOFB: u32 = 0x001_001;

type CodeTable = HashMap<(u8, u16), u16>;

fn build_run_table(tables: &[&[(u16, u8, u16)]]) -> CodeTable {
    tables
        .iter()
        .flat_map(|table| table.iter())
        .map(|&(run, length, code)| ((length, code), run))
        .collect()
}

lazy_static! {
    static ref WHITE_CODES: CodeTable =
        build_run_table(&[&WHITE_TERMINATING, &WHITE_MAKEUP, &COMMON_MAKEUP]);
    static ref BLACK_CODES: CodeTable =
        build_run_table(&[&BLACK_TERMINATING, &BLACK_MAKEUP, &COMMON_MAKEUP]);
    static ref MODES: HashMap<(u8, u16), Mode> = MODE_CODES
        .iter()
        .map(|&(mode, length, code)| ((length, code), mode))
        .collect();
}

const WHITE: u8 = 0;
const BLACK: u8 = 1;

struct CcittDecoder<'a> {
    reader: BitReader<'a>,
    params: &'a CcittDecodeParams,
    columns: usize,
    /// Pixel colors of the previous row; starts as an imaginary white line
    reference: Vec<u8>,
}

impl<'a> CcittDecoder<'a> {
    fn new(data: &'a [u8], params: &'a CcittDecodeParams) -> Self {
        let columns = params.columns.max(1) as usize;
        Self {
            reader: BitReader::new(data),
            params,
            columns,
            reference: vec![WHITE; columns],
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> ParseError {
        ParseError::filter(
            "CCITTFaxDecode",
            format!("{message} at bit {}", self.reader.bit_offset()),
        )
    }

    fn decode(&mut self) -> ParseResult<Vec<u8>> {
        let row_bytes = self.columns.div_ceil(8);
        let mut output = Vec::new();
        let mut rows_decoded: u32 = 0;
        let mut damaged_rows: u32 = 0;

        loop {
            if self.params.rows > 0 && rows_decoded >= self.params.rows {
                break;
            }

            if rows_decoded > 0 && self.aligns_rows() {
                self.reader.align_to_byte();
            }

            let mut two_dimensional = self.params.k == CcittK::Group4;
            if self.params.k != CcittK::Group4 {
                // Return to control: consecutive EOLs end the block
                if self.skip_eols() >= 2 {
                    break;
                }
            } else if self.params.end_of_block && self.reader.peek_bits(24) == Some(EOFB) {
                self.reader.skip_bits(24);
                break;
            }

            if self.rest_is_padding() {
                break;
            }

            if self.params.k == CcittK::Group3TwoDimensional {
                two_dimensional = self.reader.read_bit() == Some(0);
            }

            let row_start = self.reader.clone();
            let decoded = if two_dimensional {
                self.decode_row_2d()
            } else {
                self.decode_row_1d()
            };
            let row = match decoded {
                Ok(row) => row,
                Err(err) if self.resyncs_on_eol() => {
                    damaged_rows += 1;
                    if damaged_rows > self.params.damaged_rows_before_error {
                        return Err(err);
                    }
                    tracing::warn!(
                        row = rows_decoded,
                        damaged = damaged_rows,
                        "Damaged CCITT row replaced by the previous one: {err}"
                    );
                    self.reader = row_start;
                    self.seek_next_eol();
                    self.reference.clone()
                }
                Err(err) => return Err(err),
            };

            let start = output.len();
            output.resize(start + row_bytes, 0);
            pack_row(&row, &mut output[start..], self.params.black_is_1);

            self.reference = row;
            rows_decoded += 1;
        }

        tracing::trace!(rows = rows_decoded, columns = self.columns, "CCITT decode finished");
        Ok(output)
    }

    fn aligns_rows(&self) -> bool {
        // With EOLs present the fill bits in front of each EOL do the aligning
        self.params.encoded_byte_align
            && (self.params.k == CcittK::Group4 || !self.params.end_of_line)
    }

    /// Rows framed by EOLs can be skipped when damaged
    fn resyncs_on_eol(&self) -> bool {
        self.params.k != CcittK::Group4 && self.params.end_of_line
    }

    fn rest_is_padding(&self) -> bool {
        let mut ahead = self.reader.clone();
        while let Some(bit) = ahead.read_bit() {
            if bit != 0 {
                return false;
            }
        }
        true
    }

    /// Count zero bits ahead of the reader without consuming them
    fn leading_zeros(&self) -> usize {
        let mut ahead = self.reader.clone();
        let mut zeros = 0;
        while ahead.read_bit() == Some(0) {
            zeros += 1;
        }
        zeros
    }

    /// Move past the current row to the start of the next EOL, or to the end of the data
    fn seek_next_eol(&mut self) {
        while self.reader.read_bit().is_some() {
            let zeros = self.leading_zeros();
            if zeros >= self.reader.bits_remaining() {
                self.reader.skip_bits(zeros);
                return;
            }
            if zeros >= 11 {
                return;
            }
        }
    }

    /// Skip fill bits and EOL codes, returning how many EOLs were consumed
    fn skip_eols(&mut self) -> usize {
        let mut count = 0;

        loop {
            let zeros = self.leading_zeros();
            if zeros < 11 || zeros >= self.reader.bits_remaining() {
                break;
            }
            self.reader.skip_bits(zeros + 1);
            count += 1;

            // In mixed mode each EOL of the return-to-control sequence carries a tag bit
            if self.params.k == CcittK::Group3TwoDimensional
                && self.reader.peek_bits(13) == Some((1 << 12) | EOL)
            {
                self.reader.skip_bits(1);
            }
        }

        count
    }

    fn read_run(&mut self, color: u8) -> ParseResult<usize> {
        let table: &CodeTable = if color == WHITE {
            &WHITE_CODES
        } else {
            &BLACK_CODES
        };

        let mut total = 0usize;
        loop {
            let mut code = 0u16;
            let mut length = 0u8;
            let run = loop {
                let bit = self
                    .reader
                    .read_bit()
                    .ok_or_else(|| self.error("unexpected end of data in run"))?;
                code = (code << 1) | u16::from(bit);
                length += 1;

                if let Some(&run) = table.get(&(length, code)) {
                    break run;
                }
                if length >= MAX_RUN_CODE_LENGTH {
                    return Err(self.error(format!(
                        "invalid {} run code",
                        if color == WHITE { "white" } else { "black" }
                    )));
                }
            };

            total += usize::from(run);
            // Make-up codes are followed by more codes until a terminating one
            if run < 64 {
                return Ok(total);
            }
        }
    }

    fn read_mode(&mut self) -> ParseResult<Mode> {
        let mut code = 0u16;
        for length in 1..=MAX_MODE_CODE_LENGTH {
            let bit = self
                .reader
                .read_bit()
                .ok_or_else(|| self.error("unexpected end of data in mode code"))?;
            code = (code << 1) | u16::from(bit);

            if let Some(&mode) = MODES.get(&(length, code)) {
                return Ok(mode);
            }
        }
        Err(self.error("invalid mode code"))
    }

    fn fill(&self, line: &mut Vec<u8>, count: usize, color: u8) {
        let end = (line.len() + count).min(self.columns);
        line.resize(end, color);
    }

    fn decode_row_1d(&mut self) -> ParseResult<Vec<u8>> {
        let mut line = Vec::with_capacity(self.columns);
        let mut color = WHITE;

        while line.len() < self.columns {
            let run = self.read_run(color)?;
            self.fill(&mut line, run, color);
            color ^= 1;
        }

        Ok(line)
    }

    /// First changing element on the reference line right of `a0` whose
    /// color is opposite to `color`.
    fn find_b1(&self, a0: Option<usize>, color: u8) -> usize {
        let (start, mut last) = match a0 {
            Some(a0) => (a0 + 1, self.reference[a0]),
            None => (0, WHITE),
        };

        for i in start..self.columns {
            let current = self.reference[i];
            if current != last && current != color {
                return i;
            }
            last = current;
        }
        self.columns
    }

    /// Next changing element after `b1`
    fn find_b2(&self, b1: usize) -> usize {
        if b1 >= self.columns {
            return self.columns;
        }
        let b1_color = self.reference[b1];
        (b1 + 1..self.columns)
            .find(|&i| self.reference[i] != b1_color)
            .unwrap_or(self.columns)
    }

    fn decode_row_2d(&mut self) -> ParseResult<Vec<u8>> {
        let mut line: Vec<u8> = Vec::with_capacity(self.columns);
        let mut color = WHITE;

        while line.len() < self.columns {
            let a0 = if line.is_empty() { None } else { Some(line.len()) };
            let b1 = self.find_b1(a0, color);

            match self.read_mode()? {
                Mode::Pass => {
                    let b2 = self.find_b2(b1);
                    let count = b2.saturating_sub(line.len());
                    self.fill(&mut line, count, color);
                }
                Mode::Horizontal => {
                    let first = self.read_run(color)?;
                    let second = self.read_run(color ^ 1)?;
                    self.fill(&mut line, first, color);
                    self.fill(&mut line, second, color ^ 1);
                }
                Mode::Vertical(delta) => {
                    let a1 = b1 as i64 + i64::from(delta);
                    if a1 < line.len() as i64 || a1 > self.columns as i64 {
                        return Err(self.error(format!("vertical mode offset {delta} out of range")));
                    }
                    let count = a1 as usize - line.len();
                    self.fill(&mut line, count, color);
                    color ^= 1;
                }
            }
        }

        Ok(line)
    }
}

/// Pack one row of pixel colors into bits, MSB first
fn pack_row(row: &[u8], out: &mut [u8], black_is_1: bool) {
    for (i, &pixel) in row.iter().enumerate() {
        let bit = if black_is_1 { pixel } else { pixel ^ 1 };
        if bit != 0 {
            out[i / 8] |= 0x80 >> (i % 8);
        }
    }
}

/// Decode CCITT fax data into packed rows (one bit per pixel, rows byte-padded)
pub fn decode_ccitt(data: &[u8], params: &CcittDecodeParams) -> ParseResult<Vec<u8>> {
    CcittDecoder::new(data, params).decode()
}
