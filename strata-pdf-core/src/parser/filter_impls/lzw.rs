//! LZW decode implementation according to ISO 32000-1 Section 7.4.4
//!
//! Codes are 9 to 12 bits wide, packed MSB first. Code 256 clears the table,
//! code 257 ends the data, and the table never grows past 4096 entries.

use super::bit_reader::BitReader;
use crate::parser::{ParseError, ParseResult};

const CLEAR_TABLE: usize = 256;
const EOD: usize = 257;
const FIRST_FREE: usize = 258;
const MAX_ENTRIES: usize = 4096;
const MAX_CODE_WIDTH: u8 = 12;

pub(crate) struct LzwDecoder {
    early_change: bool,
    entries: Vec<Vec<u8>>,
}

impl LzwDecoder {
    pub(crate) fn new(early_change: bool) -> Self {
        let mut entries: Vec<Vec<u8>> = (0..=255u8).map(|b| vec![b]).collect();
        // Placeholders for the clear and EOD codes
        entries.push(Vec::new());
        entries.push(Vec::new());

        Self {
            early_change,
            entries,
        }
    }

    fn clear(&mut self) {
        self.entries.truncate(FIRST_FREE);
    }

    pub(crate) fn table_len(&self) -> usize {
        self.entries.len()
    }

    /// Width of the next code to read
    pub(crate) fn code_width(&self) -> u8 {
        let adjusted = self.entries.len() + usize::from(self.early_change);
        if adjusted >= 2048 {
            MAX_CODE_WIDTH
        } else if adjusted >= 1024 {
            11
        } else if adjusted >= 512 {
            10
        } else {
            9
        }
    }

    fn register(&mut self, entry: Vec<u8>) {
        if self.entries.len() < MAX_ENTRIES {
            self.entries.push(entry);
        }
    }

    pub(crate) fn decode(&mut self, data: &[u8]) -> ParseResult<Vec<u8>> {
        let mut reader = BitReader::new(data);
        let mut output = Vec::with_capacity(data.len() * 2);
        let mut prev: Option<usize> = None;

        loop {
            let offset = reader.bit_offset();
            // Running out of bits without EOD is tolerated
            let code = match reader.read_bits(self.code_width()) {
                Some(code) => code as usize,
                None => break,
            };

            match code {
                CLEAR_TABLE => {
                    self.clear();
                    prev = None;
                }
                EOD => break,
                code => {
                    let entry = match prev {
                        _ if code < self.entries.len() => {
                            let entry = self.entries[code].clone();
                            if let Some(prev) = prev {
                                let mut added = self.entries[prev].clone();
                                added.push(entry[0]);
                                self.register(added);
                            }
                            entry
                        }
                        // The code being defined right now: prev + first byte of prev
                        Some(prev) if code == self.entries.len() => {
                            let mut entry = self.entries[prev].clone();
                            entry.push(entry[0]);
                            self.register(entry.clone());
                            entry
                        }
                        _ => {
                            return Err(ParseError::filter(
                                "LZWDecode",
                                format!("invalid code {code} at bit {offset}"),
                            ))
                        }
                    };

                    output.extend_from_slice(&entry);
                    prev = Some(code);
                }
            }
        }

        Ok(output)
    }
}

/// Decode LZW-compressed bytes
pub fn decode_lzw(data: &[u8], early_change: bool) -> ParseResult<Vec<u8>> {
    LzwDecoder::new(early_change).decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Packs codes MSB first, choosing widths the way the decoder expects them
    struct CodeWriter {
        bytes: Vec<u8>,
        acc: u64,
        nbits: u32,
    }

    impl CodeWriter {
        fn new() -> Self {
            Self {
                bytes: Vec::new(),
                acc: 0,
                nbits: 0,
            }
        }

        fn write(&mut self, code: usize, width: u8) {
            self.acc = (self.acc << width) | code as u64;
            self.nbits += u32::from(width);
            while self.nbits >= 8 {
                self.nbits -= 8;
                self.bytes.push((self.acc >> self.nbits) as u8);
            }
        }

        fn finish(mut self) -> Vec<u8> {
            if self.nbits > 0 {
                self.bytes.push((self.acc << (8 - self.nbits)) as u8);
            }
            self.bytes
        }
    }

    fn width_for(table_len: usize, early_change: bool) -> u8 {
        let adjusted = table_len + usize::from(early_change);
        match adjusted {
            a if a >= 2048 => 12,
            a if a >= 1024 => 11,
            a if a >= 512 => 10,
            _ => 9,
        }
    }

    /// Greedy LZW encoder without mid-stream clear codes
    fn encode(input: &[u8], early_change: bool) -> Vec<u8> {
        let mut dict: HashMap<Vec<u8>, usize> =
            (0..=255u8).map(|b| (vec![b], usize::from(b))).collect();
        let mut next_code = FIRST_FREE;

        let mut writer = CodeWriter::new();
        let mut decoder_len = FIRST_FREE;
        let mut emitted = 0usize;
        let mut emit = |writer: &mut CodeWriter, code: usize| {
            writer.write(code, width_for(decoder_len, early_change));
            if emitted > 0 && decoder_len < MAX_ENTRIES {
                decoder_len += 1;
            }
            emitted += 1;
        };

        let mut current: Vec<u8> = Vec::new();
        for &byte in input {
            let mut candidate = current.clone();
            candidate.push(byte);
            if dict.contains_key(&candidate) {
                current = candidate;
            } else {
                emit(&mut writer, dict[&current]);
                if next_code < MAX_ENTRIES {
                    dict.insert(candidate, next_code);
                    next_code += 1;
                }
                current = vec![byte];
            }
        }
        if !current.is_empty() {
            emit(&mut writer, dict[&current]);
        }
        emit(&mut writer, EOD);
        writer.finish()
    }

    fn pseudo_random_bytes(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    #[test]
    fn test_lzw_reference_example() {
        // Example from ISO 32000-1 Section 7.4.4.2
        let data = [0x80, 0x0B, 0x60, 0x50, 0x22, 0x0C, 0x0C, 0x85, 0x01];
        let decoded = decode_lzw(&data, true).unwrap();
        assert_eq!(decoded, vec![45, 45, 45, 45, 45, 65, 45, 45, 45, 66]);
    }

    #[test]
    fn test_lzw_code_width_thresholds() {
        let mut decoder = LzwDecoder::new(true);
        assert_eq!(decoder.code_width(), 9);

        decoder.entries.resize(511, Vec::new());
        assert_eq!(decoder.code_width(), 10);

        let mut late = LzwDecoder::new(false);
        late.entries.resize(511, Vec::new());
        assert_eq!(late.code_width(), 9);
        late.entries.resize(512, Vec::new());
        assert_eq!(late.code_width(), 10);
    }

    #[test]
    fn test_lzw_table_full_stops_growth_at_12_bits() {
        let input = pseudo_random_bytes(20_000);
        let encoded = encode(&input, true);

        let mut decoder = LzwDecoder::new(true);
        let decoded = decoder.decode(&encoded).unwrap();

        assert_eq!(decoded, input);
        assert_eq!(decoder.table_len(), MAX_ENTRIES);
        assert_eq!(decoder.code_width(), 12);
    }

    #[test]
    fn test_lzw_round_trip_without_early_change() {
        let input = b"TOBEORNOTTOBEORTOBEORNOT#TOBEORNOTTOBEORTOBEORNOT".repeat(40);
        let encoded = encode(&input, false);
        assert_eq!(decode_lzw(&encoded, false).unwrap(), input);
    }

    #[test]
    fn test_lzw_clear_code_resets_table() {
        let mut writer = CodeWriter::new();
        writer.write(65, 9);
        writer.write(66, 9);
        writer.write(CLEAR_TABLE, 9);
        writer.write(67, 9);
        writer.write(258, 9);
        let data = writer.finish();

        // After the clear, code 258 is the in-flight entry "CC"
        let mut decoder = LzwDecoder::new(true);
        let decoded = decoder.decode(&data).unwrap();
        assert_eq!(decoded, b"ABCCC");
        assert_eq!(decoder.table_len(), FIRST_FREE + 1);
    }

    #[test]
    fn test_lzw_invalid_code() {
        let mut writer = CodeWriter::new();
        writer.write(65, 9);
        writer.write(400, 9);
        let data = writer.finish();

        let err = decode_lzw(&data, true).unwrap_err();
        assert!(matches!(err, ParseError::Filter { ref filter, .. } if filter == "LZWDecode"));
    }

    #[test]
    fn test_lzw_first_code_cannot_be_undefined() {
        let mut writer = CodeWriter::new();
        writer.write(258, 9);
        assert!(decode_lzw(&writer.finish(), true).is_err());
    }
}
