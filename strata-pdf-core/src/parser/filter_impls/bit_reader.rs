//! MSB-first bit reader shared by the LZW and CCITT decoders

#[derive(Clone)]
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8, // 0-7, position within current byte
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Read a single bit (0 or 1)
    pub(crate) fn read_bit(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.byte_pos)?;
        let bit = (byte >> (7 - self.bit_pos)) & 1;

        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Some(bit)
    }

    /// Read up to 32 bits; `None` if fewer remain
    pub(crate) fn read_bits(&mut self, count: u8) -> Option<u32> {
        if count > 32 || usize::from(count) > self.bits_remaining() {
            return None;
        }

        let mut result = 0u32;
        for _ in 0..count {
            result = (result << 1) | u32::from(self.read_bit()?);
        }
        Some(result)
    }

    /// Look at the next `count` bits without consuming them
    pub(crate) fn peek_bits(&self, count: u8) -> Option<u32> {
        self.clone().read_bits(count)
    }

    /// Skip `count` bits, clamped to the end of input
    pub(crate) fn skip_bits(&mut self, count: usize) {
        let target = (self.bit_offset() + count).min(self.data.len() * 8);
        self.byte_pos = target / 8;
        self.bit_pos = (target % 8) as u8;
    }

    /// Align to next byte boundary
    pub(crate) fn align_to_byte(&mut self) {
        if self.bit_pos != 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    pub(crate) fn bit_offset(&self) -> usize {
        self.byte_pos * 8 + usize::from(self.bit_pos)
    }

    pub(crate) fn bits_remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bit_offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_reader_read_bit() {
        let data = [0b1011_0000];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read_bit(), Some(1));
        assert_eq!(reader.read_bit(), Some(0));
        assert_eq!(reader.read_bit(), Some(1));
        assert_eq!(reader.read_bit(), Some(1));
        assert_eq!(reader.read_bit(), Some(0));
    }

    #[test]
    fn test_bit_reader_read_bits_across_bytes() {
        let data = [0b1011_0010, 0b1100_0000];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read_bits(4), Some(0b1011));
        assert_eq!(reader.read_bits(6), Some(0b0010_11));
        assert_eq!(reader.bits_remaining(), 6);
        assert_eq!(reader.read_bits(7), None);
        assert_eq!(reader.read_bits(6), Some(0));
        assert_eq!(reader.read_bit(), None);
    }

    #[test]
    fn test_bit_reader_peek_and_skip() {
        let data = [0b1110_0001, 0xFF];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.peek_bits(3), Some(0b111));
        assert_eq!(reader.bit_offset(), 0);
        reader.skip_bits(7);
        assert_eq!(reader.read_bits(2), Some(0b11));
        reader.skip_bits(100);
        assert_eq!(reader.bits_remaining(), 0);
    }

    #[test]
    fn test_bit_reader_align_to_byte() {
        let data = [0b1011_0010, 0b1100_0000];
        let mut reader = BitReader::new(&data);

        reader.read_bits(3);
        reader.align_to_byte();
        assert_eq!(reader.read_bits(8), Some(0b1100_0000));
        reader.align_to_byte();
        assert_eq!(reader.bits_remaining(), 0);
    }
}
