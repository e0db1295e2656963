//! 比特流读取器.
//!
//! 提供从字节缓冲区中按位读取数据的能力, 是所有参数集解析器和容器头部解码的基础设施.
//!
//! 按大端位序读取 (MSB first). 越界读取返回 `OutOfRange`, 不会 panic,
//! 以便长时间运行的解封装器在遇到损坏输入时继续工作.

use crate::{LiuError, LiuResult};

/// 比特流读取器
///
/// 从字节缓冲区中按位读取数据, 使用大端位序 (MSB first).
/// 支持回退 (`unread`) 与标记点 (`mark` / `distance_from_mark`).
///
/// # 示例
/// ```
/// use liu_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// br.mark();
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.distance_from_mark(), 4);
/// br.unread(4).unwrap();
/// assert_eq!(br.read_bits(12).unwrap(), 0b0001_0101_0101);
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
    /// 标记点 (以位为单位的绝对位置)
    mark: usize,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
            mark: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 获取剩余完整字节数
    pub fn bytes_left(&self) -> usize {
        self.bits_left() / 8
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 是否位于字节边界
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// 当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    /// 源数据
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// 从当前字节开始的剩余数据 (未对齐时包含当前字节)
    pub fn remaining_data(&self) -> &'a [u8] {
        if self.byte_pos >= self.data.len() {
            return &[];
        }
        &self.data[self.byte_pos..]
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> LiuResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(LiuError::OutOfRange(format!(
                "read_bit: 已读取 {} 位, 缓冲区共 {} 字节",
                self.bits_read(),
                self.data.len()
            )));
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 1 个位并转换为 bool
    pub fn read_flag(&mut self) -> LiuResult<bool> {
        Ok(self.read_bit()? == 1)
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    pub fn read_bits(&mut self, n: u32) -> LiuResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(LiuError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(LiuError::OutOfRange(format!(
                "read_bits: 需要 {} 位, 剩余 {} 位",
                n,
                self.bits_left()
            )));
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            // 从当前字节中提取位
            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取 N 个位 (最多 64 位)
    pub fn read_bits_u64(&mut self, n: u32) -> LiuResult<u64> {
        if n <= 32 {
            return self.read_bits(n).map(u64::from);
        }
        if n > 64 {
            return Err(LiuError::InvalidArgument(format!(
                "read_bits_u64: n={} 超过 64 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(LiuError::OutOfRange(format!(
                "read_bits_u64: 需要 {} 位, 剩余 {} 位",
                n,
                self.bits_left()
            )));
        }

        let high_bits = n - 32;
        let high = u64::from(self.read_bits(high_bits)?);
        let low = u64::from(self.read_bits(32)?);
        Ok((high << 32) | low)
    }

    /// 预读 N 个位 (不移动读取位置)
    pub fn peek_bits(&self, n: u32) -> LiuResult<u32> {
        let mut ahead = self.clone();
        ahead.read_bits(n)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: usize) -> LiuResult<()> {
        if n > self.bits_left() {
            return Err(LiuError::OutOfRange(format!(
                "skip_bits: 需要跳过 {} 位, 剩余 {} 位",
                n,
                self.bits_left()
            )));
        }
        self.seek_to(self.bits_read() + n);
        Ok(())
    }

    /// 跳过 N 个字节
    pub fn skip_bytes(&mut self, n: usize) -> LiuResult<()> {
        self.skip_bits(n * 8)
    }

    /// 回退 N 个位, 可跨越字节边界
    pub fn unread(&mut self, n: usize) -> LiuResult<()> {
        let pos = self.bits_read();
        if n > pos {
            return Err(LiuError::OutOfRange(format!(
                "unread: 回退 {} 位超过已读取的 {} 位",
                n, pos
            )));
        }
        self.seek_to(pos - n);
        Ok(())
    }

    /// 对齐到下一个字节边界
    pub fn align_to_byte(&mut self) {
        if self.bit_pos != 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 在当前位置设置标记点
    pub fn mark(&mut self) {
        self.mark = self.bits_read();
    }

    /// 自标记点以来读取的位数
    pub fn distance_from_mark(&self) -> usize {
        self.bits_read().saturating_sub(self.mark)
    }

    /// 读取 N 个字节 (必须字节对齐)
    pub fn read_bytes(&mut self, n: usize) -> LiuResult<&'a [u8]> {
        if self.bit_pos != 0 {
            return Err(LiuError::Misaligned(format!(
                "read_bytes: 当前位于第 {} 字节第 {} 位",
                self.byte_pos, self.bit_pos
            )));
        }
        if self.byte_pos + n > self.data.len() {
            return Err(LiuError::OutOfRange(format!(
                "read_bytes: 需要 {} 字节, 剩余 {} 字节",
                n,
                self.data.len().saturating_sub(self.byte_pos)
            )));
        }
        let bytes = &self.data[self.byte_pos..self.byte_pos + n];
        self.byte_pos += n;
        Ok(bytes)
    }

    fn seek_to(&mut self, bit_index: usize) {
        self.byte_pos = bit_index / 8;
        self.bit_pos = (bit_index % 8) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_basic() {
        let data = [0b10110001, 0b01010101];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(1).unwrap(), 1);
        assert_eq!(br.read_bits(3).unwrap(), 0b011);
        assert_eq!(br.read_bits(4).unwrap(), 0b0001);
        assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
        assert!(br.is_eof());
    }

    #[test]
    fn test_read_bits_cross_byte() {
        let data = [0xAB, 0xCD, 0xEF];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(4).unwrap(), 0xA);
        assert_eq!(br.read_bits(12).unwrap(), 0xBCD);
        assert_eq!(br.read_bits(8).unwrap(), 0xEF);
    }

    #[test]
    fn test_read_32_and_64_bits() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0, 0x11];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(32).unwrap(), 0x12345678);
        br.unread(32).unwrap();
        assert_eq!(br.read_bits_u64(64).unwrap(), 0x123456789ABCDEF0);
        assert_eq!(br.read_bits_u64(8).unwrap(), 0x11);
    }

    #[test]
    fn test_read_33_bit_timestamp() {
        // 33 位全 1 + 7 位 0
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0x80];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits_u64(33).unwrap(), 0x1_FFFF_FFFF);
    }

    #[test]
    fn test_out_of_range_is_error() {
        let data = [0xFF];
        let mut br = BitReader::new(&data);
        assert!(br.read_bits(8).is_ok());
        let err = br.read_bit().expect_err("越界读取应返回错误");
        assert!(matches!(err, LiuError::OutOfRange(_)));
        assert!(matches!(br.read_bits(3), Err(LiuError::OutOfRange(_))));
        assert!(matches!(br.skip_bits(1), Err(LiuError::OutOfRange(_))));
    }

    #[test]
    fn test_unread_across_byte_boundary() {
        let data = [0b1100_0011, 0b1010_0101];
        let mut br = BitReader::new(&data);
        br.skip_bits(10).unwrap();
        br.unread(4).unwrap();
        assert_eq!(br.bits_read(), 6);
        assert_eq!(br.read_bits(4).unwrap(), 0b1110);
        assert!(br.unread(100).is_err());
    }

    #[test]
    fn test_mark_distance() {
        let data = [0u8; 4];
        let mut br = BitReader::new(&data);
        br.skip_bits(3).unwrap();
        br.mark();
        br.skip_bits(13).unwrap();
        assert_eq!(br.distance_from_mark(), 13);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let data = [0xF0];
        let br = BitReader::new(&data);
        assert_eq!(br.peek_bits(4).unwrap(), 0xF);
        assert_eq!(br.bits_read(), 0);
    }

    #[test]
    fn test_read_bytes_requires_alignment() {
        let data = [0x01, 0x02, 0x03];
        let mut br = BitReader::new(&data);
        br.read_bit().unwrap();
        assert!(matches!(br.read_bytes(1), Err(LiuError::Misaligned(_))));
        br.align_to_byte();
        assert_eq!(br.read_bytes(2).unwrap(), &[0x02, 0x03]);
        assert!(matches!(br.read_bytes(1), Err(LiuError::OutOfRange(_))));
    }

    #[test]
    fn test_remaining_data() {
        let data = [1, 2, 3, 4];
        let mut br = BitReader::new(&data);
        br.skip_bytes(1).unwrap();
        assert_eq!(br.remaining_data(), &[2, 3, 4]);
        assert_eq!(br.bytes_left(), 3);
    }
}
