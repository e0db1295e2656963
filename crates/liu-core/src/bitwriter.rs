//! 比特流写入器.
//!
//! 提供向字节缓冲区按位写入数据的能力, 是各类头部/表编码的基础设施.
//!
//! 按大端位序写入 (MSB first), 与 BitReader 对应. 支持回填 (patch-back):
//! 先写入占位的长度字段, 内容写完后再按字节偏移改写.

use crate::{LiuError, LiuResult};

/// 比特流写入器
///
/// 向字节缓冲区按位写入数据, 使用大端位序 (MSB first).
/// 缓冲区按需增长.
///
/// # 示例
/// ```
/// use liu_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b1011, 4);
/// bw.write_bits(0b0001, 4);
/// let len_pos = bw.byte_offset();
/// bw.write_bits(0, 8);
/// bw.mark();
/// bw.write_bits(0xABCD, 16);
/// let len = (bw.distance_from_mark() / 8) as u8;
/// bw.set_u8_at(len_pos, len).unwrap();
/// assert_eq!(bw.finish(), vec![0b10110001, 2, 0xAB, 0xCD]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    /// 输出缓冲区 (末字节可能未写满)
    data: Vec<u8>,
    /// 末字节中已填充的位数 (0 表示字节对齐)
    bit_count: u8,
    /// 标记点 (以位为单位的绝对位置)
    mark: usize,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self::default()
    }

    /// 以指定容量创建比特流写入器
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            bit_count: 0,
            mark: 0,
        }
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        if self.bit_count == 0 {
            self.data.len() * 8
        } else {
            (self.data.len() - 1) * 8 + self.bit_count as usize
        }
    }

    /// 当前写入位置所在的字节偏移
    pub fn byte_offset(&self) -> usize {
        self.bits_written() / 8
    }

    /// 是否位于字节边界
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_count == 0
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        self.write_bits_u64(u64::from(bit & 1), 1);
    }

    /// 写入 bool 标志位
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bits_u64(u64::from(flag), 1);
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低 N 位被写入, 高位在前 (大端).
    pub fn write_bits(&mut self, value: u32, n: u32) {
        self.write_bits_u64(u64::from(value), n.min(32));
    }

    /// 写入 N 个位 (最多 64 位)
    pub fn write_bits_u64(&mut self, value: u64, n: u32) {
        let mut remaining = n.min(64);
        while remaining > 0 {
            if self.bit_count == 0 {
                self.data.push(0);
            }
            let available = 8 - self.bit_count as u32;
            let to_write = remaining.min(available);

            // 提取要写入的位
            let shift = remaining - to_write;
            let bits = ((value >> shift) & ((1u64 << to_write) - 1)) as u8;
            if let Some(last) = self.data.last_mut() {
                *last |= bits << (available - to_write);
            }

            self.bit_count = ((self.bit_count as u32 + to_write) % 8) as u8;
            remaining -= to_write;
        }
    }

    /// 写入字节序列 (必须字节对齐)
    pub fn write_bytes(&mut self, bytes: &[u8]) -> LiuResult<()> {
        if self.bit_count != 0 {
            return Err(LiuError::Misaligned(format!(
                "write_bytes: 末字节已填充 {} 位",
                self.bit_count
            )));
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// 重复写入同一字节值
    pub fn write_repeat(&mut self, byte: u8, count: usize) {
        if self.bit_count == 0 {
            self.data.resize(self.data.len() + count, byte);
        } else {
            for _ in 0..count {
                self.write_bits(u32::from(byte), 8);
            }
        }
    }

    /// 以指定字节填充到总长度 `len`
    pub fn pad_to(&mut self, len: usize, byte: u8) {
        self.align_to_byte();
        if self.data.len() < len {
            self.data.resize(len, byte);
        }
    }

    /// 对齐到字节边界 (剩余位填 0)
    pub fn align_to_byte(&mut self) {
        self.bit_count = 0;
    }

    /// 在当前位置设置标记点
    pub fn mark(&mut self) {
        self.mark = self.bits_written();
    }

    /// 自标记点以来写入的位数
    pub fn distance_from_mark(&self) -> usize {
        self.bits_written().saturating_sub(self.mark)
    }

    /// 回填: 改写已写入位置的 1 个字节
    pub fn set_u8_at(&mut self, offset: usize, value: u8) -> LiuResult<()> {
        match self.data.get_mut(offset) {
            Some(b) => {
                *b = value;
                Ok(())
            }
            None => Err(LiuError::OutOfRange(format!(
                "set_u8_at: offset={} 超出已写入长度 {}",
                offset,
                self.data.len()
            ))),
        }
    }

    /// 回填: 改写已写入位置的 2 个字节 (大端)
    pub fn set_u16_at(&mut self, offset: usize, value: u16) -> LiuResult<()> {
        if offset + 2 > self.data.len() {
            return Err(LiuError::OutOfRange(format!(
                "set_u16_at: offset={} 超出已写入长度 {}",
                offset,
                self.data.len()
            )));
        }
        self.data[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// 清空缓冲区, 保留容量
    pub fn clear(&mut self) {
        self.data.clear();
        self.bit_count = 0;
        self.mark = 0;
    }

    /// 获取已写入的数据 (末字节未写满的位为 0)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 完成写入, 返回字节数据
    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}
