//! Exp-Golomb 可变长编码.
//!
//! H.264/H.265 语法中大量使用:
//! - `ue(v)`: 无符号 Exp-Golomb
//! - `se(v)`: 有符号 Exp-Golomb, 映射 0→0, 1→1, 2→-1, 3→2, 4→-2, ...

use crate::bitreader::BitReader;
use crate::bitwriter::BitWriter;
use crate::{LiuError, LiuResult};

/// 读取无符号 Exp-Golomb 编码值 ue(v)
///
/// 缓冲区耗尽时返回底层游标的 `OutOfRange`, 前导零超过 31 个时返回 `Malformed`.
pub fn read_ue(br: &mut BitReader) -> LiuResult<u32> {
    let mut leading_zeros = 0u32;
    while br.read_bit()? == 0 {
        leading_zeros += 1;
        if leading_zeros > 31 {
            return Err(LiuError::Malformed("Exp-Golomb 前导零过多".into()));
        }
    }

    if leading_zeros == 0 {
        return Ok(0);
    }

    let suffix = u64::from(br.read_bits(leading_zeros)?);
    let value = (1u64 << leading_zeros) - 1 + suffix;
    u32::try_from(value)
        .map_err(|_| LiuError::Malformed(format!("Exp-Golomb 数值溢出, value={}", value)))
}

/// 读取有符号 Exp-Golomb 编码值 se(v)
pub fn read_se(br: &mut BitReader) -> LiuResult<i32> {
    let code = i64::from(read_ue(br)?);
    let value = if code & 1 == 0 {
        -(code / 2)
    } else {
        (code + 1) / 2
    };
    Ok(value as i32)
}

/// 写入无符号 Exp-Golomb 编码值 ue(v)
pub fn write_ue(bw: &mut BitWriter, value: u32) {
    let code = u64::from(value) + 1;
    let num_bits = 64 - code.leading_zeros();
    bw.write_bits_u64(0, num_bits - 1);
    bw.write_bits_u64(code, num_bits);
}

/// 写入有符号 Exp-Golomb 编码值 se(v)
pub fn write_se(bw: &mut BitWriter, value: i32) {
    let v = i64::from(value);
    let code = if v <= 0 { -2 * v } else { 2 * v - 1 };
    write_ue(bw, code as u32);
}
