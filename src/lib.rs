//! # Liu (流)
//!
//! 纯 Rust 实现的码流解析与 MPEG-2 系统层封装引擎.
//!
//! - **比特流**: 按位读写、Exp-Golomb、CRC-32/MPEG-2
//! - **码流解析**: H.264/H.265 参数集与 AVCC/HVCC, AAC ADTS, Opus
//! - **容器格式**: PES, MPEG-TS 与 MPEG-PS 的封装/解封装
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use liu::format::{TsMuxer, TsStreamType};
//!
//! let mut muxer = TsMuxer::new();
//! muxer.set_on_packet(|cell| println!("TS 包: {} 字节", cell.len()));
//! let pid = muxer.add_stream(TsStreamType::H264);
//! let frame = [0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84];
//! muxer.write(pid, &frame, 40, 40).ok();
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `liu-core` | 比特流读写与错误类型 |
//! | `liu-codec` | 参数集与音频帧解析 |
//! | `liu-format` | PES/TS/PS 封装与解封装 |

/// 比特流读写与错误类型
pub use liu_core as core;

/// 码流解析
pub use liu_codec as codec;

/// 容器格式
pub use liu_format as format;

pub mod config;
pub mod logging;

/// 获取 Liu 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
