//! # liu-core
//!
//! Liu 核心库, 提供比特流读写、Exp-Golomb 编码、CRC 校验和错误类型.
//!
//! 上层的参数集解析器与 TS/PS 封装器都建立在这里的 `BitReader`/`BitWriter` 之上.

pub mod bitreader;
pub mod bitwriter;
pub mod crc;
pub mod error;
pub mod golomb;
pub mod media_type;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use error::{LiuError, LiuResult};
pub use media_type::MediaType;
