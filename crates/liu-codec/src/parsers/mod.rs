//! 码流解析器.
//!
//! 每个子模块负责一种编解码器的参数结构提取.

pub mod aac;
pub mod h264;
pub mod h265;
pub mod opus;
