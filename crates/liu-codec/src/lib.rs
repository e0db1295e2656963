//! # liu-codec
//!
//! Liu 码流解析库, 从原始基本流中提取编解码参数.
//!
//! - H.264: NAL 分割、SPS/PPS/SEI 解析、AVCDecoderConfigurationRecord
//! - H.265: NAL 分割、VPS/SPS/PPS 解析、HEVCDecoderConfigurationRecord
//! - AAC: ADTS 帧头与 AudioSpecificConfig 互转
//! - Opus: TOC/包结构解析、OpusHead
//!
//! 解析器只关心参数结构, 不做像素或采样重建.

pub mod codec_id;
pub mod parsers;

// 重导出常用类型
pub use codec_id::CodecId;
