//! 编解码器标识符.
//!
//! 为封装层可识别的每种码流分配唯一标识, 与容器格式无关.

use std::fmt;

use liu_core::MediaType;

/// 编解码器标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    None,

    // ========================
    // 视频编解码器
    // ========================
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,

    // ========================
    // 音频编解码器
    // ========================
    /// AAC (ADTS 封装)
    Aac,
    /// Opus
    Opus,
    /// G.711 A-law
    G711A,
    /// G.711 μ-law
    G711U,
}

impl CodecId {
    /// 获取编解码器所属的媒体类型
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::None => MediaType::Data,
            Self::H264 | Self::H265 => MediaType::Video,
            Self::Aac | Self::Opus | Self::G711A | Self::G711U => MediaType::Audio,
        }
    }

    /// 是否为视频编解码器
    pub const fn is_video(&self) -> bool {
        matches!(self, Self::H264 | Self::H265)
    }

    /// 是否为音频编解码器
    pub const fn is_audio(&self) -> bool {
        matches!(self, Self::Aac | Self::Opus | Self::G711A | Self::G711U)
    }

    /// 是否为基于 NAL 单元的视频码流
    pub const fn is_nal_based(&self) -> bool {
        self.is_video()
    }

    /// 编解码器名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Aac => "aac",
            Self::Opus => "opus",
            Self::G711A => "pcm_alaw",
            Self::G711U => "pcm_mulaw",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
