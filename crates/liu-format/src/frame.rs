//! 解封装输出帧.

use bytes::Bytes;
use liu_codec::CodecId;
use liu_codec::parsers::h264::nal::{NalUnitType, for_each_nal};
use liu_codec::parsers::{h264, h265};

/// 解封装得到的一帧数据
///
/// 视频帧为单个带起始码的 NAL 单元, 音频帧为整段 PES 负载.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxedFrame {
    /// 编解码器
    pub codec: CodecId,
    /// 帧数据
    pub data: Bytes,
    /// 显示时间戳 (毫秒)
    pub pts_ms: u64,
    /// 解码时间戳 (毫秒)
    pub dts_ms: u64,
}

impl DemuxedFrame {
    /// 由 90kHz 时间戳构造
    pub fn from_90k(codec: CodecId, data: Bytes, pts: u64, dts: u64) -> Self {
        Self {
            codec,
            data,
            pts_ms: pts / 90,
            dts_ms: dts / 90,
        }
    }
}

/// 解封装帧回调
pub type FrameCallback = Box<dyn FnMut(DemuxedFrame)>;

/// 判断 NAL (含起始码) 是否为访问单元分隔符
pub(crate) fn is_aud_nal(codec: CodecId, nal: &[u8]) -> bool {
    match codec {
        CodecId::H264 => h264::nal::nal_type(nal) == NalUnitType::Aud,
        CodecId::H265 => h265::nal_type(nal) == h265::HevcNalUnitType::Aud,
        _ => false,
    }
}

/// 将一段完整的视频负载按 NAL 拆分, 跳过 AUD 后逐个输出
pub(crate) fn emit_video_nals(
    codec: CodecId,
    payload: &Bytes,
    pts: u64,
    dts: u64,
    on_frame: &mut dyn FnMut(DemuxedFrame),
) {
    let base = payload.as_ptr() as usize;
    for_each_nal(payload, |nal| {
        if !is_aud_nal(codec, nal) {
            let start = nal.as_ptr() as usize - base;
            let data = payload.slice(start..start + nal.len());
            on_frame(DemuxedFrame::from_90k(codec, data, pts, dts));
        }
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_video_nals_skips_aud() {
        let payload = Bytes::from_static(&[
            0x00, 0x00, 0x00, 0x01, 0x09, 0xF0, // AUD
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, // SPS
            0x00, 0x00, 0x01, 0x68, 0xCE, // PPS
            0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, // IDR
        ]);
        let mut frames = Vec::new();
        emit_video_nals(CodecId::H264, &payload, 9000, 4500, &mut |f| frames.push(f));
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0].data[..], &[0x00, 0x00, 0x00, 0x01, 0x67, 0x42]);
        assert_eq!(&frames[1].data[..], &[0x00, 0x00, 0x01, 0x68, 0xCE]);
        assert_eq!(frames[2].pts_ms, 100);
        assert_eq!(frames[2].dts_ms, 50);
    }

    #[test]
    fn test_hevc_aud_detection() {
        let aud = [0x00, 0x00, 0x00, 0x01, 0x46, 0x01, 0x50];
        assert!(is_aud_nal(CodecId::H265, &aud));
        assert!(!is_aud_nal(CodecId::H264, &aud));
        assert!(!is_aud_nal(CodecId::Aac, &aud));
    }
}
