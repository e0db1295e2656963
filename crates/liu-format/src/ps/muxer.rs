//! MPEG-PS 封装器.
//!
//! 每次 `write` 输出一个 pack:
//! ```text
//! pack header | [system header | PSM] | PES | PES | ...
//! ```
//! system header 与 PSM 在第一次写入和每个视频关键帧前出现.

use liu_codec::parsers::{h264, h265};
use liu_core::{BitWriter, LiuError, LiuResult};
use log::{debug, trace};
use serde::Deserialize;

use super::packet::{
    PackHeader, ProgramStreamMap, PsStreamType, PsmStream, SystemHeader, SystemHeaderStream,
};
use crate::pes::{PES_STREAM_AUDIO, PES_STREAM_VIDEO, PesPacket};

/// 单个 PES 的 PES_packet_length 上限
const MAX_PES_PACKET_LENGTH: usize = 0xFFFF;
/// PES_packet_length 中固定的 3 字节标志与 header_data_length
const PES_FLAGS_LEN: usize = 3;

/// 视频流 P-STD 缓冲区上限 (单位 1024 字节)
const VIDEO_BUFFER_SIZE_BOUND: u16 = 400;
/// 音频流 P-STD 缓冲区上限 (单位 128 字节)
const AUDIO_BUFFER_SIZE_BOUND: u16 = 32;

/// PS 封装器配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PsMuxerConfig {
    /// program_mux_rate (50 字节/秒)
    pub mux_rate: u32,
    /// system header 中的 rate_bound
    pub rate_bound: u32,
}

impl Default for PsMuxerConfig {
    fn default() -> Self {
        Self {
            mux_rate: 6106,
            rate_bound: 26234,
        }
    }
}

/// pack 输出回调
pub type PackCallback = Box<dyn FnMut(&[u8])>;

struct PsMuxStream {
    stream_id: u8,
    stream_type: PsStreamType,
}

/// MPEG-PS 封装器
pub struct PsMuxer {
    config: PsMuxerConfig,
    streams: Vec<PsMuxStream>,
    headers_written: bool,
    on_packet: Option<PackCallback>,
}

impl Default for PsMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl PsMuxer {
    /// 使用默认配置创建
    pub fn new() -> Self {
        Self::with_config(PsMuxerConfig::default())
    }

    /// 使用指定配置创建
    pub fn with_config(config: PsMuxerConfig) -> Self {
        Self {
            config,
            streams: Vec::new(),
            headers_written: false,
            on_packet: None,
        }
    }

    /// 设置 pack 输出回调
    pub fn set_on_packet<F>(&mut self, f: F)
    where
        F: FnMut(&[u8]) + 'static,
    {
        self.on_packet = Some(Box::new(f));
    }

    /// 添加基本流, 返回分配的 stream_id
    ///
    /// 视频从 0xE0 开始 (最多 16 路), 音频从 0xC0 开始 (最多 32 路).
    pub fn add_stream(&mut self, stream_type: PsStreamType) -> LiuResult<u8> {
        let (base, limit) = if stream_type.is_video() {
            (PES_STREAM_VIDEO, 16)
        } else if stream_type.is_audio() {
            (PES_STREAM_AUDIO, 32)
        } else {
            return Err(LiuError::Unsupported(format!(
                "PS: 不支持的码流类型 {:?}",
                stream_type
            )));
        };
        let count = self
            .streams
            .iter()
            .filter(|s| s.stream_type.is_video() == stream_type.is_video())
            .count();
        if count >= limit {
            return Err(LiuError::InvalidArgument(format!(
                "PS: 流数量超出上限, stream_type={:?}, limit={}",
                stream_type, limit
            )));
        }
        let stream_id = base + count as u8;
        self.streams.push(PsMuxStream {
            stream_id,
            stream_type,
        });
        self.headers_written = false;
        debug!(
            "PS: 添加流 stream_id={:#04x}, stream_type={:?}",
            stream_id, stream_type
        );
        Ok(stream_id)
    }

    /// 写入一帧数据, 时间戳单位为毫秒
    pub fn write(&mut self, stream_id: u8, data: &[u8], pts_ms: u64, dts_ms: u64) -> LiuResult<()> {
        let stream_type = self
            .streams
            .iter()
            .find(|s| s.stream_id == stream_id)
            .map(|s| s.stream_type)
            .ok_or(LiuError::UnknownStreamId(u16::from(stream_id)))?;

        let idr = match stream_type {
            PsStreamType::H264 => h264::is_idr_frame(data),
            PsStreamType::H265 => h265::is_idr_frame(data),
            _ => false,
        };
        let pts = pts_ms * 90;
        let dts = dts_ms * 90;

        let mut bw = BitWriter::with_capacity(data.len() + 128);
        PackHeader {
            scr_base: dts,
            mux_rate: self.config.mux_rate,
            ..PackHeader::default()
        }
        .encode(&mut bw)?;

        if !self.headers_written || idr {
            self.system_header().encode(&mut bw)?;
            self.stream_map().encode(&mut bw)?;
            self.headers_written = true;
        }

        let mut offset = 0;
        let mut first = true;
        loop {
            let mut pes = PesPacket::new(stream_id);
            if first {
                pes.set_timestamps(pts, Some(dts));
                pes.data_alignment = true;
            }
            let room = MAX_PES_PACKET_LENGTH - PES_FLAGS_LEN - pes.optional_fields_len();
            let take = (data.len() - offset).min(room);
            pes.payload = data[offset..offset + take].to_vec();
            pes.finalize_lengths();
            pes.encode(&mut bw)?;

            offset += take;
            first = false;
            if offset >= data.len() {
                break;
            }
        }

        trace!(
            "PS: 写入 pack stream_id={:#04x}, len={}, pts={}, dts={}, idr={}",
            stream_id,
            bw.data().len(),
            pts,
            dts,
            idr
        );
        if let Some(cb) = self.on_packet.as_mut() {
            cb(bw.data());
        }
        Ok(())
    }

    fn system_header(&self) -> SystemHeader {
        let video_bound = self.streams.iter().filter(|s| s.stream_type.is_video()).count();
        SystemHeader {
            rate_bound: self.config.rate_bound,
            audio_bound: (self.streams.len() - video_bound) as u8,
            audio_lock: true,
            video_lock: true,
            video_bound: video_bound as u8,
            streams: self
                .streams
                .iter()
                .map(|s| {
                    let video = s.stream_type.is_video();
                    SystemHeaderStream {
                        stream_id: s.stream_id,
                        buffer_bound_scale: video,
                        buffer_size_bound: if video {
                            VIDEO_BUFFER_SIZE_BOUND
                        } else {
                            AUDIO_BUFFER_SIZE_BOUND
                        },
                    }
                })
                .collect(),
            ..SystemHeader::default()
        }
    }

    fn stream_map(&self) -> ProgramStreamMap {
        ProgramStreamMap {
            streams: self
                .streams
                .iter()
                .map(|s| PsmStream {
                    stream_type: s.stream_type.into(),
                    elementary_stream_id: s.stream_id,
                    info_length: 0,
                })
                .collect(),
            ..ProgramStreamMap::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use liu_core::BitReader;

    use super::*;
    use crate::ps::demuxer::PsDemuxer;

    fn collecting_muxer() -> (PsMuxer, Rc<RefCell<Vec<Vec<u8>>>>) {
        let packs = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&packs);
        let mut muxer = PsMuxer::new();
        muxer.set_on_packet(move |pack| sink.borrow_mut().push(pack.to_vec()));
        (muxer, packs)
    }

    const IDR_FRAME: &[u8] = &[
        0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E, // SPS
        0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, // IDR
    ];
    const P_FRAME: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x00];

    #[test]
    fn test_stream_id_allocation() {
        let mut muxer = PsMuxer::new();
        assert_eq!(muxer.add_stream(PsStreamType::H264).unwrap(), 0xE0);
        assert_eq!(muxer.add_stream(PsStreamType::G711A).unwrap(), 0xC0);
        assert_eq!(muxer.add_stream(PsStreamType::H265).unwrap(), 0xE1);
        assert_eq!(muxer.add_stream(PsStreamType::Aac).unwrap(), 0xC1);
        assert!(matches!(
            muxer.add_stream(PsStreamType::Unknown),
            Err(LiuError::Unsupported(_))
        ));
        assert!(matches!(
            muxer.write(0xE5, P_FRAME, 0, 0),
            Err(LiuError::UnknownStreamId(0xE5))
        ));
    }

    #[test]
    fn test_pack_layout_with_headers() {
        let (mut muxer, packs) = collecting_muxer();
        let video = muxer.add_stream(PsStreamType::H264).unwrap();
        muxer.write(video, IDR_FRAME, 40, 40).unwrap();
        muxer.write(video, P_FRAME, 80, 80).unwrap();

        let packs = packs.borrow();
        assert_eq!(packs.len(), 2);

        let mut br = BitReader::new(&packs[0]);
        let header = PackHeader::decode(&mut br).unwrap();
        assert_eq!(header.scr_base, 40 * 90);
        assert_eq!(header.mux_rate, 6106);
        let sh = SystemHeader::decode(&mut br).unwrap();
        assert_eq!(sh.video_bound, 1);
        assert_eq!(sh.streams[0].stream_id, 0xE0);
        let psm = ProgramStreamMap::decode(&mut br).unwrap();
        assert_eq!(psm.streams[0].stream_type, 0x1B);
        let pes = PesPacket::decode(&mut br).unwrap();
        assert!(pes.data_alignment);
        assert_eq!(pes.pts, 3600);
        assert_eq!(pes.payload, IDR_FRAME);
        assert!(br.is_eof());

        // 非关键帧不重复 system header 与 PSM
        let mut br = BitReader::new(&packs[1]);
        PackHeader::decode(&mut br).unwrap();
        let pes = PesPacket::decode(&mut br).unwrap();
        assert_eq!(pes.payload, P_FRAME);
        assert!(br.is_eof());
    }

    #[test]
    fn test_idr_repeats_headers() {
        let (mut muxer, packs) = collecting_muxer();
        let video = muxer.add_stream(PsStreamType::H264).unwrap();
        muxer.write(video, IDR_FRAME, 0, 0).unwrap();
        muxer.write(video, IDR_FRAME, 40, 40).unwrap();
        let packs = packs.borrow();
        assert_eq!(packs[0].len(), packs[1].len());
        assert_eq!(&packs[1][14..18], &[0x00, 0x00, 0x01, 0xBB]);
    }

    #[test]
    fn test_large_frame_split_into_pes_packets() {
        let (mut muxer, packs) = collecting_muxer();
        let audio = muxer.add_stream(PsStreamType::Aac).unwrap();
        let frame: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
        muxer.write(audio, &frame, 10, 10).unwrap();

        let packs = packs.borrow();
        let mut br = BitReader::new(&packs[0]);
        PackHeader::decode(&mut br).unwrap();
        SystemHeader::decode(&mut br).unwrap();
        ProgramStreamMap::decode(&mut br).unwrap();

        let first = PesPacket::decode(&mut br).unwrap();
        assert_eq!(first.packet_length, 0xFFFF);
        assert_eq!(first.payload.len(), 0xFFFF - 13);
        assert_eq!(first.pts_dts_flags, 0b11);

        let second = PesPacket::decode(&mut br).unwrap();
        assert_eq!(second.pts_dts_flags, 0);
        assert!(!second.data_alignment);
        assert!(br.is_eof());
        assert!([first.payload, second.payload].concat() == frame);

        // 解封装后重组为同一帧
        let mut demuxer = PsDemuxer::new();
        let frames = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&frames);
        demuxer.set_on_frame(move |f| sink.borrow_mut().push(f));
        demuxer.input(&packs[0]).unwrap();
        demuxer.flush();
        let frames = frames.borrow();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].pts_ms, 10);
        assert!(frames[0].data[..] == frame[..]);
    }
}
