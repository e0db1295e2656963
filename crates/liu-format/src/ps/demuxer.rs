//! MPEG-PS 解封装器.
//!
//! 输入为任意切分的字节块, 不完整的记录缓存到下一次 `input`.
//! 视频按 NAL 输出 (跳过 AUD, 末尾未完整的 NAL 留在缓冲区),
//! 音频在 PTS 变化时输出上一帧.

use std::collections::HashMap;

use bytes::{Buf, Bytes, BytesMut};
use liu_codec::CodecId;
use liu_codec::parsers::h264::find_start_code;
use liu_core::{BitReader, LiuError, LiuResult};
use log::{debug, trace, warn};

use super::packet::{
    PackHeader, ProgramStreamMap, PsRecordKind, PsStreamType, SkippedRecord, SystemHeader,
    classify,
};
use crate::frame::{DemuxedFrame, FrameCallback, emit_video_nals};
use crate::io::IoContext;
use crate::pes::{PES_STREAM_AUDIO, PES_STREAM_VIDEO, PesPacket};

/// 从 `IoContext` 读取时每次送入的字节数
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// 解码出的 PS 记录, 供诊断回调使用
#[derive(Debug, Clone, PartialEq)]
pub enum PsRecord {
    /// Pack header
    PackHeader(PackHeader),
    /// System header
    SystemHeader(SystemHeader),
    /// PSM
    StreamMap(ProgramStreamMap),
    /// 目录 (已跳过)
    Directory(SkippedRecord),
    /// 通用 PES (已跳过)
    GenericPes(SkippedRecord),
    /// 音视频 PES
    Pes(PesPacket),
}

/// 诊断回调: 记录类型与解码结果
pub type RecordCallback = Box<dyn FnMut(PsRecordKind, Result<&PsRecord, &LiuError>)>;

/// 单路基本流的重组状态
struct PsStreamState {
    stream_type: PsStreamType,
    buf: BytesMut,
    pts: u64,
    dts: u64,
}

impl PsStreamState {
    fn new(stream_type: PsStreamType) -> Self {
        Self {
            stream_type,
            buf: BytesMut::with_capacity(4096),
            pts: 0,
            dts: 0,
        }
    }
}

/// MPEG-PS 解封装器
#[derive(Default)]
pub struct PsDemuxer {
    stream_map: HashMap<u8, PsStreamState>,
    mpeg1: bool,
    cache: BytesMut,
    on_frame: Option<FrameCallback>,
    on_record: Option<RecordCallback>,
}

impl PsDemuxer {
    /// 创建解封装器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置帧输出回调
    pub fn set_on_frame<F>(&mut self, f: F)
    where
        F: FnMut(DemuxedFrame) + 'static,
    {
        self.on_frame = Some(Box::new(f));
    }

    /// 设置记录诊断回调
    pub fn set_on_record<F>(&mut self, f: F)
    where
        F: FnMut(PsRecordKind, Result<&PsRecord, &LiuError>) + 'static,
    {
        self.on_record = Some(Box::new(f));
    }

    /// 最近一个 pack header 是否为 MPEG-1 格式
    pub fn is_mpeg1(&self) -> bool {
        self.mpeg1
    }

    /// 已知流的 stream_id 与编解码器
    pub fn streams(&self) -> Vec<(u8, CodecId)> {
        let mut streams: Vec<_> = self
            .stream_map
            .iter()
            .map(|(&sid, s)| (sid, s.stream_type.codec()))
            .collect();
        streams.sort_unstable_by_key(|&(sid, _)| sid);
        streams
    }

    /// 缓存中尚未消费的字节数
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// 输入一段字节
    ///
    /// 末尾记录不完整时返回 `NeedMore`, 剩余数据已缓存, 追加数据后再次调用即可.
    pub fn input(&mut self, data: &[u8]) -> LiuResult<()> {
        let mut cache = std::mem::take(&mut self.cache);
        cache.extend_from_slice(data);

        let mut pos = 0;
        let result = loop {
            let rest = &cache[pos..];
            if rest.is_empty() {
                break Ok(());
            }
            if rest.len() < 4 {
                break Err(LiuError::NeedMore);
            }
            let prefix = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
            let kind = classify(prefix);
            match self.decode_record(kind, rest) {
                Ok(consumed) => pos += consumed,
                Err(LiuError::NeedMore) => break Err(LiuError::NeedMore),
                Err(LiuError::Malformed(msg)) => {
                    warn!("PS: 记录格式错误, 跳过 1 字节重新同步, kind={:?}, {}", kind, msg);
                    pos += 1;
                }
                Err(e) => break Err(e),
            }
        };

        cache.advance(pos);
        self.cache = cache;
        result
    }

    /// 从 I/O 上下文分块读取全部输入, 到达末尾后冲刷残留数据
    ///
    /// 末尾仍不完整的记录被丢弃.
    pub fn input_from(&mut self, io: &mut IoContext) -> LiuResult<()> {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = io.read_available(&mut chunk)?;
            if n == 0 {
                break;
            }
            match self.input(&chunk[..n]) {
                Ok(()) | Err(LiuError::NeedMore) => {}
                Err(e) => return Err(e),
            }
        }
        if !self.cache.is_empty() {
            warn!("PS: 输入结束, 丢弃 {} 字节不完整数据", self.cache.len());
            self.cache.clear();
        }
        self.flush();
        Ok(())
    }

    /// 解码 `data` 开头的一条记录, 返回消费的字节数
    fn decode_record(&mut self, kind: PsRecordKind, data: &[u8]) -> LiuResult<usize> {
        let mut br = BitReader::new(data);
        match kind {
            PsRecordKind::PackHeader => {
                let header = PackHeader::decode(&mut br);
                if let Ok(h) = &header {
                    self.mpeg1 = h.is_mpeg1;
                }
                self.report(kind, header.map(PsRecord::PackHeader))?;
            }
            PsRecordKind::SystemHeader => {
                let sh = SystemHeader::decode(&mut br);
                self.report(kind, sh.map(PsRecord::SystemHeader))?;
            }
            PsRecordKind::StreamMap => {
                let psm = ProgramStreamMap::decode(&mut br);
                if let Ok(psm) = &psm {
                    self.register_streams(psm);
                }
                self.report(kind, psm.map(PsRecord::StreamMap))?;
            }
            PsRecordKind::Directory => {
                let record = SkippedRecord::decode(&mut br);
                self.report(kind, record.map(PsRecord::Directory))?;
            }
            PsRecordKind::GenericPes => {
                let record = SkippedRecord::decode(&mut br);
                self.report(kind, record.map(PsRecord::GenericPes))?;
            }
            PsRecordKind::EndCode => br.skip_bytes(4)?,
            PsRecordKind::AudioPes | PsRecordKind::VideoPes => {
                let pes = if self.mpeg1 {
                    PesPacket::decode_mpeg1(&mut br)
                } else {
                    PesPacket::decode(&mut br)
                };
                match pes {
                    Ok(pes) => {
                        self.handle_pes(&pes);
                        self.report(kind, Ok(PsRecord::Pes(pes)))?;
                    }
                    Err(e) => self.report(kind, Err(e))?,
                }
            }
            PsRecordKind::Unknown => br.skip_bytes(1)?,
        }
        Ok(br.bits_read() / 8)
    }

    /// 通知诊断回调并透传结果
    fn report(&mut self, kind: PsRecordKind, result: LiuResult<PsRecord>) -> LiuResult<()> {
        if let Some(cb) = self.on_record.as_mut() {
            match &result {
                Ok(record) => cb(kind, Ok(record)),
                Err(e) => cb(kind, Err(e)),
            }
        }
        result.map(|_| ())
    }

    fn register_streams(&mut self, psm: &ProgramStreamMap) {
        for es in &psm.streams {
            self.stream_map
                .entry(es.elementary_stream_id)
                .or_insert_with(|| {
                    let stream_type = PsStreamType::from_u8(es.stream_type);
                    debug!(
                        "PS: PSM 登记流 stream_id={:#04x}, stream_type={:?}",
                        es.elementary_stream_id, stream_type
                    );
                    PsStreamState::new(stream_type)
                });
        }
    }

    fn handle_pes(&mut self, pes: &PesPacket) {
        let sid = pes.stream_id;
        if !self.stream_map.contains_key(&sid) {
            if self.mpeg1 {
                debug!("PS: MPEG-1 新流 stream_id={:#04x}, 等待推测编解码器", sid);
                let mut stream = PsStreamState::new(PsStreamType::Unknown);
                stream.buf.extend_from_slice(&pes.payload);
                stream.pts = pes.pts;
                stream.dts = pes.dts;
                self.stream_map.insert(sid, stream);
            } else {
                trace!("PS: PSM 中没有 stream_id={:#04x}, 丢弃 PES", sid);
            }
            return;
        }
        let Some(stream) = self.stream_map.get_mut(&sid) else {
            return;
        };

        if self.mpeg1 && stream.stream_type == PsStreamType::Unknown {
            stream.stream_type = guess_stream_type(sid, &stream.buf);
            if stream.stream_type != PsStreamType::Unknown {
                debug!(
                    "PS: 推测 stream_id={:#04x} 为 {:?}",
                    sid, stream.stream_type
                );
            }
        }

        // 不带时间戳的 PES 是上一帧被拆分后的后续部分
        let (pts, dts) = if pes.pts_dts_flags == 0 {
            (stream.pts, stream.dts)
        } else {
            (pes.pts, pes.dts)
        };
        let stream_type = stream.stream_type;
        let mut ready = Vec::new();
        match stream_type {
            PsStreamType::Aac | PsStreamType::G711A | PsStreamType::G711U => {
                if stream.pts != pts && !stream.buf.is_empty() {
                    ready.push((stream.buf.split().freeze(), stream.pts, stream.dts));
                }
                stream.buf.extend_from_slice(&pes.payload);
            }
            PsStreamType::H264 | PsStreamType::H265 => {
                // 时间戳变化说明上一帧的最后一个 NAL 已经完整
                if stream.pts != pts && !stream.buf.is_empty() {
                    ready.push((stream.buf.split().freeze(), stream.pts, stream.dts));
                }
                stream.buf.extend_from_slice(&pes.payload);
                if let Some(tail) = last_start_code(&stream.buf) {
                    let complete = stream.buf.split_to(tail).freeze();
                    if !complete.is_empty() {
                        ready.push((complete, pts, dts));
                    }
                }
            }
            PsStreamType::Unknown => {
                if stream.pts != pts {
                    stream.buf.clear();
                }
                stream.buf.extend_from_slice(&pes.payload);
            }
        }
        stream.pts = pts;
        stream.dts = dts;

        for (data, pts, dts) in ready {
            self.emit(stream_type, &data, pts, dts);
        }
    }

    fn emit(&mut self, stream_type: PsStreamType, data: &Bytes, pts: u64, dts: u64) {
        let Some(cb) = self.on_frame.as_mut() else {
            return;
        };
        let codec = stream_type.codec();
        if stream_type.is_video() {
            emit_video_nals(codec, data, pts, dts, cb.as_mut());
        } else {
            cb(DemuxedFrame::from_90k(codec, data.clone(), pts, dts));
        }
    }

    /// 输出所有残留缓冲
    pub fn flush(&mut self) {
        let mut pending: Vec<(u8, PsStreamType, Bytes, u64, u64)> = self
            .stream_map
            .iter_mut()
            .filter(|(_, s)| !s.buf.is_empty())
            .map(|(&sid, s)| (sid, s.stream_type, s.buf.split().freeze(), s.pts, s.dts))
            .collect();
        pending.sort_unstable_by_key(|p| p.0);
        for (_, stream_type, data, pts, dts) in pending {
            self.emit(stream_type, &data, pts, dts);
        }
    }
}

/// 最后一个起始码的位置
fn last_start_code(data: &[u8]) -> Option<usize> {
    let mut last = None;
    let mut from = 0;
    while let Some((pos, len)) = find_start_code(data, from) {
        last = Some(pos);
        from = pos + len;
    }
    last
}

/// 根据 stream_id 与已缓存的负载推测码流类型
///
/// 音频 stream_id 视为 AAC. 视频分别按 H.264/H.265 的 NAL 类型打分,
/// 分数更高且不低于 4 的一方胜出.
fn guess_stream_type(sid: u8, buf: &[u8]) -> PsStreamType {
    if sid & 0xE0 == PES_STREAM_AUDIO {
        return PsStreamType::Aac;
    }
    if sid & 0xE0 != PES_STREAM_VIDEO {
        return PsStreamType::Unknown;
    }

    let mut guess = PsStreamType::Unknown;
    let mut h264_score = 0i32;
    let mut h265_score = 0i32;
    let mut from = 0;
    while let Some((pos, len)) = find_start_code(buf, from) {
        from = pos + len;
        let Some(&header) = buf.get(from) else {
            break;
        };

        match header & 0x1F {
            5 | 7 | 8 => h264_score += 2,
            t if t < 5 => h264_score += 1,
            t if t > 20 => h264_score -= 1,
            _ => {}
        }
        match (header >> 1) & 0x3F {
            16..=21 | 32..=34 => h265_score += 2,
            0..=9 => h265_score += 1,
            t if t > 40 => h265_score -= 1,
            _ => {}
        }

        if h264_score > h265_score && h264_score >= 4 {
            guess = PsStreamType::H264;
        } else if h265_score > h264_score && h265_score >= 4 {
            guess = PsStreamType::H265;
        }
    }
    guess
}
