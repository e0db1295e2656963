//! MPEG-TS 封装器.
//!
//! 将一帧音视频数据封装为一个 PES, 再切分为若干 188 字节 TS 包,
//! 通过 `on_packet` 回调逐包输出:
//! - 周期性插入 PAT/PMT (按 DTS 间隔)
//! - 第一个包携带 PCR (PCR 流) 与随机访问指示 (关键帧)
//! - 最后一个不满的包用自适应字段填充

use liu_codec::CodecId;
use liu_codec::parsers::{h264, h265};
use liu_core::{BitWriter, LiuError, LiuResult};
use log::{debug, trace};
use serde::Deserialize;

use super::packet::{
    AFC_ADAPTATION_PAYLOAD, AFC_PAYLOAD_ONLY, AdaptationField, AdaptationFlags, PID_PAT,
    TS_HEADER_SIZE, TS_PACKET_SIZE, TsHeader,
};
use super::psi::{Pat, PatProgram, Pmt, PmtStream};
use crate::pes::{
    AUD_H264, AUD_H265, PES_STREAM_AUDIO, PES_STREAM_PRIVATE, PES_STREAM_VIDEO, PesPacket,
};

/// 节目号
const PROGRAM_NUMBER: u16 = 1;
/// transport_stream_id
const TRANSPORT_STREAM_ID: u16 = 1;

/// TS 中可封装的码流类型 (PMT stream_type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TsStreamType {
    /// ISO/IEC 13818-7 ADTS AAC
    Aac = 0x0F,
    /// H.264 / AVC
    H264 = 0x1B,
    /// H.265 / HEVC
    H265 = 0x24,
}

impl TsStreamType {
    /// 从 stream_type 字节转换, 未知类型返回 `None`
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0F => Some(Self::Aac),
            0x1B => Some(Self::H264),
            0x24 => Some(Self::H265),
            _ => None,
        }
    }

    /// 对应的编解码器
    pub fn codec(self) -> CodecId {
        match self {
            Self::Aac => CodecId::Aac,
            Self::H264 => CodecId::H264,
            Self::H265 => CodecId::H265,
        }
    }

    /// 对应的 PES stream_id
    pub fn stream_id(self) -> u8 {
        match self {
            Self::H264 | Self::H265 => PES_STREAM_VIDEO,
            Self::Aac => PES_STREAM_AUDIO,
        }
    }
}

impl From<TsStreamType> for u8 {
    fn from(value: TsStreamType) -> Self {
        value as u8
    }
}

/// 由 stream_type 字节推导 PES stream_id, 未知类型使用私有流 0xBD
pub fn stream_id_for_type(stream_type: u8) -> u8 {
    TsStreamType::from_u8(stream_type).map_or(PES_STREAM_PRIVATE, TsStreamType::stream_id)
}

/// TS 封装器配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TsMuxerConfig {
    /// PMT PID
    pub pmt_pid: u16,
    /// 第一个基本流 PID, 后续流依次加 1
    pub first_stream_pid: u16,
    /// PAT/PMT 重发间隔 (毫秒, 按 DTS 计)
    pub psi_interval_ms: u64,
    /// 视频帧缺少 AUD 时是否补写
    pub insert_aud: bool,
}

impl Default for TsMuxerConfig {
    fn default() -> Self {
        Self {
            pmt_pid: 0x200,
            first_stream_pid: 0x100,
            psi_interval_ms: 400,
            insert_aud: true,
        }
    }
}

/// TS 包输出回调, 每次收到一个完整的 188 字节包
pub type PacketCallback = Box<dyn FnMut(&[u8])>;

/// 基本流状态
struct TsStream {
    pid: u16,
    stream_type: TsStreamType,
    continuity_counter: u8,
}

/// MPEG-TS 封装器
pub struct TsMuxer {
    config: TsMuxerConfig,
    streams: Vec<TsStream>,
    pcr_pid: Option<u16>,
    pat_cc: u8,
    pmt_cc: u8,
    /// 上次写 PSI 时的 DTS (毫秒), 0 表示尚未写过
    last_psi_ms: u64,
    on_packet: Option<PacketCallback>,
}

impl Default for TsMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl TsMuxer {
    /// 使用默认配置创建
    pub fn new() -> Self {
        Self::with_config(TsMuxerConfig::default())
    }

    /// 使用指定配置创建
    pub fn with_config(config: TsMuxerConfig) -> Self {
        Self {
            config,
            streams: Vec::new(),
            pcr_pid: None,
            pat_cc: 0,
            pmt_cc: 0,
            last_psi_ms: 0,
            on_packet: None,
        }
    }

    /// 当前配置
    pub fn config(&self) -> &TsMuxerConfig {
        &self.config
    }

    /// 设置 TS 包输出回调
    pub fn set_on_packet<F>(&mut self, f: F)
    where
        F: FnMut(&[u8]) + 'static,
    {
        self.on_packet = Some(Box::new(f));
    }

    /// 当前 PCR PID
    pub fn pcr_pid(&self) -> Option<u16> {
        self.pcr_pid
    }

    /// 添加基本流, 返回分配的 PID
    ///
    /// 添加后下一次写入会重发 PAT/PMT.
    pub fn add_stream(&mut self, stream_type: TsStreamType) -> u16 {
        let pid = self.config.first_stream_pid + self.streams.len() as u16;
        self.streams.push(TsStream {
            pid,
            stream_type,
            continuity_counter: 0,
        });
        if self.pcr_pid.is_none() {
            self.pcr_pid = Some(pid);
        }
        self.last_psi_ms = 0;
        debug!("TS: 添加流 pid={:#x}, stream_type={:?}", pid, stream_type);
        pid
    }

    /// 写入一帧数据
    ///
    /// 视频为 Annex B 访问单元, 音频为 ADTS 帧. 时间戳单位为毫秒.
    pub fn write(&mut self, pid: u16, data: &[u8], pts_ms: u64, dts_ms: u64) -> LiuResult<()> {
        let idx = self
            .streams
            .iter()
            .position(|s| s.pid == pid)
            .ok_or(LiuError::UnknownStreamId(pid))?;
        let stream_type = self.streams[idx].stream_type;
        let codec = stream_type.codec();

        if codec.is_video() && self.pcr_pid != Some(pid) {
            debug!("TS: PCR PID 切换到视频流 pid={:#x}", pid);
            self.pcr_pid = Some(pid);
            self.last_psi_ms = 0;
        }

        if self.last_psi_ms == 0 || self.last_psi_ms + self.config.psi_interval_ms < dts_ms {
            self.write_psi()?;
            self.last_psi_ms = dts_ms.max(1);
        }

        let (idr, aud) = match codec {
            CodecId::H264 => (
                h264::is_idr_frame(data),
                (self.config.insert_aud && !h264::has_aud(data)).then_some(AUD_H264),
            ),
            CodecId::H265 => (
                h265::is_idr_frame(data),
                (self.config.insert_aud && !h265::has_aud(data)).then_some(AUD_H265),
            ),
            _ => (false, None),
        };

        let pts = pts_ms * 90;
        let dts = dts_ms * 90;
        let mut pes = PesPacket::new(stream_type.stream_id());
        pes.set_timestamps(pts, Some(dts));
        pes.data_alignment = idr;
        let aud = aud.unwrap_or_default();
        pes.payload = Vec::with_capacity(aud.len() + data.len());
        pes.payload.extend_from_slice(aud);
        pes.payload.extend_from_slice(data);
        pes.finalize_lengths();
        let pes_bytes = pes.to_bytes()?;

        let pcr = (self.pcr_pid == Some(pid)).then_some(if dts == 0 { pts } else { dts });
        trace!(
            "TS: 写入 PES pid={:#x}, len={}, pts={}, dts={}, idr={}",
            pid,
            pes_bytes.len(),
            pts,
            dts,
            idr
        );
        self.write_pes_cells(idx, &pes_bytes, idr, pcr)
    }

    /// 将 PES 切分为 TS 包输出
    fn write_pes_cells(
        &mut self,
        idx: usize,
        pes: &[u8],
        idr: bool,
        pcr: Option<u64>,
    ) -> LiuResult<()> {
        let pid = self.streams[idx].pid;
        let mut offset = 0;
        let mut first = true;
        let mut bw = BitWriter::with_capacity(TS_PACKET_SIZE);

        while offset < pes.len() {
            let mut af = None;
            if first && (idr || pcr.is_some()) {
                let mut field = AdaptationField::default();
                if idr {
                    field.flags |= AdaptationFlags::RANDOM_ACCESS;
                }
                if let Some(base) = pcr {
                    field.set_pcr(base, 0);
                }
                af = Some(field);
            }

            let remaining = pes.len() - offset;
            let room = TS_PACKET_SIZE - TS_HEADER_SIZE - af.as_ref().map_or(0, |f| f.encoded_len());
            if remaining < room {
                let gap = room - remaining;
                match af.as_mut() {
                    Some(field) => field.stuffing += gap,
                    None => af = Some(AdaptationField::stuffing(gap)),
                }
            }
            let take = remaining.min(room);

            let stream = &mut self.streams[idx];
            let header = TsHeader {
                payload_unit_start: first,
                pid,
                adaptation_field_control: if af.is_some() {
                    AFC_ADAPTATION_PAYLOAD
                } else {
                    AFC_PAYLOAD_ONLY
                },
                continuity_counter: stream.continuity_counter,
                ..TsHeader::default()
            };
            stream.continuity_counter = (stream.continuity_counter + 1) & 0x0F;

            bw.clear();
            header.encode(&mut bw);
            if let Some(field) = &af {
                field.encode(&mut bw)?;
            }
            bw.write_bytes(&pes[offset..offset + take])?;
            self.emit(bw.data());

            offset += take;
            first = false;
        }
        Ok(())
    }

    /// 写入 PAT 与 PMT
    fn write_psi(&mut self) -> LiuResult<()> {
        let mut pat = Pat::new(TRANSPORT_STREAM_ID, 0);
        pat.programs.push(PatProgram {
            program_number: PROGRAM_NUMBER,
            pid: self.config.pmt_pid,
        });
        let mut section = BitWriter::new();
        pat.encode(&mut section)?;
        let cc = self.pat_cc;
        self.pat_cc = (self.pat_cc + 1) & 0x0F;
        self.write_section_cell(PID_PAT, cc, section.data())?;

        let pcr_pid = self.pcr_pid.unwrap_or(self.config.first_stream_pid);
        let mut pmt = Pmt::new(PROGRAM_NUMBER, 0, pcr_pid);
        pmt.streams = self
            .streams
            .iter()
            .map(|s| PmtStream {
                stream_type: s.stream_type.into(),
                elementary_pid: s.pid,
                es_info_length: 0,
            })
            .collect();
        let mut section = BitWriter::new();
        pmt.encode(&mut section)?;
        let cc = self.pmt_cc;
        self.pmt_cc = (self.pmt_cc + 1) & 0x0F;
        self.write_section_cell(self.config.pmt_pid, cc, section.data())?;

        debug!(
            "TS: 写入 PAT/PMT, pmt_pid={:#x}, pcr_pid={:#x}, streams={}",
            self.config.pmt_pid,
            pcr_pid,
            self.streams.len()
        );
        Ok(())
    }

    /// 单个 TS 包承载一个 PSI 段: pointer_field + 段 + 0xFF 填充
    fn write_section_cell(&mut self, pid: u16, cc: u8, section: &[u8]) -> LiuResult<()> {
        if TS_HEADER_SIZE + 1 + section.len() > TS_PACKET_SIZE {
            return Err(LiuError::Unsupported(format!(
                "TS: PSI 段超过单个 TS 包容量, len={}",
                section.len()
            )));
        }
        let header = TsHeader {
            payload_unit_start: true,
            pid,
            adaptation_field_control: AFC_PAYLOAD_ONLY,
            continuity_counter: cc,
            ..TsHeader::default()
        };
        let mut bw = BitWriter::with_capacity(TS_PACKET_SIZE);
        header.encode(&mut bw);
        bw.write_bits(0, 8);
        bw.write_bytes(section)?;
        bw.pad_to(TS_PACKET_SIZE, 0xFF);
        self.emit(bw.data());
        Ok(())
    }

    fn emit(&mut self, cell: &[u8]) {
        debug_assert_eq!(cell.len(), TS_PACKET_SIZE);
        if let Some(cb) = self.on_packet.as_mut() {
            cb(cell);
        }
    }
}
