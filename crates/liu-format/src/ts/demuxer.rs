//! MPEG-TS 解封装器.
//!
//! 从 PAT 得到 PMT PID, 从 PMT 得到各基本流的 PID 与 stream_type,
//! 随后按 PID 重组 PES 并输出帧:
//! - 音频: 整个 PES 负载作为一帧
//! - H.264/H.265: 按起始码拆分为 NAL, 跳过 AUD 后逐个输出

use std::collections::{HashMap, HashSet};

use bytes::{Bytes, BytesMut};
use liu_codec::CodecId;
use liu_core::{BitReader, LiuError, LiuResult};
use log::{debug, trace, warn};

use super::muxer::TsStreamType;
use super::packet::{PID_NULL, PID_PAT, TS_PACKET_SIZE, TS_SYNC_BYTE, TsPacket};
use super::psi::{Pat, Pmt};
use crate::frame::{DemuxedFrame, FrameCallback, emit_video_nals};
use crate::io::IoContext;
use crate::pes::PesPacket;

/// 解析出的表或 PES, 供诊断回调使用
#[derive(Debug, Clone, PartialEq)]
pub enum TsTable {
    /// PAT
    Pat(Pat),
    /// PMT
    Pmt(Pmt),
    /// 完整的 PES 包
    Pes {
        /// 所属 PID
        pid: u16,
        /// PES 包
        packet: PesPacket,
    },
}

/// 诊断回调
pub type TableCallback = Box<dyn FnMut(&TsTable)>;

/// PES 重组缓冲区
struct PesBuffer {
    codec: CodecId,
    data: BytesMut,
    /// 6 + PES_packet_length, 0 长度 (视频不定长) 时为 `None`
    expected_len: Option<usize>,
    last_cc: Option<u8>,
}

impl PesBuffer {
    fn new(codec: CodecId) -> Self {
        Self {
            codec,
            data: BytesMut::new(),
            expected_len: None,
            last_cc: None,
        }
    }
}

/// MPEG-TS 解封装器
#[derive(Default)]
pub struct TsDemuxer {
    pmt_pids: HashSet<u16>,
    streams: HashMap<u16, PesBuffer>,
    on_frame: Option<FrameCallback>,
    on_table: Option<TableCallback>,
}

impl TsDemuxer {
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

    /// 设置表诊断回调
    pub fn set_on_table<F>(&mut self, f: F)
    where
        F: FnMut(&TsTable) + 'static,
    {
        self.on_table = Some(Box::new(f));
    }

    /// 已登记的基本流 PID 与编解码器
    pub fn streams(&self) -> Vec<(u16, CodecId)> {
        let mut streams: Vec<_> = self.streams.iter().map(|(&pid, s)| (pid, s.codec)).collect();
        streams.sort_unstable_by_key(|&(pid, _)| pid);
        streams
    }

    /// 读取全部输入, 到达末尾后冲刷残留数据
    ///
    /// 同步字节错误时逐字节重新同步.
    pub fn input(&mut self, io: &mut IoContext) -> LiuResult<()> {
        let mut cell = [0u8; TS_PACKET_SIZE];
        loop {
            match io.read_exact(&mut cell) {
                Ok(()) => {}
                Err(LiuError::Eof) => break,
                Err(e) => return Err(e),
            }
            if cell[0] != TS_SYNC_BYTE && !Self::resync(io, &mut cell)? {
                break;
            }
            match self.demux_packet(&cell) {
                Ok(()) => {}
                Err(LiuError::Malformed(msg)) => warn!("TS: 丢弃格式错误的包, {}", msg),
                Err(e) => return Err(e),
            }
        }
        self.flush();
        Ok(())
    }

    /// 在 `cell` 中寻找同步字节并补齐为完整的包, 到达末尾返回 false
    fn resync(io: &mut IoContext, cell: &mut [u8; TS_PACKET_SIZE]) -> LiuResult<bool> {
        loop {
            let skip = cell
                .iter()
                .position(|&b| b == TS_SYNC_BYTE)
                .unwrap_or(TS_PACKET_SIZE);
            warn!("TS: 同步字节丢失, 跳过 {} 字节", skip);
            cell.copy_within(skip.., 0);
            match io.read_exact(&mut cell[TS_PACKET_SIZE - skip..]) {
                Ok(()) => {}
                Err(LiuError::Eof) => return Ok(false),
                Err(e) => return Err(e),
            }
            if cell[0] == TS_SYNC_BYTE {
                return Ok(true);
            }
        }
    }

    /// 处理单个 188 字节 TS 包
    pub fn demux_packet(&mut self, data: &[u8]) -> LiuResult<()> {
        let packet = TsPacket::parse(data)?;
        let pid = packet.header.pid;
        if pid == PID_NULL || !packet.header.has_payload() {
            return Ok(());
        }

        if pid == PID_PAT {
            if let Some(section) = section_of(&packet)? {
                self.handle_pat(section);
            }
        } else if self.pmt_pids.contains(&pid) {
            if let Some(section) = section_of(&packet)? {
                self.handle_pmt(section);
            }
        } else if self.streams.contains_key(&pid) {
            self.handle_pes(pid, &packet);
        } else {
            trace!("TS: 忽略未登记的 PID {:#x}", pid);
        }
        Ok(())
    }

    fn handle_pat(&mut self, section: &[u8]) {
        let pat = match Pat::decode(section) {
            Ok(pat) => pat,
            Err(e) => {
                warn!("TS: PAT 解析失败, {}", e);
                return;
            }
        };
        for pid in pat.pmt_pids() {
            if self.pmt_pids.insert(pid) {
                debug!("TS: PAT 登记 PMT PID={:#06x}", pid);
            }
        }
        self.report(TsTable::Pat(pat));
    }

    fn handle_pmt(&mut self, section: &[u8]) {
        let pmt = match Pmt::decode(section) {
            Ok(pmt) => pmt,
            Err(e) => {
                warn!("TS: PMT 解析失败, {}", e);
                return;
            }
        };
        for es in &pmt.streams {
            let Some(stream_type) = TsStreamType::from_u8(es.stream_type) else {
                debug!(
                    "TS: 跳过不支持的 stream_type={:#04x}, PID={:#06x}",
                    es.stream_type, es.elementary_pid
                );
                continue;
            };
            self.streams.entry(es.elementary_pid).or_insert_with(|| {
                debug!(
                    "TS: PMT 登记流 PID={:#06x}, codec={}",
                    es.elementary_pid,
                    stream_type.codec()
                );
                PesBuffer::new(stream_type.codec())
            });
        }
        self.report(TsTable::Pmt(pmt));
    }

    fn handle_pes(&mut self, pid: u16, packet: &TsPacket<'_>) {
        let Some(stream) = self.streams.get_mut(&pid) else {
            return;
        };
        let cc = packet.header.continuity_counter;
        if let Some(last) = stream.last_cc {
            let expect = (last + 1) & 0x0F;
            if cc != expect && cc != last {
                warn!(
                    "TS: 连续性计数不连续, PID={:#06x}, expect={}, actual={}",
                    pid, expect, cc
                );
            }
        }
        stream.last_cc = Some(cc);

        let mut completed = None;
        if packet.header.payload_unit_start {
            if !stream.data.is_empty() {
                completed = Some(stream.data.split().freeze());
            }
            stream.expected_len = None;
        } else if stream.data.is_empty() {
            trace!("TS: PID={:#06x} 尚未收到 PES 起始, 丢弃负载", pid);
            return;
        }
        stream.data.extend_from_slice(packet.payload);

        if packet.header.payload_unit_start && stream.data.len() >= 6 {
            let len = usize::from(u16::from_be_bytes([stream.data[4], stream.data[5]]));
            stream.expected_len = (len != 0).then_some(6 + len);
        }
        let mut bounded = None;
        if let Some(expected) = stream.expected_len {
            if stream.data.len() >= expected {
                stream.data.truncate(expected);
                bounded = Some(stream.data.split().freeze());
                stream.expected_len = None;
            }
        }

        let codec = stream.codec;
        for pes in completed.into_iter().chain(bounded) {
            self.finish_pes(pid, codec, pes);
        }
    }

    /// 解码一个完整的 PES 并输出帧
    fn finish_pes(&mut self, pid: u16, codec: CodecId, data: Bytes) {
        let mut br = BitReader::new(&data);
        let mut pes = match PesPacket::decode(&mut br) {
            Ok(pes) => pes,
            Err(e) => {
                warn!("TS: PES 解析失败, PID={:#06x}, {}", pid, e);
                return;
            }
        };
        trace!(
            "TS: PES 完成 PID={:#06x}, len={}, pts={}, dts={}",
            pid,
            pes.payload.len(),
            pes.pts,
            pes.dts
        );

        if let Some(cb) = self.on_frame.as_mut() {
            let payload = if self.on_table.is_some() {
                Bytes::from(pes.payload.clone())
            } else {
                Bytes::from(std::mem::take(&mut pes.payload))
            };
            if codec.is_video() {
                emit_video_nals(codec, &payload, pes.pts, pes.dts, cb.as_mut());
            } else {
                cb(DemuxedFrame::from_90k(codec, payload, pes.pts, pes.dts));
            }
        }
        self.report(TsTable::Pes { pid, packet: pes });
    }

    /// 冲刷所有残留的 PES 缓冲
    pub fn flush(&mut self) {
        let mut pending: Vec<(u16, CodecId, Bytes)> = self
            .streams
            .iter_mut()
            .filter(|(_, s)| !s.data.is_empty())
            .map(|(&pid, s)| {
                s.expected_len = None;
                (pid, s.codec, s.data.split().freeze())
            })
            .collect();
        pending.sort_unstable_by_key(|&(pid, _, _)| pid);
        for (pid, codec, data) in pending {
            self.finish_pes(pid, codec, data);
        }
    }

    fn report(&mut self, table: TsTable) {
        if let Some(cb) = self.on_table.as_mut() {
            cb(&table);
        }
    }
}

/// 取出 PSI 包中 pointer_field 之后的段数据, 非段起始包返回 `None`
fn section_of<'a>(packet: &TsPacket<'a>) -> LiuResult<Option<&'a [u8]>> {
    if !packet.header.payload_unit_start {
        return Ok(None);
    }
    let payload = packet.payload;
    let Some(&pointer) = payload.first() else {
        return Ok(None);
    };
    let start = 1 + usize::from(pointer);
    if start >= payload.len() {
        return Err(LiuError::Malformed(format!(
            "TS: pointer_field 越界, pointer={}, payload={}",
            pointer,
            payload.len()
        )));
    }
    Ok(Some(&payload[start..]))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::ts::muxer::{TsMuxer, TsMuxerConfig};

    fn mux_to_bytes(f: impl FnOnce(&mut TsMuxer)) -> Vec<u8> {
        let out = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&out);
        let mut muxer = TsMuxer::with_config(TsMuxerConfig::default());
        muxer.set_on_packet(move |cell| sink.borrow_mut().extend_from_slice(cell));
        f(&mut muxer);
        out.take()
    }

    fn collect_frames(demuxer: &mut TsDemuxer) -> Rc<RefCell<Vec<DemuxedFrame>>> {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&frames);
        demuxer.set_on_frame(move |f| sink.borrow_mut().push(f));
        frames
    }

    const IDR_FRAME: &[u8] = &[
        0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E, // SPS
        0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80, // PPS
        0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, // IDR
    ];

    #[test]
    fn test_mux_demux_video_and_audio() {
        let adts = {
            let mut v = vec![0xFF, 0xF1, 0x50, 0x80, 0x02, 0x1F, 0xFC];
            v.extend_from_slice(&[0x21; 9]);
            v
        };
        let ts = mux_to_bytes(|m| {
            let video = m.add_stream(TsStreamType::H264);
            let audio = m.add_stream(TsStreamType::Aac);
            m.write(video, IDR_FRAME, 40, 0).unwrap();
            m.write(audio, &adts, 20, 20).unwrap();
        });

        let mut demuxer = TsDemuxer::new();
        let frames = collect_frames(&mut demuxer);
        demuxer.input(&mut IoContext::from_memory(ts)).unwrap();

        assert_eq!(
            demuxer.streams(),
            vec![(0x100, CodecId::H264), (0x101, CodecId::Aac)]
        );
        let frames = frames.borrow();
        // SPS, PPS, IDR (AUD 被跳过) + 一帧音频
        assert_eq!(frames.len(), 4);
        assert_eq!(&frames[0].data[..], &IDR_FRAME[..8]);
        assert_eq!(frames[2].codec, CodecId::H264);
        assert_eq!(frames[2].pts_ms, 40);
        assert_eq!(frames[2].dts_ms, 0);
        assert_eq!(frames[3].codec, CodecId::Aac);
        assert_eq!(&frames[3].data[..], &adts[..]);
        assert_eq!(frames[3].pts_ms, 20);
    }

    #[test]
    fn test_bounded_pes_completes_without_next_start() {
        let frame = vec![0x5A; 600];
        let ts = mux_to_bytes(|m| {
            let audio = m.add_stream(TsStreamType::Aac);
            m.write(audio, &frame, 0, 0).unwrap();
        });

        let mut demuxer = TsDemuxer::new();
        let frames = collect_frames(&mut demuxer);
        for cell in ts.chunks(TS_PACKET_SIZE) {
            demuxer.demux_packet(cell).unwrap();
        }
        // packet_length 已知, 收满即输出, 无需 flush
        assert_eq!(frames.borrow().len(), 1);
        assert_eq!(frames.borrow()[0].data.len(), 600);
        demuxer.flush();
        assert_eq!(frames.borrow().len(), 1);
    }

    #[test]
    fn test_corrupted_pat_is_dropped() {
        let mut ts = mux_to_bytes(|m| {
            let audio = m.add_stream(TsStreamType::Aac);
            m.write(audio, &[0x01; 8], 0, 0).unwrap();
        });
        // 破坏 PAT 的 CRC
        ts[5 + 12] ^= 0xFF;

        let mut demuxer = TsDemuxer::new();
        let tables = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&tables);
        demuxer.set_on_table(move |t| sink.borrow_mut().push(t.clone()));
        let frames = collect_frames(&mut demuxer);
        demuxer.input(&mut IoContext::from_memory(ts)).unwrap();

        // PAT 被丢弃, PMT 与 PES 无从登记
        assert!(tables.borrow().is_empty());
        assert!(frames.borrow().is_empty());
    }

    #[test]
    fn test_table_callback_and_resync() {
        let ts = mux_to_bytes(|m| {
            let video = m.add_stream(TsStreamType::H265);
            m.write(video, &[0x00, 0x00, 0x00, 0x01, 0x26, 0x01, 0xAF], 0, 0)
                .unwrap();
        });
        let mut input = vec![0x00, 0x12, 0x34];
        input.extend_from_slice(&ts);

        let mut demuxer = TsDemuxer::new();
        let tables = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&tables);
        demuxer.set_on_table(move |t| sink.borrow_mut().push(t.clone()));
        let frames = collect_frames(&mut demuxer);
        demuxer.input(&mut IoContext::from_memory(input)).unwrap();

        let tables = tables.borrow();
        assert!(matches!(tables[0], TsTable::Pat(_)));
        assert!(matches!(tables[1], TsTable::Pmt(_)));
        assert!(matches!(tables[2], TsTable::Pes { pid: 0x100, .. }));
        let frames = frames.borrow();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].codec, CodecId::H265);
    }

    #[test]
    fn test_pointer_field_out_of_range() {
        let mut cell = [0xFFu8; TS_PACKET_SIZE];
        cell[..5].copy_from_slice(&[0x47, 0x40, 0x00, 0x10, 0xFF]);
        let mut demuxer = TsDemuxer::new();
        assert!(matches!(
            demuxer.demux_packet(&cell),
            Err(LiuError::Malformed(_))
        ));
    }
}
