//! PS 记录: pack header, system header, PSM, 目录与通用 PES.
//!
//! 所有 `decode` 在数据不足时返回 `NeedMore`, 读游标恢复到调用前的位置;
//! 起始码或长度字段不一致时返回 `Malformed`.

use liu_codec::CodecId;
use liu_core::crc::crc32_mpeg2;
use liu_core::{BitReader, BitWriter, LiuError, LiuResult};

use crate::pes::{read_timestamp, write_timestamp};

/// MPEG_program_end_code
pub const PS_END_CODE: u32 = 0x0000_01B9;
/// pack_start_code
pub const PACK_START_CODE: u32 = 0x0000_01BA;
/// system_header_start_code
pub const SYSTEM_HEADER_START_CODE: u32 = 0x0000_01BB;
/// program_stream_map
pub const PSM_START_CODE: u32 = 0x0000_01BC;
/// program_stream_directory
pub const DIRECTORY_START_CODE: u32 = 0x0000_01FF;

/// PS 中的码流类型 (PSM stream_type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PsStreamType {
    /// 未知 (MPEG-1 无 PSM 时待推测)
    Unknown = 0xFF,
    /// AAC
    Aac = 0x0F,
    /// H.264
    H264 = 0x1B,
    /// H.265
    H265 = 0x24,
    /// G.711 A-law
    G711A = 0x90,
    /// G.711 μ-law
    G711U = 0x91,
}

impl PsStreamType {
    /// 从 stream_type 字节转换, 无法识别的值映射为 `Unknown`
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x0F => Self::Aac,
            0x1B => Self::H264,
            0x24 => Self::H265,
            0x90 => Self::G711A,
            0x91 => Self::G711U,
            _ => Self::Unknown,
        }
    }

    /// 对应的编解码器
    pub fn codec(self) -> CodecId {
        match self {
            Self::Unknown => CodecId::None,
            Self::Aac => CodecId::Aac,
            Self::H264 => CodecId::H264,
            Self::H265 => CodecId::H265,
            Self::G711A => CodecId::G711A,
            Self::G711U => CodecId::G711U,
        }
    }

    /// 是否为视频
    pub fn is_video(self) -> bool {
        matches!(self, Self::H264 | Self::H265)
    }

    /// 是否为音频
    pub fn is_audio(self) -> bool {
        matches!(self, Self::Aac | Self::G711A | Self::G711U)
    }
}

impl From<PsStreamType> for u8 {
    fn from(value: PsStreamType) -> Self {
        value as u8
    }
}

/// 按 4 字节前缀划分的记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PsRecordKind {
    /// 0x000001BA
    PackHeader,
    /// 0x000001BB
    SystemHeader,
    /// 0x000001BC
    StreamMap,
    /// 0x000001FF
    Directory,
    /// 0x000001B9
    EndCode,
    /// 0x000001BD..=0x000001BF, 0x000001F0..=0x000001FB
    GenericPes,
    /// 0x000001C0..=0x000001DF
    AudioPes,
    /// 0x000001E0..=0x000001EF
    VideoPes,
    /// 其他
    Unknown,
}

/// 根据接下来的 4 个字节判断记录类型
pub fn classify(prefix: u32) -> PsRecordKind {
    match prefix {
        PACK_START_CODE => PsRecordKind::PackHeader,
        SYSTEM_HEADER_START_CODE => PsRecordKind::SystemHeader,
        PSM_START_CODE => PsRecordKind::StreamMap,
        DIRECTORY_START_CODE => PsRecordKind::Directory,
        PS_END_CODE => PsRecordKind::EndCode,
        0x0000_01BD..=0x0000_01BF | 0x0000_01F0..=0x0000_01FB => PsRecordKind::GenericPes,
        0x0000_01C0..=0x0000_01DF => PsRecordKind::AudioPes,
        0x0000_01E0..=0x0000_01EF => PsRecordKind::VideoPes,
        _ => PsRecordKind::Unknown,
    }
}

/// 解码失败且原因为数据不足时恢复读游标
fn rollback_on_need_more<'a, T, F>(br: &mut BitReader<'a>, f: F) -> LiuResult<T>
where
    F: FnOnce(&mut BitReader<'a>) -> LiuResult<T>,
{
    let start = br.bits_read();
    let result = f(br);
    if matches!(result, Err(LiuError::NeedMore)) {
        br.unread(br.bits_read() - start)?;
    }
    result
}

fn expect_start_code(br: &mut BitReader, expect: u32, what: &str) -> LiuResult<()> {
    let code = br.read_bits(32)?;
    if code != expect {
        return Err(LiuError::Malformed(format!(
            "PS: {} 起始码错误, expect={:#010x}, actual={:#010x}",
            what, expect, code
        )));
    }
    Ok(())
}

fn need_bytes(br: &BitReader, n: usize) -> LiuResult<()> {
    if br.bytes_left() < n {
        return Err(LiuError::NeedMore);
    }
    Ok(())
}

// ============================================================
// Pack header
// ============================================================

/// Pack header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackHeader {
    /// 是否为 MPEG-1 格式
    pub is_mpeg1: bool,
    /// system_clock_reference_base (90kHz)
    pub scr_base: u64,
    /// system_clock_reference_extension, MPEG-1 无此字段
    pub scr_extension: u16,
    /// program_mux_rate (50 字节/秒)
    pub mux_rate: u32,
    /// pack_stuffing_length
    pub stuffing_length: u8,
}

impl PackHeader {
    /// 解码 pack header, 自动识别 MPEG-1/MPEG-2
    pub fn decode(br: &mut BitReader) -> LiuResult<Self> {
        rollback_on_need_more(br, |br| {
            need_bytes(br, 5)?;
            expect_start_code(br, PACK_START_CODE, "pack header")?;
            if br.peek_bits(2)? == 0b01 {
                need_bytes(br, 10)?;
                Self::decode_mpeg2(br)
            } else if br.peek_bits(4)? == 0b0010 {
                need_bytes(br, 8)?;
                Self::decode_mpeg1(br)
            } else {
                Err(LiuError::Malformed(format!(
                    "PS: pack header 标记非法, bits={:#x}",
                    br.peek_bits(4)?
                )))
            }
        })
    }

    fn decode_mpeg2(br: &mut BitReader) -> LiuResult<Self> {
        br.skip_bits(2)?;
        let high = u64::from(br.read_bits(3)?);
        br.skip_bits(1)?;
        let mid = u64::from(br.read_bits(15)?);
        br.skip_bits(1)?;
        let low = u64::from(br.read_bits(15)?);
        br.skip_bits(1)?;
        let scr_extension = br.read_bits(9)? as u16;
        br.skip_bits(1)?;
        let mux_rate = br.read_bits(22)?;
        br.skip_bits(2 + 5)?;
        let stuffing_length = br.read_bits(3)? as u8;
        need_bytes(br, usize::from(stuffing_length))?;
        br.skip_bytes(usize::from(stuffing_length))?;
        Ok(Self {
            is_mpeg1: false,
            scr_base: (high << 30) | (mid << 15) | low,
            scr_extension,
            mux_rate,
            stuffing_length,
        })
    }

    fn decode_mpeg1(br: &mut BitReader) -> LiuResult<Self> {
        let scr_base = read_timestamp(br)?;
        br.skip_bits(1)?;
        let mux_rate = br.read_bits(22)?;
        br.skip_bits(1)?;
        Ok(Self {
            is_mpeg1: true,
            scr_base,
            scr_extension: 0,
            mux_rate,
            stuffing_length: 0,
        })
    }

    /// 编码 pack header (按 `is_mpeg1` 选择格式)
    pub fn encode(&self, bw: &mut BitWriter) -> LiuResult<()> {
        bw.write_bits(PACK_START_CODE, 32);
        if self.is_mpeg1 {
            write_timestamp(bw, 0b0010, self.scr_base);
            bw.write_bit(1);
            bw.write_bits(self.mux_rate, 22);
            bw.write_bit(1);
            return Ok(());
        }
        if self.stuffing_length > 7 {
            return Err(LiuError::InvalidArgument(format!(
                "PS: pack_stuffing_length 超出范围, len={}",
                self.stuffing_length
            )));
        }
        bw.write_bits(0b01, 2);
        bw.write_bits_u64(self.scr_base >> 30, 3);
        bw.write_bit(1);
        bw.write_bits_u64(self.scr_base >> 15, 15);
        bw.write_bit(1);
        bw.write_bits_u64(self.scr_base, 15);
        bw.write_bit(1);
        bw.write_bits(u32::from(self.scr_extension), 9);
        bw.write_bit(1);
        bw.write_bits(self.mux_rate, 22);
        bw.write_bits(0b11, 2);
        bw.write_bits(0x1F, 5);
        bw.write_bits(u32::from(self.stuffing_length), 3);
        bw.write_repeat(0xFF, usize::from(self.stuffing_length));
        Ok(())
    }
}

// ============================================================
// System header
// ============================================================

/// System header 中的流条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemHeaderStream {
    /// stream_id
    pub stream_id: u8,
    /// P-STD_buffer_bound_scale (0: 128 字节, 1: 1024 字节)
    pub buffer_bound_scale: bool,
    /// P-STD_buffer_size_bound
    pub buffer_size_bound: u16,
}

/// System header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemHeader {
    /// header_length
    pub header_length: u16,
    /// rate_bound
    pub rate_bound: u32,
    /// audio_bound
    pub audio_bound: u8,
    /// fixed_flag
    pub fixed: bool,
    /// CSPS_flag
    pub csps: bool,
    /// system_audio_lock_flag
    pub audio_lock: bool,
    /// system_video_lock_flag
    pub video_lock: bool,
    /// video_bound
    pub video_bound: u8,
    /// packet_rate_restriction_flag
    pub packet_rate_restriction: bool,
    /// 流条目
    pub streams: Vec<SystemHeaderStream>,
}

impl SystemHeader {
    /// 解码 system header
    pub fn decode(br: &mut BitReader) -> LiuResult<Self> {
        rollback_on_need_more(br, |br| {
            need_bytes(br, 12)?;
            expect_start_code(br, SYSTEM_HEADER_START_CODE, "system header")?;
            let header_length = br.read_bits(16)? as u16;
            need_bytes(br, usize::from(header_length))?;
            if header_length < 6 || (header_length - 6) % 3 != 0 {
                return Err(LiuError::Malformed(format!(
                    "PS: system header 长度非法, header_length={}",
                    header_length
                )));
            }

            br.skip_bits(1)?;
            let rate_bound = br.read_bits(22)?;
            br.skip_bits(1)?;
            let mut sh = Self {
                header_length,
                rate_bound,
                audio_bound: br.read_bits(6)? as u8,
                fixed: br.read_flag()?,
                csps: br.read_flag()?,
                audio_lock: br.read_flag()?,
                video_lock: br.read_flag()?,
                ..Self::default()
            };
            br.skip_bits(1)?;
            sh.video_bound = br.read_bits(5)? as u8;
            sh.packet_rate_restriction = br.read_flag()?;
            br.skip_bits(7)?;

            let mut least = usize::from(header_length) - 6;
            while least > 0 && br.peek_bits(1)? == 1 {
                let stream_id = br.read_bits(8)? as u8;
                br.skip_bits(2)?;
                sh.streams.push(SystemHeaderStream {
                    stream_id,
                    buffer_bound_scale: br.read_flag()?,
                    buffer_size_bound: br.read_bits(13)? as u16,
                });
                least -= 3;
            }
            if least > 0 {
                return Err(LiuError::Malformed(format!(
                    "PS: system header 流条目不完整, 剩余 {} 字节",
                    least
                )));
            }
            Ok(sh)
        })
    }

    /// 编码 system header, header_length 回填
    pub fn encode(&self, bw: &mut BitWriter) -> LiuResult<()> {
        bw.write_bits(SYSTEM_HEADER_START_CODE, 32);
        let loc = bw.byte_offset();
        bw.write_bits(0, 16);
        bw.mark();
        bw.write_bit(1);
        bw.write_bits(self.rate_bound, 22);
        bw.write_bit(1);
        bw.write_bits(u32::from(self.audio_bound), 6);
        bw.write_flag(self.fixed);
        bw.write_flag(self.csps);
        bw.write_flag(self.audio_lock);
        bw.write_flag(self.video_lock);
        bw.write_bit(1);
        bw.write_bits(u32::from(self.video_bound), 5);
        bw.write_flag(self.packet_rate_restriction);
        bw.write_bits(0x7F, 7);
        for stream in &self.streams {
            bw.write_bits(u32::from(stream.stream_id), 8);
            bw.write_bits(0b11, 2);
            bw.write_flag(stream.buffer_bound_scale);
            bw.write_bits(u32::from(stream.buffer_size_bound), 13);
        }
        let length = bw.distance_from_mark() / 8;
        bw.set_u16_at(loc, length as u16)
    }
}

// ============================================================
// Program stream map
// ============================================================

/// PSM 中的基本流条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsmStream {
    /// stream_type
    pub stream_type: u8,
    /// elementary_stream_id
    pub elementary_stream_id: u8,
    /// elementary_stream_info_length (描述符被跳过)
    pub info_length: u16,
}

/// Program stream map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramStreamMap {
    /// program_stream_map_length
    pub map_length: u16,
    /// current_next_indicator
    pub current_next: bool,
    /// program_stream_map_version
    pub version: u8,
    /// program_stream_info_length (描述符被跳过)
    pub info_length: u16,
    /// elementary_stream_map_length
    pub es_map_length: u16,
    /// 基本流条目
    pub streams: Vec<PsmStream>,
    /// CRC_32 (解码时原样读取)
    pub crc: u32,
}

impl Default for ProgramStreamMap {
    fn default() -> Self {
        Self {
            map_length: 0,
            current_next: true,
            version: 0,
            info_length: 0,
            es_map_length: 0,
            streams: Vec::new(),
            crc: 0,
        }
    }
}

impl ProgramStreamMap {
    /// 解码 PSM
    ///
    /// CRC 不参与校验, 不少设备写入的 CRC 并不正确.
    pub fn decode(br: &mut BitReader) -> LiuResult<Self> {
        rollback_on_need_more(br, |br| {
            need_bytes(br, 16)?;
            expect_start_code(br, PSM_START_CODE, "PSM")?;
            let map_length = br.read_bits(16)? as u16;
            need_bytes(br, usize::from(map_length))?;

            let current_next = br.read_flag()?;
            br.skip_bits(2)?;
            let version = br.read_bits(5)? as u8;
            br.skip_bits(8)?;
            let info_length = br.read_bits(16)? as u16;
            if 6 + usize::from(info_length) + 4 > usize::from(map_length) {
                return Err(LiuError::Malformed(format!(
                    "PS: PSM program_stream_info_length 超出范围, info_length={}, map_length={}",
                    info_length, map_length
                )));
            }
            br.skip_bytes(usize::from(info_length))?;
            let es_map_length = br.read_bits(16)? as u16;
            if usize::from(map_length)
                != 6 + usize::from(info_length) + usize::from(es_map_length) + 4
            {
                return Err(LiuError::Malformed(format!(
                    "PS: PSM 长度不一致, map_length={}, info_length={}, es_map_length={}",
                    map_length, info_length, es_map_length
                )));
            }

            let mut streams = Vec::new();
            let mut used = 0usize;
            let es_map_length_usize = usize::from(es_map_length);
            while used < es_map_length_usize {
                if used + 4 > es_map_length_usize {
                    return Err(LiuError::Malformed(format!(
                        "PS: PSM 流条目被截断, used={}, es_map_length={}",
                        used, es_map_length
                    )));
                }
                let stream_type = br.read_bits(8)? as u8;
                let elementary_stream_id = br.read_bits(8)? as u8;
                let info_length = br.read_bits(16)? as u16;
                used += 4 + usize::from(info_length);
                if used > es_map_length_usize {
                    return Err(LiuError::Malformed(format!(
                        "PS: PSM elementary_stream_info_length 超出范围, stream_id={:#04x}",
                        elementary_stream_id
                    )));
                }
                br.skip_bytes(usize::from(info_length))?;
                streams.push(PsmStream {
                    stream_type,
                    elementary_stream_id,
                    info_length,
                });
            }
            let crc = br.read_bits(32)?;

            Ok(Self {
                map_length,
                current_next,
                version,
                info_length,
                es_map_length,
                streams,
                crc,
            })
        })
    }

    /// 编码 PSM, 不写描述符; 长度回填, CRC 覆盖起始码到最后一个条目 (大端)
    pub fn encode(&self, bw: &mut BitWriter) -> LiuResult<()> {
        let start = bw.byte_offset();
        bw.write_bits(PSM_START_CODE, 32);
        let loc = bw.byte_offset();
        bw.write_bits(0, 16);
        bw.mark();
        bw.write_flag(self.current_next);
        bw.write_bits(0b11, 2);
        bw.write_bits(u32::from(self.version), 5);
        bw.write_bits(0x7F, 7);
        bw.write_bit(1);
        bw.write_bits(0, 16);
        bw.write_bits((self.streams.len() * 4) as u32, 16);
        for stream in &self.streams {
            bw.write_bits(u32::from(stream.stream_type), 8);
            bw.write_bits(u32::from(stream.elementary_stream_id), 8);
            bw.write_bits(0, 16);
        }
        let length = bw.distance_from_mark() / 8 + 4;
        let length = u16::try_from(length).map_err(|_| {
            LiuError::InvalidArgument(format!("PS: PSM 过长, len={}", length))
        })?;
        bw.set_u16_at(loc, length)?;
        let crc = crc32_mpeg2(&bw.data()[start..]);
        bw.write_bits(crc, 32);
        Ok(())
    }
}

// ============================================================
// 按长度跳过的记录
// ============================================================

/// 只解析长度并整体跳过的记录 (目录与通用 PES)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedRecord {
    /// stream_id
    pub stream_id: u8,
    /// PES_packet_length
    pub length: u16,
}

impl SkippedRecord {
    /// 读取 6 字节头部并跳过其后 `length` 字节
    pub fn decode(br: &mut BitReader) -> LiuResult<Self> {
        rollback_on_need_more(br, |br| {
            need_bytes(br, 6)?;
            let prefix = br.read_bits(24)?;
            if prefix != 0x00_0001 {
                return Err(LiuError::Malformed(format!(
                    "PS: 起始码前缀错误, prefix={:#08x}",
                    prefix
                )));
            }
            let stream_id = br.read_bits(8)? as u8;
            let length = br.read_bits(16)? as u16;
            need_bytes(br, usize::from(length))?;
            br.skip_bytes(usize::from(length))?;
            Ok(Self { stream_id, length })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(0x0000_01BA), PsRecordKind::PackHeader);
        assert_eq!(classify(0x0000_01BB), PsRecordKind::SystemHeader);
        assert_eq!(classify(0x0000_01BC), PsRecordKind::StreamMap);
        assert_eq!(classify(0x0000_01BE), PsRecordKind::GenericPes);
        assert_eq!(classify(0x0000_01FA), PsRecordKind::GenericPes);
        assert_eq!(classify(0x0000_01FC), PsRecordKind::Unknown);
        assert_eq!(classify(0x0000_01FF), PsRecordKind::Directory);
        assert_eq!(classify(0x0000_01B9), PsRecordKind::EndCode);
        assert_eq!(classify(0x0000_01C5), PsRecordKind::AudioPes);
        assert_eq!(classify(0x0000_01DF), PsRecordKind::AudioPes);
        assert_eq!(classify(0x0000_01E0), PsRecordKind::VideoPes);
        assert_eq!(classify(0x0000_01F0), PsRecordKind::GenericPes);
        assert_eq!(classify(0x0000_0100), PsRecordKind::Unknown);
        assert_eq!(classify(0x4700_01E0), PsRecordKind::Unknown);
    }

    #[test]
    fn test_pack_header_mpeg2_round_trip() {
        let header = PackHeader {
            scr_base: 0x1_2345_6789,
            scr_extension: 123,
            mux_rate: 6106,
            stuffing_length: 2,
            ..PackHeader::default()
        };
        let mut bw = BitWriter::new();
        header.encode(&mut bw).unwrap();
        let bytes = bw.finish();
        assert_eq!(bytes.len(), 14 + 2);
        assert_eq!(bytes[4] >> 6, 0b01);
        assert_eq!(bytes[13] & 0x07, 2);

        let mut br = BitReader::new(&bytes);
        assert_eq!(PackHeader::decode(&mut br).unwrap(), header);
        assert!(br.is_eof());
    }

    #[test]
    fn test_pack_header_mpeg1() {
        let header = PackHeader {
            is_mpeg1: true,
            scr_base: 90_000,
            mux_rate: 2000,
            ..PackHeader::default()
        };
        let mut bw = BitWriter::new();
        header.encode(&mut bw).unwrap();
        let bytes = bw.finish();
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes[4] >> 4, 0b0010);
        assert_eq!(PackHeader::decode(&mut BitReader::new(&bytes)).unwrap(), header);
    }

    #[test]
    fn test_pack_header_need_more_restores_cursor() {
        let mut bw = BitWriter::new();
        PackHeader {
            stuffing_length: 3,
            ..PackHeader::default()
        }
        .encode(&mut bw)
        .unwrap();
        let bytes = bw.finish();
        let mut br = BitReader::new(&bytes[..15]);
        assert!(matches!(PackHeader::decode(&mut br), Err(LiuError::NeedMore)));
        assert_eq!(br.bits_read(), 0);
    }

    #[test]
    fn test_system_header_round_trip() {
        let sh = SystemHeader {
            header_length: 12,
            rate_bound: 26234,
            audio_bound: 1,
            audio_lock: true,
            video_lock: true,
            video_bound: 1,
            streams: vec![
                SystemHeaderStream {
                    stream_id: 0xE0,
                    buffer_bound_scale: true,
                    buffer_size_bound: 400,
                },
                SystemHeaderStream {
                    stream_id: 0xC0,
                    buffer_bound_scale: false,
                    buffer_size_bound: 32,
                },
            ],
            ..SystemHeader::default()
        };
        let mut bw = BitWriter::new();
        sh.encode(&mut bw).unwrap();
        let bytes = bw.finish();
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 12);
        assert_eq!(SystemHeader::decode(&mut BitReader::new(&bytes)).unwrap(), sh);
    }

    #[test]
    fn test_system_header_bad_length() {
        let mut bytes = vec![0x00, 0x00, 0x01, 0xBB, 0x00, 0x07];
        bytes.extend_from_slice(&[0x80, 0x00, 0x01, 0x04, 0xE1, 0xFF, 0x00]);
        assert!(matches!(
            SystemHeader::decode(&mut BitReader::new(&bytes)),
            Err(LiuError::Malformed(_))
        ));
    }

    #[test]
    fn test_psm_round_trip_and_crc() {
        let psm = ProgramStreamMap {
            streams: vec![
                PsmStream {
                    stream_type: 0x1B,
                    elementary_stream_id: 0xE0,
                    info_length: 0,
                },
                PsmStream {
                    stream_type: 0x90,
                    elementary_stream_id: 0xC0,
                    info_length: 0,
                },
            ],
            ..ProgramStreamMap::default()
        };
        let mut bw = BitWriter::new();
        psm.encode(&mut bw).unwrap();
        let bytes = bw.finish();
        assert_eq!(crc32_mpeg2(&bytes), 0);

        let decoded = ProgramStreamMap::decode(&mut BitReader::new(&bytes)).unwrap();
        assert_eq!(decoded.map_length, 6 + 8 + 4);
        assert_eq!(decoded.es_map_length, 8);
        assert_eq!(decoded.streams, psm.streams);
        assert!(decoded.current_next);
    }

    #[test]
    fn test_psm_inconsistent_length() {
        let mut bw = BitWriter::new();
        ProgramStreamMap {
            streams: vec![PsmStream {
                stream_type: 0x1B,
                elementary_stream_id: 0xE0,
                info_length: 0,
            }],
            ..ProgramStreamMap::default()
        }
        .encode(&mut bw)
        .unwrap();
        let mut bytes = bw.finish();
        // elementary_stream_map_length 改为 8
        bytes[11] = 8;
        bytes.extend_from_slice(&[0; 8]);
        assert!(matches!(
            ProgramStreamMap::decode(&mut BitReader::new(&bytes)),
            Err(LiuError::Malformed(_))
        ));
    }

    #[test]
    fn test_skipped_record() {
        let bytes = [0x00, 0x00, 0x01, 0xBE, 0x00, 0x03, 0xFF, 0xFF, 0xFF, 0x00];
        let mut br = BitReader::new(&bytes);
        let record = SkippedRecord::decode(&mut br).unwrap();
        assert_eq!(record.stream_id, 0xBE);
        assert_eq!(record.length, 3);
        assert_eq!(br.bytes_left(), 1);

        let mut br = BitReader::new(&bytes[..7]);
        assert!(matches!(SkippedRecord::decode(&mut br), Err(LiuError::NeedMore)));
        assert_eq!(br.bits_read(), 0);
    }
}
