//! TS 包头与自适应字段.
//!
//! # TS 包结构 (188 字节)
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ 同步字节 (0x47)                    1 byte│
//! │ TEI(1) + PUSI(1) + Priority(1) +         │
//! │   PID(13)                         2 bytes│
//! │ TSC(2) + AFC(2) + CC(4)          1 byte  │
//! │ [Adaptation Field]               可变     │
//! │ [Payload]                        可变     │
//! └──────────────────────────────────────────┘
//! ```

use bitflags::bitflags;
use liu_core::{BitReader, BitWriter, LiuError, LiuResult};

/// TS 包大小
pub const TS_PACKET_SIZE: usize = 188;
/// TS 同步字节
pub const TS_SYNC_BYTE: u8 = 0x47;
/// TS 包头长度
pub const TS_HEADER_SIZE: usize = 4;
/// PAT PID
pub const PID_PAT: u16 = 0x0000;
/// 空包 PID
pub const PID_NULL: u16 = 0x1FFF;

/// adaptation_field_control: 仅负载
pub const AFC_PAYLOAD_ONLY: u8 = 0b01;
/// adaptation_field_control: 仅自适应字段
pub const AFC_ADAPTATION_ONLY: u8 = 0b10;
/// adaptation_field_control: 自适应字段 + 负载
pub const AFC_ADAPTATION_PAYLOAD: u8 = 0b11;

/// TS 包头
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TsHeader {
    /// transport_error_indicator
    pub transport_error: bool,
    /// payload_unit_start_indicator
    pub payload_unit_start: bool,
    /// transport_priority
    pub transport_priority: bool,
    /// PID (13 位)
    pub pid: u16,
    /// transport_scrambling_control
    pub scrambling_control: u8,
    /// adaptation_field_control
    pub adaptation_field_control: u8,
    /// continuity_counter (4 位)
    pub continuity_counter: u8,
}

impl TsHeader {
    /// 是否携带自适应字段
    pub fn has_adaptation(&self) -> bool {
        self.adaptation_field_control & 0b10 != 0
    }

    /// 是否携带负载
    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0b01 != 0
    }

    /// 编码 4 字节包头
    pub fn encode(&self, bw: &mut BitWriter) {
        bw.write_bits(u32::from(TS_SYNC_BYTE), 8);
        bw.write_flag(self.transport_error);
        bw.write_flag(self.payload_unit_start);
        bw.write_flag(self.transport_priority);
        bw.write_bits(u32::from(self.pid), 13);
        bw.write_bits(u32::from(self.scrambling_control), 2);
        bw.write_bits(u32::from(self.adaptation_field_control), 2);
        bw.write_bits(u32::from(self.continuity_counter), 4);
    }

    /// 解码 4 字节包头
    pub fn decode(br: &mut BitReader) -> LiuResult<Self> {
        let sync = br.read_bits(8)?;
        if sync != u32::from(TS_SYNC_BYTE) {
            return Err(LiuError::Malformed(format!(
                "TS: 同步字节不匹配, sync={:#04x}",
                sync
            )));
        }
        Ok(Self {
            transport_error: br.read_flag()?,
            payload_unit_start: br.read_flag()?,
            transport_priority: br.read_flag()?,
            pid: br.read_bits(13)? as u16,
            scrambling_control: br.read_bits(2)? as u8,
            adaptation_field_control: br.read_bits(2)? as u8,
            continuity_counter: br.read_bits(4)? as u8,
        })
    }
}

bitflags! {
    /// 自适应字段标志字节
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct AdaptationFlags: u8 {
        const DISCONTINUITY = 0x80;
        const RANDOM_ACCESS = 0x40;
        const ES_PRIORITY = 0x20;
        const PCR = 0x10;
        const OPCR = 0x08;
        const SPLICING_POINT = 0x04;
        const TRANSPORT_PRIVATE_DATA = 0x02;
        const EXTENSION = 0x01;
    }
}

/// 自适应字段扩展
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdaptationExtension {
    /// adaptation_field_extension_length
    pub length: u8,
    /// (ltw_valid_flag, ltw_offset)
    pub ltw: Option<(bool, u16)>,
    /// piecewise_rate
    pub piecewise_rate: Option<u32>,
    /// (splice_type, DTS_next_AU)
    pub seamless_splice: Option<(u8, u64)>,
}

/// 自适应字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptationField {
    /// adaptation_field_length
    pub length: u8,
    /// 标志字节
    pub flags: AdaptationFlags,
    /// program_clock_reference_base (33 位)
    pub pcr_base: u64,
    /// program_clock_reference_extension (9 位)
    pub pcr_extension: u16,
    /// original_program_clock_reference_base
    pub opcr_base: u64,
    /// original_program_clock_reference_extension
    pub opcr_extension: u16,
    /// splice_countdown
    pub splice_countdown: i8,
    /// transport_private_data_length
    pub private_data_length: u8,
    /// 扩展字段
    pub extension: Option<AdaptationExtension>,
    /// 填充字节数
    pub stuffing: usize,
    /// 长度为 0 的自适应字段 (只占 1 字节, 用于填充单个字节)
    pub single_stuffing_byte: bool,
}

impl AdaptationField {
    /// 单字节填充用的空自适应字段
    pub fn single_stuffing() -> Self {
        Self {
            single_stuffing_byte: true,
            ..Self::default()
        }
    }

    /// 用于填充 `n` (n >= 1) 个字节的自适应字段
    pub fn stuffing(n: usize) -> Self {
        if n <= 1 {
            Self::single_stuffing()
        } else {
            Self {
                stuffing: n - 2,
                ..Self::default()
            }
        }
    }

    /// 设置 PCR (27MHz 时钟拆分为 base/extension)
    pub fn set_pcr(&mut self, base: u64, extension: u16) {
        self.flags |= AdaptationFlags::PCR;
        self.pcr_base = base;
        self.pcr_extension = extension;
    }

    /// 是否为随机访问点
    pub fn is_random_access(&self) -> bool {
        self.flags.contains(AdaptationFlags::RANDOM_ACCESS)
    }

    /// 编码后总字节数 (含长度字节)
    pub fn encoded_len(&self) -> usize {
        if self.single_stuffing_byte {
            return 1;
        }
        let mut len = 2;
        if self.flags.contains(AdaptationFlags::PCR) {
            len += 6;
        }
        if self.flags.contains(AdaptationFlags::OPCR) {
            len += 6;
        }
        if self.flags.contains(AdaptationFlags::SPLICING_POINT) {
            len += 1;
        }
        len + self.stuffing
    }

    /// 编码自适应字段
    ///
    /// 私有数据与扩展字段不写出, 对应标志位清零. 长度字节在写完后回填.
    pub fn encode(&self, bw: &mut BitWriter) -> LiuResult<()> {
        let loc = bw.byte_offset();
        bw.write_bits(0, 8);
        if self.single_stuffing_byte {
            return Ok(());
        }
        bw.mark();
        let flags = self.flags
            - AdaptationFlags::TRANSPORT_PRIVATE_DATA
            - AdaptationFlags::EXTENSION;
        bw.write_bits(u32::from(flags.bits()), 8);
        if flags.contains(AdaptationFlags::PCR) {
            write_clock_reference(bw, self.pcr_base, self.pcr_extension);
        }
        if flags.contains(AdaptationFlags::OPCR) {
            write_clock_reference(bw, self.opcr_base, self.opcr_extension);
        }
        if flags.contains(AdaptationFlags::SPLICING_POINT) {
            bw.write_bits(u32::from(self.splice_countdown as u8), 8);
        }
        bw.write_repeat(0xFF, self.stuffing);
        let length = bw.distance_from_mark() / 8;
        let length = u8::try_from(length).map_err(|_| {
            LiuError::InvalidArgument(format!("TS: 自适应字段过长, len={}", length))
        })?;
        bw.set_u8_at(loc, length)
    }

    /// 解码自适应字段
    pub fn decode(br: &mut BitReader) -> LiuResult<Self> {
        let mut af = Self {
            length: br.read_bits(8)? as u8,
            ..Self::default()
        };
        let length = usize::from(af.length);
        if br.bytes_left() < length {
            return Err(LiuError::Malformed(format!(
                "TS: 自适应字段长度超出包长度, length={}, remain={}",
                length,
                br.bytes_left()
            )));
        }
        if length == 0 {
            af.single_stuffing_byte = true;
            return Ok(af);
        }

        br.mark();
        af.flags = AdaptationFlags::from_bits_retain(br.read_bits(8)? as u8);
        if af.flags.contains(AdaptationFlags::PCR) {
            (af.pcr_base, af.pcr_extension) = read_clock_reference(br)?;
        }
        if af.flags.contains(AdaptationFlags::OPCR) {
            (af.opcr_base, af.opcr_extension) = read_clock_reference(br)?;
        }
        if af.flags.contains(AdaptationFlags::SPLICING_POINT) {
            af.splice_countdown = br.read_bits(8)? as u8 as i8;
        }
        if af.flags.contains(AdaptationFlags::TRANSPORT_PRIVATE_DATA) {
            af.private_data_length = br.read_bits(8)? as u8;
            br.skip_bytes(usize::from(af.private_data_length))?;
        }
        if af.flags.contains(AdaptationFlags::EXTENSION) {
            af.extension = Some(decode_extension(br)?);
        }

        let used = br.distance_from_mark() / 8;
        if used > length {
            return Err(LiuError::Malformed(format!(
                "TS: 自适应字段内容超出声明长度, used={}, length={}",
                used, length
            )));
        }
        af.stuffing = length - used;
        br.skip_bytes(af.stuffing)?;
        Ok(af)
    }
}

fn decode_extension(br: &mut BitReader) -> LiuResult<AdaptationExtension> {
    let mut ext = AdaptationExtension {
        length: br.read_bits(8)? as u8,
        ..AdaptationExtension::default()
    };
    let start = br.bits_read();
    let ltw_flag = br.read_flag()?;
    let piecewise_rate_flag = br.read_flag()?;
    let seamless_splice_flag = br.read_flag()?;
    br.skip_bits(5)?;
    if ltw_flag {
        let valid = br.read_flag()?;
        ext.ltw = Some((valid, br.read_bits(15)? as u16));
    }
    if piecewise_rate_flag {
        br.skip_bits(2)?;
        ext.piecewise_rate = Some(br.read_bits(22)?);
    }
    if seamless_splice_flag {
        let splice_type = br.read_bits(4)? as u8;
        let high = u64::from(br.read_bits(3)?);
        br.skip_bits(1)?;
        let mid = u64::from(br.read_bits(15)?);
        br.skip_bits(1)?;
        let low = u64::from(br.read_bits(15)?);
        br.skip_bits(1)?;
        ext.seamless_splice = Some((splice_type, (high << 30) | (mid << 15) | low));
    }
    let used = (br.bits_read() - start) / 8;
    let declared = usize::from(ext.length);
    if used > declared {
        return Err(LiuError::Malformed(format!(
            "TS: 自适应字段扩展超出声明长度, used={}, length={}",
            used, declared
        )));
    }
    br.skip_bytes(declared - used)?;
    Ok(ext)
}

fn read_clock_reference(br: &mut BitReader) -> LiuResult<(u64, u16)> {
    let base = br.read_bits_u64(33)?;
    br.skip_bits(6)?;
    let extension = br.read_bits(9)? as u16;
    Ok((base, extension))
}

fn write_clock_reference(bw: &mut BitWriter, base: u64, extension: u16) {
    bw.write_bits_u64(base, 33);
    bw.write_bits(0x3F, 6);
    bw.write_bits(u32::from(extension), 9);
}

/// 解析后的 TS 包, 负载借用原始数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsPacket<'a> {
    /// 包头
    pub header: TsHeader,
    /// 自适应字段
    pub adaptation: Option<AdaptationField>,
    /// 负载
    pub payload: &'a [u8],
}

impl<'a> TsPacket<'a> {
    /// 解析一个 188 字节 TS 包
    pub fn parse(data: &'a [u8]) -> LiuResult<Self> {
        LiuError::check_len("TS 包", data, TS_PACKET_SIZE)?;
        let cell = &data[..TS_PACKET_SIZE];
        let mut br = BitReader::new(cell);
        let header = TsHeader::decode(&mut br)?;
        let adaptation = if header.has_adaptation() {
            Some(AdaptationField::decode(&mut br)?)
        } else {
            None
        };
        let payload = if header.has_payload() {
            br.remaining_data()
        } else {
            &[]
        };
        Ok(Self {
            header,
            adaptation,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let header = TsHeader {
            payload_unit_start: true,
            pid: 0x1FFE,
            adaptation_field_control: AFC_ADAPTATION_PAYLOAD,
            continuity_counter: 0xF,
            ..TsHeader::default()
        };
        let mut bw = BitWriter::new();
        header.encode(&mut bw);
        let bytes = bw.finish();
        assert_eq!(bytes, vec![0x47, 0x5F, 0xFE, 0x3F]);
        assert_eq!(TsHeader::decode(&mut BitReader::new(&bytes)).unwrap(), header);
    }

    #[test]
    fn test_header_bad_sync() {
        assert!(matches!(
            TsHeader::decode(&mut BitReader::new(&[0x48, 0, 0, 0x10])),
            Err(LiuError::Malformed(_))
        ));
    }

    #[test]
    fn test_adaptation_pcr_and_stuffing() {
        let mut af = AdaptationField {
            flags: AdaptationFlags::RANDOM_ACCESS,
            stuffing: 3,
            ..AdaptationField::default()
        };
        af.set_pcr(0x1_2345_6789, 299);
        assert_eq!(af.encoded_len(), 2 + 6 + 3);

        let mut bw = BitWriter::new();
        af.encode(&mut bw).unwrap();
        let bytes = bw.finish();
        assert_eq!(bytes.len(), af.encoded_len());
        assert_eq!(bytes[0], 10);
        assert_eq!(bytes[1], 0x50);

        let decoded = AdaptationField::decode(&mut BitReader::new(&bytes)).unwrap();
        assert_eq!(decoded.pcr_base, 0x1_2345_6789);
        assert_eq!(decoded.pcr_extension, 299);
        assert_eq!(decoded.stuffing, 3);
        assert!(decoded.is_random_access());
    }

    #[test]
    fn test_single_stuffing_byte() {
        let af = AdaptationField::stuffing(1);
        let mut bw = BitWriter::new();
        af.encode(&mut bw).unwrap();
        assert_eq!(bw.finish(), vec![0x00]);

        let two = AdaptationField::stuffing(2);
        let mut bw = BitWriter::new();
        two.encode(&mut bw).unwrap();
        assert_eq!(bw.finish(), vec![0x01, 0x00]);

        let decoded = AdaptationField::decode(&mut BitReader::new(&[0x00])).unwrap();
        assert!(decoded.single_stuffing_byte);
    }

    #[test]
    fn test_adaptation_private_data_and_extension() {
        // flags: splice + private + extension
        let data = [
            12,   // length
            0x07, // flags
            0xFE, // splice_countdown = -2
            2, 0xAA, 0xBB, // private data
            3,    // extension length
            0xC0, // ltw + piecewise
            0x80, 0x10, // ltw_valid=1, offset=0x10
            0xC0, 0x00, 0x64, // piecewise_rate=100
        ];
        // 扩展声明 3 字节但实际占用 1+2+3, 应报错
        assert!(matches!(
            AdaptationField::decode(&mut BitReader::new(&data)),
            Err(LiuError::Malformed(_))
        ));

        let data = [
            12,   // length
            0x07, // flags
            0xFE, // splice_countdown
            2, 0xAA, 0xBB, // private data
            6,    // extension length
            0xC0, // ltw + piecewise
            0x80, 0x10, // ltw
            0xC0, 0x00, 0x64, // piecewise_rate
        ];
        let af = AdaptationField::decode(&mut BitReader::new(&data)).unwrap();
        assert_eq!(af.splice_countdown, -2);
        assert_eq!(af.private_data_length, 2);
        let ext = af.extension.unwrap();
        assert_eq!(ext.ltw, Some((true, 0x10)));
        assert_eq!(ext.piecewise_rate, Some(100));
        assert_eq!(ext.seamless_splice, None);
        assert_eq!(af.stuffing, 0);
    }

    #[test]
    fn test_adaptation_length_exceeds_packet() {
        assert!(matches!(
            AdaptationField::decode(&mut BitReader::new(&[5, 0x00, 0xFF])),
            Err(LiuError::Malformed(_))
        ));
    }

    #[test]
    fn test_ts_packet_parse() {
        let mut cell = vec![0x47, 0x41, 0x00, 0x30, 0x02, 0x40, 0xFF];
        cell.resize(TS_PACKET_SIZE, 0xAB);
        let pkt = TsPacket::parse(&cell).unwrap();
        assert_eq!(pkt.header.pid, 0x100);
        assert!(pkt.header.payload_unit_start);
        assert!(pkt.adaptation.as_ref().unwrap().is_random_access());
        assert_eq!(pkt.payload.len(), TS_PACKET_SIZE - 7);

        assert!(matches!(
            TsPacket::parse(&cell[..100]),
            Err(LiuError::TooShort { .. })
        ));
    }
}
