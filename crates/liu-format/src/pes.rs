//! PES (Packetized Elementary Stream) 编解码.
//!
//! # PES 包头 (MPEG-2)
//! ```text
//! packet_start_code_prefix   24  00 00 01
//! stream_id                   8
//! PES_packet_length          16  0 表示不限长度
//! '10'                        2
//! scrambling(2) priority(1) data_alignment(1) copyright(1) original(1)
//! PTS_DTS_flags(2) ESCR(1) ES_rate(1) trick_mode(1) copy_info(1) CRC(1) extension(1)
//! PES_header_data_length      8
//! [可选字段] [填充 0xFF]
//! [负载]
//! ```
//!
//! 时间戳字段为 5 字节: 4 位前缀, 3 位, marker, 15 位, marker, 15 位, marker.

use liu_codec::parsers::h264::H264_AUD_NAL;
use liu_codec::parsers::h265::H265_AUD_NAL;
use liu_core::{BitReader, BitWriter, LiuError, LiuResult};

/// MPEG 程序结束码
pub const PES_STREAM_END: u8 = 0xB9;
/// PS 包头
pub const PES_STREAM_PACK: u8 = 0xBA;
/// PS 系统头
pub const PES_STREAM_SYSTEM_HEADER: u8 = 0xBB;
/// 节目流映射 (PSM)
pub const PES_STREAM_MAP: u8 = 0xBC;
/// 私有流 1
pub const PES_STREAM_PRIVATE: u8 = 0xBD;
/// 第一个音频流
pub const PES_STREAM_AUDIO: u8 = 0xC0;
/// 第一个视频流
pub const PES_STREAM_VIDEO: u8 = 0xE0;

/// 可复用的 AUD 常量, 封装器在缺少 AUD 的访问单元前插入
pub const AUD_H264: &[u8] = &H264_AUD_NAL;
/// H.265 AUD (含起始码)
pub const AUD_H265: &[u8] = &H265_AUD_NAL;

/// PES 包头固定部分长度 (起始码到 PES_header_data_length)
pub const PES_FIXED_HEADER_LEN: usize = 9;

/// PTS_DTS_flags: 仅 PTS
pub const PTS_ONLY: u8 = 0b10;
/// PTS_DTS_flags: PTS + DTS
pub const PTS_AND_DTS: u8 = 0b11;

/// PES 包
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PesPacket {
    /// stream_id
    pub stream_id: u8,
    /// PES_packet_length, 0 表示不限长度
    pub packet_length: u16,
    /// PES_scrambling_control
    pub scrambling_control: u8,
    /// PES_priority
    pub priority: bool,
    /// data_alignment_indicator
    pub data_alignment: bool,
    /// copyright
    pub copyright: bool,
    /// original_or_copy
    pub original_or_copy: bool,
    /// PTS_DTS_flags
    pub pts_dts_flags: u8,
    /// ESCR_flag
    pub escr_flag: bool,
    /// ES_rate_flag
    pub es_rate_flag: bool,
    /// DSM_trick_mode_flag
    pub trick_mode_flag: bool,
    /// additional_copy_info_flag
    pub additional_copy_info_flag: bool,
    /// PES_CRC_flag
    pub crc_flag: bool,
    /// PES_extension_flag (扩展字段不解析, 随头部剩余字节跳过)
    pub extension_flag: bool,
    /// PES_header_data_length
    pub header_data_length: u8,
    /// PTS (90kHz)
    pub pts: u64,
    /// DTS (90kHz), 缺省时等于 PTS
    pub dts: u64,
    /// ESCR base (27MHz / 300)
    pub escr_base: u64,
    /// ESCR extension
    pub escr_extension: u16,
    /// ES_rate (50 字节/秒 单位)
    pub es_rate: u32,
    /// trick_mode_control
    pub trick_mode_control: u8,
    /// trick mode 其余 5 位
    pub trick_value: u8,
    /// additional_copy_info
    pub additional_copy_info: u8,
    /// previous_PES_packet_CRC
    pub previous_crc: u16,
    /// 负载
    pub payload: Vec<u8>,
}

impl PesPacket {
    /// 创建指定 stream_id 的空 PES 包
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            ..Self::default()
        }
    }

    /// 设置时间戳 (90kHz), `dts` 为 `None` 时只写 PTS
    pub fn set_timestamps(&mut self, pts: u64, dts: Option<u64>) {
        self.pts = pts;
        match dts {
            Some(dts) => {
                self.dts = dts;
                self.pts_dts_flags = PTS_AND_DTS;
            }
            None => {
                self.dts = pts;
                self.pts_dts_flags = PTS_ONLY;
            }
        }
    }

    /// 可选字段编码后的字节数
    pub fn optional_fields_len(&self) -> usize {
        let mut len = match self.pts_dts_flags {
            PTS_AND_DTS => 10,
            PTS_ONLY => 5,
            _ => 0,
        };
        if self.escr_flag {
            len += 6;
        }
        if self.es_rate_flag {
            len += 3;
        }
        if self.trick_mode_flag {
            len += 1;
        }
        if self.additional_copy_info_flag {
            len += 1;
        }
        if self.crc_flag {
            len += 2;
        }
        len
    }

    /// 根据可选字段与负载计算 header_data_length 与 packet_length
    ///
    /// 总长度超过 0xFFFF 时 packet_length 置 0.
    pub fn finalize_lengths(&mut self) {
        self.header_data_length = self.optional_fields_len() as u8;
        let len = 3 + usize::from(self.header_data_length) + self.payload.len();
        self.packet_length = u16::try_from(len).unwrap_or(0);
    }

    /// 编码 PES 包
    ///
    /// `header_data_length` 大于可选字段长度时, 差值以 0xFF 填充.
    pub fn encode(&self, bw: &mut BitWriter) -> LiuResult<()> {
        let optional_len = self.optional_fields_len();
        let header_len = usize::from(self.header_data_length).max(optional_len);
        if header_len > 0xFF {
            return Err(LiuError::InvalidArgument(format!(
                "PES: 可选字段过长, len={}",
                header_len
            )));
        }

        bw.write_bytes(&[0x00, 0x00, 0x01, self.stream_id])?;
        bw.write_bits(u32::from(self.packet_length), 16);
        bw.write_bits(0b10, 2);
        bw.write_bits(u32::from(self.scrambling_control), 2);
        bw.write_flag(self.priority);
        bw.write_flag(self.data_alignment);
        bw.write_flag(self.copyright);
        bw.write_flag(self.original_or_copy);
        bw.write_bits(u32::from(self.pts_dts_flags), 2);
        bw.write_flag(self.escr_flag);
        bw.write_flag(self.es_rate_flag);
        bw.write_flag(self.trick_mode_flag);
        bw.write_flag(self.additional_copy_info_flag);
        bw.write_flag(self.crc_flag);
        bw.write_bit(0); // PES_extension_flag
        bw.write_bits(header_len as u32, 8);

        match self.pts_dts_flags {
            PTS_ONLY => write_timestamp(bw, 0b0010, self.pts),
            PTS_AND_DTS => {
                write_timestamp(bw, 0b0011, self.pts);
                write_timestamp(bw, 0b0001, self.dts);
            }
            _ => {}
        }
        if self.escr_flag {
            bw.write_bits(0b11, 2);
            bw.write_bits_u64(self.escr_base >> 30, 3);
            bw.write_bit(1);
            bw.write_bits_u64(self.escr_base >> 15, 15);
            bw.write_bit(1);
            bw.write_bits_u64(self.escr_base, 15);
            bw.write_bit(1);
            bw.write_bits(u32::from(self.escr_extension), 9);
            bw.write_bit(1);
        }
        if self.es_rate_flag {
            bw.write_bit(1);
            bw.write_bits(self.es_rate, 22);
            bw.write_bit(1);
        }
        if self.trick_mode_flag {
            bw.write_bits(u32::from(self.trick_mode_control), 3);
            bw.write_bits(u32::from(self.trick_value), 5);
        }
        if self.additional_copy_info_flag {
            bw.write_bit(1);
            bw.write_bits(u32::from(self.additional_copy_info), 7);
        }
        if self.crc_flag {
            bw.write_bits(u32::from(self.previous_crc), 16);
        }
        bw.write_repeat(0xFF, header_len - optional_len);
        bw.write_bytes(&self.payload)
    }

    /// 编码为独立字节序列
    pub fn to_bytes(&self) -> LiuResult<Vec<u8>> {
        let mut bw = BitWriter::with_capacity(
            PES_FIXED_HEADER_LEN + usize::from(self.header_data_length) + self.payload.len() + 32,
        );
        self.encode(&mut bw)?;
        Ok(bw.finish())
    }

    /// 解码 MPEG-2 PES 包
    ///
    /// 数据不足时返回 `NeedMore`, 读游标恢复到调用前的位置.
    pub fn decode(br: &mut BitReader) -> LiuResult<Self> {
        if br.bytes_left() < PES_FIXED_HEADER_LEN {
            return Err(LiuError::NeedMore);
        }
        let start = br.bits_read();
        let result = Self::decode_mpeg2_body(br);
        if matches!(result, Err(LiuError::NeedMore)) {
            br.unread(br.bits_read() - start)?;
        }
        result
    }

    fn decode_mpeg2_body(br: &mut BitReader) -> LiuResult<Self> {
        let mut pes = Self::decode_start(br)?;
        br.skip_bits(2)?; // '10'
        pes.scrambling_control = br.read_bits(2)? as u8;
        pes.priority = br.read_flag()?;
        pes.data_alignment = br.read_flag()?;
        pes.copyright = br.read_flag()?;
        pes.original_or_copy = br.read_flag()?;
        pes.pts_dts_flags = br.read_bits(2)? as u8;
        pes.escr_flag = br.read_flag()?;
        pes.es_rate_flag = br.read_flag()?;
        pes.trick_mode_flag = br.read_flag()?;
        pes.additional_copy_info_flag = br.read_flag()?;
        pes.crc_flag = br.read_flag()?;
        pes.extension_flag = br.read_flag()?;
        pes.header_data_length = br.read_bits(8)? as u8;

        let header_len = usize::from(pes.header_data_length);
        if br.bytes_left() < header_len {
            return Err(LiuError::NeedMore);
        }

        // 可选字段只能在 header_data_length 范围内读取
        let mut hr = BitReader::new(br.read_bytes(header_len)?);
        pes.decode_optional_fields(&mut hr).map_err(|e| match e {
            LiuError::OutOfRange(_) => LiuError::Malformed(format!(
                "PES: 可选字段超出头部长度, pts_dts_flags={}, header_data_length={}",
                pes.pts_dts_flags, header_len
            )),
            e => e,
        })?;

        pes.payload = read_payload(br, pes.packet_length, 3 + header_len)?;
        Ok(pes)
    }

    /// 按标志位读取 PTS/DTS, ESCR, ES_rate, trick mode, copy info 与 CRC
    fn decode_optional_fields(&mut self, hr: &mut BitReader) -> LiuResult<()> {
        if self.pts_dts_flags & PTS_ONLY != 0 {
            self.pts = read_timestamp(hr)?;
        }
        self.dts = if self.pts_dts_flags == PTS_AND_DTS {
            read_timestamp(hr)?
        } else {
            self.pts
        };
        if self.escr_flag {
            hr.skip_bits(2)?;
            let high = u64::from(hr.read_bits(3)?);
            hr.skip_bits(1)?;
            let mid = u64::from(hr.read_bits(15)?);
            hr.skip_bits(1)?;
            let low = u64::from(hr.read_bits(15)?);
            hr.skip_bits(1)?;
            self.escr_base = (high << 30) | (mid << 15) | low;
            self.escr_extension = hr.read_bits(9)? as u16;
            hr.skip_bits(1)?;
        }
        if self.es_rate_flag {
            hr.skip_bits(1)?;
            self.es_rate = hr.read_bits(22)?;
            hr.skip_bits(1)?;
        }
        if self.trick_mode_flag {
            self.trick_mode_control = hr.read_bits(3)? as u8;
            self.trick_value = hr.read_bits(5)? as u8;
        }
        if self.additional_copy_info_flag {
            hr.skip_bits(1)?;
            self.additional_copy_info = hr.read_bits(7)? as u8;
        }
        if self.crc_flag {
            self.previous_crc = hr.read_bits(16)? as u16;
        }
        // 剩余部分为扩展字段或 0xFF 填充
        Ok(())
    }

    /// 解码 MPEG-1 PES 包 (ISO/IEC 11172-1)
    ///
    /// 头部为: 0xFF 填充, 可选 STD 缓冲区字段 (`01` 前缀, 2 字节),
    /// 然后是 `0010` (PTS), `0011` (PTS+DTS) 或 `0x0F` (无时间戳).
    pub fn decode_mpeg1(br: &mut BitReader) -> LiuResult<Self> {
        if br.bytes_left() < 6 {
            return Err(LiuError::NeedMore);
        }
        let start = br.bits_read();
        let result = Self::decode_mpeg1_body(br);
        if matches!(result, Err(LiuError::NeedMore)) {
            br.unread(br.bits_read() - start)?;
        }
        result
    }

    fn decode_mpeg1_body(br: &mut BitReader) -> LiuResult<Self> {
        let mut pes = Self::decode_start(br)?;
        if pes.packet_length != 0 && br.bytes_left() < usize::from(pes.packet_length) {
            return Err(LiuError::NeedMore);
        }

        br.mark();
        while br.peek_bits(8).is_ok_and(|b| b == 0xFF) {
            br.skip_bits(8)?;
        }
        if peek_or_need_more(br, 2)? == 0b01 {
            br.skip_bits(16)?; // STD_buffer_scale + STD_buffer_size
        }
        match peek_or_need_more(br, 4)? {
            0b0010 => {
                pes.pts = read_timestamp(br)?;
                pes.dts = pes.pts;
                pes.pts_dts_flags = PTS_ONLY;
            }
            0b0011 => {
                pes.pts = read_timestamp(br)?;
                pes.dts = read_timestamp(br)?;
                pes.pts_dts_flags = PTS_AND_DTS;
            }
            _ if peek_or_need_more(br, 8)? == 0x0F => br.skip_bits(8)?,
            other => {
                return Err(LiuError::Malformed(format!(
                    "PES: MPEG-1 头部标记非法, marker={:#x}",
                    other
                )));
            }
        }

        let used = br.distance_from_mark() / 8;
        pes.header_data_length = u8::try_from(used).unwrap_or(u8::MAX);
        if pes.packet_length != 0 && usize::from(pes.packet_length) < used {
            return Err(LiuError::Malformed(format!(
                "PES: MPEG-1 头部长度超出包长度, header={}, packet_length={}",
                used, pes.packet_length
            )));
        }
        pes.payload = read_payload(br, pes.packet_length, used)?;
        Ok(pes)
    }

    /// 读取起始码前缀, stream_id 与 PES_packet_length
    fn decode_start(br: &mut BitReader) -> LiuResult<Self> {
        let prefix = br.read_bits(24)?;
        if prefix != 0x00_0001 {
            return Err(LiuError::Malformed(format!(
                "PES: 起始码前缀错误, prefix={:#08x}",
                prefix
            )));
        }
        let mut pes = Self::new(br.read_bits(8)? as u8);
        pes.packet_length = br.read_bits(16)? as u16;
        Ok(pes)
    }
}

/// 读取 PES 负载, `consumed` 为 packet_length 中已被头部占用的字节数
fn read_payload(br: &mut BitReader, packet_length: u16, consumed: usize) -> LiuResult<Vec<u8>> {
    if packet_length == 0 {
        return Ok(br.read_bytes(br.bytes_left())?.to_vec());
    }
    let data_len = usize::from(packet_length)
        .checked_sub(consumed)
        .ok_or_else(|| {
            LiuError::Malformed(format!(
                "PES: packet_length 小于头部长度, packet_length={}, header={}",
                packet_length, consumed
            ))
        })?;
    if br.bytes_left() < data_len {
        return Err(LiuError::NeedMore);
    }
    Ok(br.read_bytes(data_len)?.to_vec())
}

fn peek_or_need_more(br: &BitReader, n: u32) -> LiuResult<u32> {
    br.peek_bits(n).map_err(|_| LiuError::NeedMore)
}

/// 读取 5 字节时间戳字段 (4 位前缀不校验)
pub fn read_timestamp(br: &mut BitReader) -> LiuResult<u64> {
    br.skip_bits(4)?;
    let high = u64::from(br.read_bits(3)?);
    br.skip_bits(1)?;
    let mid = u64::from(br.read_bits(15)?);
    br.skip_bits(1)?;
    let low = u64::from(br.read_bits(15)?);
    br.skip_bits(1)?;
    Ok((high << 30) | (mid << 15) | low)
}

/// 写入 5 字节时间戳字段, 超出 33 位的部分被截断
pub fn write_timestamp(bw: &mut BitWriter, prefix: u8, ts: u64) {
    bw.write_bits(u32::from(prefix), 4);
    bw.write_bits_u64(ts >> 30, 3);
    bw.write_bit(1);
    bw.write_bits_u64(ts >> 15, 15);
    bw.write_bit(1);
    bw.write_bits_u64(ts, 15);
    bw.write_bit(1);
}
