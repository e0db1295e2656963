//! AAC ADTS 帧头与 AudioSpecificConfig.
//!
//! # ADTS 帧结构 (7 或 9 字节头部)
//! ```text
//! 固定头部 (28 bits):
//!   sync word (12 bits = 0xFFF)
//!   ID (1 bit): 0=MPEG-4, 1=MPEG-2
//!   layer (2 bits)
//!   protection_absent (1 bit): 1=无 CRC, 0=有 CRC
//!   profile (2 bits): 0=Main, 1=LC, 2=SSR, 3=LTP
//!   sampling_frequency_index (4 bits)
//!   private_bit (1 bit)
//!   channel_configuration (3 bits)
//!   original_copy (1 bit) home (1 bit)
//! 可变头部 (28 bits):
//!   copyright_identification_bit (1 bit)
//!   copyright_identification_start (1 bit)
//!   frame_length (13 bits): 含头部的完整帧大小
//!   adts_buffer_fullness (11 bits)
//!   number_of_raw_data_blocks_in_frame (2 bits)
//! [CRC (16 bits)] 仅当 protection_absent=0
//! ```
//!
//! AudioSpecificConfig 只处理最常见的 2 字节形式:
//! `audioObjectType(5) samplingFrequencyIndex(4) channelConfiguration(4)
//!  frameLengthFlag(1) dependsOnCoreCoder(1) extensionFlag(1)`.

use liu_core::bitreader::BitReader;
use liu_core::bitwriter::BitWriter;
use liu_core::{LiuError, LiuResult};

/// AAC 采样率索引表 (ISO 14496-3)
static AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// 不含 CRC 的 ADTS 头长度
pub const ADTS_HEADER_LEN: usize = 7;
/// 含 CRC 的 ADTS 头长度
pub const ADTS_HEADER_LEN_CRC: usize = 9;
/// frame_length 字段上限 (13 bits)
const MAX_FRAME_LENGTH: usize = 0x1FFF;
/// 可变码率流使用的 adts_buffer_fullness
pub const ADTS_BUFFER_FULLNESS_VBR: u16 = 0x7FF;

/// 根据采样率查找索引
pub fn sample_rate_index(sample_rate: u32) -> Option<u8> {
    AAC_SAMPLE_RATES
        .iter()
        .position(|&r| r == sample_rate)
        .map(|i| i as u8)
}

/// 根据索引查找采样率
pub fn sample_rate_from_index(index: u8) -> Option<u32> {
    AAC_SAMPLE_RATES.get(usize::from(index)).copied()
}

/// ADTS 帧头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// ID (0=MPEG-4, 1=MPEG-2)
    pub mpeg_version: u8,
    /// layer
    pub layer: u8,
    /// protection_absent
    pub protection_absent: bool,
    /// AAC Profile (0=Main, 1=LC, 2=SSR, 3=LTP)
    pub profile: u8,
    /// 采样率索引
    pub sampling_frequency_index: u8,
    /// private_bit
    pub private_bit: bool,
    /// 声道配置
    pub channel_configuration: u8,
    /// original_copy
    pub original_copy: bool,
    /// home
    pub home: bool,
    /// copyright_identification_bit
    pub copyright_id_bit: bool,
    /// copyright_identification_start
    pub copyright_id_start: bool,
    /// 帧总大小 (含头部)
    pub frame_length: u16,
    /// adts_buffer_fullness
    pub buffer_fullness: u16,
    /// number_of_raw_data_blocks_in_frame
    pub num_raw_data_blocks: u8,
    /// CRC, 仅 protection_absent=0 时存在
    pub crc: Option<u16>,
}

impl Default for AdtsHeader {
    fn default() -> Self {
        Self {
            mpeg_version: 0,
            layer: 0,
            protection_absent: true,
            profile: 1,
            sampling_frequency_index: 4,
            private_bit: false,
            channel_configuration: 2,
            original_copy: false,
            home: false,
            copyright_id_bit: false,
            copyright_id_start: false,
            frame_length: ADTS_HEADER_LEN as u16,
            buffer_fullness: ADTS_BUFFER_FULLNESS_VBR,
            num_raw_data_blocks: 0,
            crc: None,
        }
    }
}

impl AdtsHeader {
    /// 头部长度 (7 或 9 字节)
    pub fn header_size(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_LEN
        } else {
            ADTS_HEADER_LEN_CRC
        }
    }

    /// 负载长度 (frame_length 减去头部)
    pub fn payload_size(&self) -> usize {
        usize::from(self.frame_length).saturating_sub(self.header_size())
    }

    /// 采样率 (Hz), 索引非法时为 None
    pub fn sample_rate(&self) -> Option<u32> {
        sample_rate_from_index(self.sampling_frequency_index)
    }

    /// 解析 ADTS 帧头部
    pub fn decode(data: &[u8]) -> LiuResult<Self> {
        LiuError::check_len("ADTS", data, ADTS_HEADER_LEN)?;
        if data[0] != 0xFF || (data[1] & 0xF0) != 0xF0 {
            return Err(LiuError::Malformed(format!(
                "AAC: ADTS 同步字错误, bytes={:02X} {:02X}",
                data[0], data[1]
            )));
        }

        let mut br = BitReader::new(data);
        br.skip_bits(12)?;
        let mut header = Self {
            mpeg_version: br.read_bits(1)? as u8,
            layer: br.read_bits(2)? as u8,
            protection_absent: br.read_flag()?,
            profile: br.read_bits(2)? as u8,
            sampling_frequency_index: br.read_bits(4)? as u8,
            private_bit: br.read_flag()?,
            channel_configuration: br.read_bits(3)? as u8,
            original_copy: br.read_flag()?,
            home: br.read_flag()?,
            copyright_id_bit: br.read_flag()?,
            copyright_id_start: br.read_flag()?,
            frame_length: br.read_bits(13)? as u16,
            buffer_fullness: br.read_bits(11)? as u16,
            num_raw_data_blocks: br.read_bits(2)? as u8,
            crc: None,
        };
        if !header.protection_absent {
            LiuError::check_len("ADTS (CRC)", data, ADTS_HEADER_LEN_CRC)?;
            header.crc = Some(br.read_bits(16)? as u16);
        }
        Ok(header)
    }

    /// 编码 ADTS 帧头部 (7 或 9 字节)
    ///
    /// protection_absent=0 且未给出 CRC 时写入 0.
    pub fn encode(&self) -> Vec<u8> {
        let mut bw = BitWriter::with_capacity(self.header_size());
        bw.write_bits(0xFFF, 12);
        bw.write_bits(u32::from(self.mpeg_version), 1);
        bw.write_bits(u32::from(self.layer), 2);
        bw.write_flag(self.protection_absent);
        bw.write_bits(u32::from(self.profile), 2);
        bw.write_bits(u32::from(self.sampling_frequency_index), 4);
        bw.write_flag(self.private_bit);
        bw.write_bits(u32::from(self.channel_configuration), 3);
        bw.write_flag(self.original_copy);
        bw.write_flag(self.home);
        bw.write_flag(self.copyright_id_bit);
        bw.write_flag(self.copyright_id_start);
        bw.write_bits(u32::from(self.frame_length), 13);
        bw.write_bits(u32::from(self.buffer_fullness), 11);
        bw.write_bits(u32::from(self.num_raw_data_blocks), 2);
        if !self.protection_absent {
            bw.write_bits(u32::from(self.crc.unwrap_or(0)), 16);
        }
        bw.finish()
    }
}

/// AudioSpecificConfig (2 字节形式)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// audioObjectType (2=AAC-LC)
    pub audio_object_type: u8,
    /// samplingFrequencyIndex
    pub sampling_frequency_index: u8,
    /// channelConfiguration
    pub channel_configuration: u8,
    /// GASpecificConfig.frameLengthFlag
    pub frame_length_flag: bool,
    /// GASpecificConfig.dependsOnCoreCoder
    pub depends_on_core_coder: bool,
    /// GASpecificConfig.extensionFlag
    pub extension_flag: bool,
}

impl AudioSpecificConfig {
    /// 解析 AudioSpecificConfig
    pub fn decode(data: &[u8]) -> LiuResult<Self> {
        LiuError::check_len("AudioSpecificConfig", data, 2)?;
        let mut br = BitReader::new(data);
        Ok(Self {
            audio_object_type: br.read_bits(5)? as u8,
            sampling_frequency_index: br.read_bits(4)? as u8,
            channel_configuration: br.read_bits(4)? as u8,
            frame_length_flag: br.read_flag()?,
            depends_on_core_coder: br.read_flag()?,
            extension_flag: br.read_flag()?,
        })
    }

    /// 编码为 2 字节
    pub fn encode(&self) -> [u8; 2] {
        let mut bw = BitWriter::with_capacity(2);
        bw.write_bits(u32::from(self.audio_object_type), 5);
        bw.write_bits(u32::from(self.sampling_frequency_index), 4);
        bw.write_bits(u32::from(self.channel_configuration), 4);
        bw.write_flag(self.frame_length_flag);
        bw.write_flag(self.depends_on_core_coder);
        bw.write_flag(self.extension_flag);
        let data = bw.finish();
        [data[0], data[1]]
    }

    /// 采样率 (Hz), 索引非法时为 None
    pub fn sample_rate(&self) -> Option<u32> {
        sample_rate_from_index(self.sampling_frequency_index)
    }
}

/// 从 ADTS 帧头生成 AudioSpecificConfig
///
/// audioObjectType = profile + 1.
pub fn adts_to_asc(frame: &[u8]) -> LiuResult<[u8; 2]> {
    let adts = AdtsHeader::decode(frame)?;
    let asc = AudioSpecificConfig {
        audio_object_type: adts.profile + 1,
        sampling_frequency_index: adts.sampling_frequency_index,
        channel_configuration: adts.channel_configuration,
        ..AudioSpecificConfig::default()
    };
    Ok(asc.encode())
}

/// 根据 AudioSpecificConfig 生成 7 字节 ADTS 头
///
/// `payload_len` 为裸 AAC 帧长度, frame_length = payload_len + 7.
pub fn asc_to_adts(asc: &[u8], payload_len: usize) -> LiuResult<Vec<u8>> {
    let config = AudioSpecificConfig::decode(asc)?;
    if !(1..=4).contains(&config.audio_object_type) {
        return Err(LiuError::Unsupported(format!(
            "AAC: ADTS 无法表示 audioObjectType={}",
            config.audio_object_type
        )));
    }
    let frame_length = payload_len + ADTS_HEADER_LEN;
    if frame_length > MAX_FRAME_LENGTH {
        return Err(LiuError::InvalidArgument(format!(
            "AAC: 帧长度超出 ADTS 限制, frame_length={}",
            frame_length
        )));
    }

    let header = AdtsHeader {
        profile: config.audio_object_type - 1,
        sampling_frequency_index: config.sampling_frequency_index,
        channel_configuration: config.channel_configuration & 0x07,
        frame_length: frame_length as u16,
        buffer_fullness: ADTS_BUFFER_FULLNESS_VBR,
        ..AdtsHeader::default()
    };
    Ok(header.encode())
}

/// 按 frame_length 切分连续的 ADTS 帧 (每帧含头部)
///
/// 同步字错误或 frame_length 小于头部时返回 `Malformed`,
/// 最后一帧不完整时返回 `NeedMore`.
pub fn split_adts_frames(data: &[u8]) -> LiuResult<Vec<&[u8]>> {
    let mut frames = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let rest = &data[pos..];
        if rest.len() < ADTS_HEADER_LEN {
            return Err(LiuError::NeedMore);
        }
        let header = AdtsHeader::decode(rest).map_err(|e| match e {
            LiuError::TooShort { .. } => LiuError::NeedMore,
            other => other,
        })?;
        let len = usize::from(header.frame_length);
        if len < header.header_size() {
            return Err(LiuError::Malformed(format!(
                "AAC: ADTS frame_length 小于头部长度, frame_length={}, offset={}",
                len, pos
            )));
        }
        if len > rest.len() {
            return Err(LiuError::NeedMore);
        }
        frames.push(&rest[..len]);
        pos += len;
    }
    Ok(frames)
}
