//! Opus 包结构 (RFC 6716 §3) 与 OpusHead (RFC 7845 §5.1).
//!
//! TOC 字节:
//! ```text
//!  0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+
//! | config  |s| c |
//! +-+-+-+-+-+-+-+-+
//! ```
//! - config 0..=11: SILK, 12..=15: Hybrid, 16..=31: CELT
//! - c: 0=1 帧, 1=2 帧等长, 2=2 帧不等长, 3=任意帧数
//!
//! 帧长编码: 0..=251 为单字节长度, 252..=255 需要第二字节,
//! 长度 = second * 4 + first.

use byteorder::{ByteOrder, LittleEndian};
use liu_core::{LiuError, LiuResult};

/// 单个包最多帧数 (120ms / 2.5ms)
const MAX_FRAMES: usize = 48;
/// OpusHead 固定部分长度
pub const OPUS_HEAD_LEN: usize = 19;
/// OpusHead 魔数
pub const OPUS_HEAD_MAGIC: &[u8; 8] = b"OpusHead";

/// 48kHz 下每帧采样数
static SILK_FRAME_SAMPLES: [u32; 4] = [480, 960, 1920, 2880];
static HYBRID_FRAME_SAMPLES: [u32; 2] = [480, 960];
static CELT_FRAME_SAMPLES: [u32; 4] = [120, 240, 480, 960];

/// Vorbis 声道顺序 (映射族 1), 按声道数索引
static VORBIS_CHANNEL_ORDER: [&[u8]; 8] = [
    &[0],
    &[0, 1],
    &[0, 2, 1],
    &[0, 1, 2, 3],
    &[0, 2, 1, 3, 4],
    &[0, 2, 1, 5, 3, 4],
    &[0, 2, 1, 6, 5, 3, 4],
    &[0, 2, 1, 7, 5, 6, 3, 4],
];

/// Opus 编码模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpusMode {
    /// SILK-only
    Silk,
    /// SILK + CELT
    Hybrid,
    /// CELT-only
    Celt,
}

/// TOC 字节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusToc {
    /// configuration number (0..=31)
    pub config: u8,
    /// 是否立体声
    pub stereo: bool,
    /// 帧数编码 (0..=3)
    pub code: u8,
}

impl OpusToc {
    /// 解析 TOC 字节
    pub fn parse(byte: u8) -> Self {
        Self {
            config: byte >> 3,
            stereo: byte & 0x04 != 0,
            code: byte & 0x03,
        }
    }

    /// 编码为 TOC 字节
    pub fn to_byte(&self) -> u8 {
        (self.config << 3) | (u8::from(self.stereo) << 2) | (self.code & 0x03)
    }

    /// 编码模式
    pub fn mode(&self) -> OpusMode {
        match self.config {
            0..=11 => OpusMode::Silk,
            12..=15 => OpusMode::Hybrid,
            _ => OpusMode::Celt,
        }
    }

    /// 每帧采样数 (48kHz)
    pub fn frame_samples(&self) -> u32 {
        let config = usize::from(self.config);
        match self.mode() {
            OpusMode::Silk => SILK_FRAME_SAMPLES[config % 4],
            OpusMode::Hybrid => HYBRID_FRAME_SAMPLES[config % 2],
            OpusMode::Celt => CELT_FRAME_SAMPLES[config % 4],
        }
    }
}

/// 解析后的 Opus 包, 帧数据借用原始缓冲区
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusPacket<'a> {
    /// TOC
    pub toc: OpusToc,
    /// code 3 的 VBR 标志
    pub vbr: bool,
    /// 尾部填充字节数
    pub padding: usize,
    /// 各帧数据
    pub frames: Vec<&'a [u8]>,
}

impl<'a> OpusPacket<'a> {
    /// 解析 Opus 包
    pub fn parse(data: &'a [u8]) -> LiuResult<Self> {
        LiuError::check_len("Opus 包", data, 1)?;
        let toc = OpusToc::parse(data[0]);
        let body = &data[1..];

        let mut packet = Self {
            toc,
            vbr: false,
            padding: 0,
            frames: Vec::new(),
        };

        match toc.code {
            0 => packet.frames.push(body),
            1 => {
                if body.len() % 2 != 0 {
                    return Err(LiuError::Malformed(format!(
                        "Opus: code 1 包负载长度必须为偶数, len={}",
                        body.len()
                    )));
                }
                let (first, second) = body.split_at(body.len() / 2);
                packet.frames.push(first);
                packet.frames.push(second);
            }
            2 => {
                let (n1, used) = read_frame_length(body)?;
                let rest = &body[used..];
                if n1 > rest.len() {
                    return Err(LiuError::Malformed(format!(
                        "Opus: code 2 首帧长度超出包长度, n1={}, remain={}",
                        n1,
                        rest.len()
                    )));
                }
                let (first, second) = rest.split_at(n1);
                packet.frames.push(first);
                packet.frames.push(second);
            }
            _ => packet.parse_code3(body)?,
        }

        Ok(packet)
    }

    fn parse_code3(&mut self, body: &'a [u8]) -> LiuResult<()> {
        let Some(&count_byte) = body.first() else {
            return Err(LiuError::Malformed("Opus: code 3 缺少帧数字节".into()));
        };
        self.vbr = count_byte & 0x80 != 0;
        let has_padding = count_byte & 0x40 != 0;
        let frame_count = usize::from(count_byte & 0x3F);
        if frame_count == 0 || frame_count > MAX_FRAMES {
            return Err(LiuError::Malformed(format!(
                "Opus: code 3 帧数非法, count={}",
                frame_count
            )));
        }

        let mut pos = 1;
        if has_padding {
            loop {
                let Some(&b) = body.get(pos) else {
                    return Err(LiuError::Malformed("Opus: 填充长度字段截断".into()));
                };
                pos += 1;
                if b == 0xFF {
                    self.padding += 254;
                } else {
                    self.padding += usize::from(b);
                    break;
                }
            }
        }

        let mut lengths = Vec::with_capacity(frame_count);
        if self.vbr {
            for _ in 0..frame_count - 1 {
                let (len, used) = read_frame_length(&body[pos.min(body.len())..])?;
                pos += used;
                lengths.push(len);
            }
        }

        let available = body
            .len()
            .checked_sub(pos + self.padding)
            .ok_or_else(|| {
                LiuError::Malformed(format!(
                    "Opus: 填充长度超出包长度, padding={}, len={}",
                    self.padding,
                    body.len()
                ))
            })?;

        if self.vbr {
            let sum: usize = lengths.iter().sum();
            let last = available.checked_sub(sum).ok_or_else(|| {
                LiuError::Malformed(format!(
                    "Opus: VBR 帧长度之和超出包长度, sum={}, available={}",
                    sum, available
                ))
            })?;
            lengths.push(last);
        } else {
            if available % frame_count != 0 {
                return Err(LiuError::Malformed(format!(
                    "Opus: CBR 负载无法平均分配, len={}, count={}",
                    available, frame_count
                )));
            }
            lengths.resize(frame_count, available / frame_count);
        }

        for len in lengths {
            self.frames.push(&body[pos..pos + len]);
            pos += len;
        }
        Ok(())
    }

    /// 帧数
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// 包时长 (48kHz 采样数)
    pub fn duration_samples(&self) -> u32 {
        self.toc.frame_samples() * self.frames.len() as u32
    }
}

/// 读取 1~2 字节的帧长度, 返回 (长度, 占用字节数)
fn read_frame_length(data: &[u8]) -> LiuResult<(usize, usize)> {
    let Some(&first) = data.first() else {
        return Err(LiuError::Malformed("Opus: 帧长度字段截断".into()));
    };
    if first < 252 {
        return Ok((usize::from(first), 1));
    }
    let Some(&second) = data.get(1) else {
        return Err(LiuError::Malformed("Opus: 帧长度第二字节缺失".into()));
    };
    Ok((usize::from(second) * 4 + usize::from(first), 2))
}

/// 输出声道到解码流的映射
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpusChannelMap {
    /// 静音声道
    Silence,
    /// 取自第 `stream` 个流的第 `channel` 个声道
    Stream { stream: u8, channel: u8 },
}

/// OpusHead 识别头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusHead {
    /// 版本 (1)
    pub version: u8,
    /// 输出声道数
    pub channel_count: u8,
    /// pre-skip (48kHz 采样数)
    pub pre_skip: u16,
    /// 原始输入采样率
    pub input_sample_rate: u32,
    /// 输出增益 (Q7.8 dB)
    pub output_gain: i16,
    /// 声道映射族 (0, 1, 255)
    pub mapping_family: u8,
    /// 流数
    pub stream_count: u8,
    /// 双声道流数
    pub coupled_count: u8,
    /// 声道映射表, 映射族 0 时为空
    pub channel_mapping: Vec<u8>,
}

impl Default for OpusHead {
    fn default() -> Self {
        Self {
            version: 1,
            channel_count: 2,
            pre_skip: 0,
            input_sample_rate: 48000,
            output_gain: 0,
            mapping_family: 0,
            stream_count: 1,
            coupled_count: 1,
            channel_mapping: Vec::new(),
        }
    }
}

impl OpusHead {
    /// 解析 OpusHead
    pub fn parse(data: &[u8]) -> LiuResult<Self> {
        LiuError::check_len("OpusHead", data, OPUS_HEAD_LEN)?;
        if &data[..8] != OPUS_HEAD_MAGIC {
            return Err(LiuError::Malformed("Opus: OpusHead 魔数错误".into()));
        }

        let mut head = Self {
            version: data[8],
            channel_count: data[9],
            pre_skip: LittleEndian::read_u16(&data[10..]),
            input_sample_rate: LittleEndian::read_u32(&data[12..]),
            output_gain: LittleEndian::read_i16(&data[16..]),
            mapping_family: data[18],
            ..Self::default()
        };
        if head.channel_count == 0 {
            return Err(LiuError::Malformed("Opus: OpusHead 声道数为 0".into()));
        }

        match head.mapping_family {
            0 => {
                if head.channel_count > 2 {
                    return Err(LiuError::Malformed(format!(
                        "Opus: 映射族 0 最多 2 声道, channels={}",
                        head.channel_count
                    )));
                }
                head.stream_count = 1;
                head.coupled_count = head.channel_count - 1;
            }
            1 | 255 => {
                let channels = usize::from(head.channel_count);
                LiuError::check_len("OpusHead 映射表", data, OPUS_HEAD_LEN + 2 + channels)?;
                head.stream_count = data[19];
                head.coupled_count = data[20];
                if head.stream_count == 0 || head.coupled_count > head.stream_count {
                    return Err(LiuError::Malformed(format!(
                        "Opus: 流数非法, streams={}, coupled={}",
                        head.stream_count, head.coupled_count
                    )));
                }
                head.channel_mapping = data[21..21 + channels].to_vec();
                let limit = u16::from(head.stream_count) + u16::from(head.coupled_count);
                if let Some(&bad) = head
                    .channel_mapping
                    .iter()
                    .find(|&&idx| idx != 255 && u16::from(idx) >= limit)
                {
                    return Err(LiuError::Malformed(format!(
                        "Opus: 声道映射索引超出范围, index={}, limit={}",
                        bad, limit
                    )));
                }
                if head.mapping_family == 1 && channels > VORBIS_CHANNEL_ORDER.len() {
                    return Err(LiuError::Malformed(format!(
                        "Opus: 映射族 1 最多 8 声道, channels={}",
                        channels
                    )));
                }
            }
            other => {
                return Err(LiuError::Unsupported(format!(
                    "Opus: 不支持的声道映射族, family={}",
                    other
                )));
            }
        }
        Ok(head)
    }

    /// 编码为 OpusHead 字节
    pub fn write(&self) -> Vec<u8> {
        let mut out = vec![0u8; OPUS_HEAD_LEN];
        out[..8].copy_from_slice(OPUS_HEAD_MAGIC);
        out[8] = self.version;
        out[9] = self.channel_count;
        LittleEndian::write_u16(&mut out[10..], self.pre_skip);
        LittleEndian::write_u32(&mut out[12..], self.input_sample_rate);
        LittleEndian::write_i16(&mut out[16..], self.output_gain);
        out[18] = self.mapping_family;
        if self.mapping_family != 0 {
            out.push(self.stream_count);
            out.push(self.coupled_count);
            out.extend_from_slice(&self.channel_mapping);
        }
        out
    }

    /// 输出声道映射, 映射族 1 按 Vorbis 声道顺序排列
    pub fn channel_maps(&self) -> Vec<OpusChannelMap> {
        let channels = usize::from(self.channel_count);
        let table: Vec<u8> = if self.mapping_family == 0 {
            (0..self.channel_count).collect()
        } else {
            self.channel_mapping.clone()
        };
        let coupled = self.coupled_count;

        (0..channels)
            .map(|i| {
                let pos = if self.mapping_family == 1 {
                    VORBIS_CHANNEL_ORDER
                        .get(channels - 1)
                        .and_then(|order| order.get(i))
                        .map_or(i, |&p| usize::from(p))
                } else {
                    i
                };
                match table.get(pos).copied() {
                    None | Some(255) => OpusChannelMap::Silence,
                    Some(idx) if idx < 2 * coupled => OpusChannelMap::Stream {
                        stream: idx / 2,
                        channel: idx & 1,
                    },
                    Some(idx) => OpusChannelMap::Stream {
                        stream: idx - coupled,
                        channel: 0,
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toc_parse() {
        // config=31 (CELT FB 20ms), stereo, code 3
        let toc = OpusToc::parse(0xFF);
        assert_eq!(toc.config, 31);
        assert!(toc.stereo);
        assert_eq!(toc.code, 3);
        assert_eq!(toc.mode(), OpusMode::Celt);
        assert_eq!(toc.frame_samples(), 960);
        assert_eq!(toc.to_byte(), 0xFF);

        assert_eq!(OpusToc::parse(1 << 3).frame_samples(), 960); // SILK NB 20ms
        assert_eq!(OpusToc::parse(13 << 3).frame_samples(), 960); // Hybrid 20ms
        assert_eq!(OpusToc::parse(17 << 3).frame_samples(), 240); // CELT 5ms
    }

    #[test]
    fn test_code0_and_code1() {
        let data = [0x78, 1, 2, 3];
        let pkt = OpusPacket::parse(&data).unwrap();
        assert_eq!(pkt.frames, vec![&[1u8, 2, 3][..]]);
        assert_eq!(pkt.duration_samples(), 960);

        let data = [0x79, 1, 2, 3, 4];
        let pkt = OpusPacket::parse(&data).unwrap();
        assert_eq!(pkt.frames, vec![&[1u8, 2][..], &[3u8, 4][..]]);
        assert_eq!(pkt.duration_samples(), 1920);

        assert!(OpusPacket::parse(&[0x79, 1, 2, 3]).is_err());
        assert!(OpusPacket::parse(&[]).is_err());
    }

    #[test]
    fn test_code2_two_byte_length() {
        // N1 = 252 + 4*1 = 256
        let mut data = vec![0x7A, 252, 1];
        data.extend_from_slice(&[0xAA; 256]);
        data.extend_from_slice(&[0xBB; 5]);
        let pkt = OpusPacket::parse(&data).unwrap();
        assert_eq!(pkt.frames.len(), 2);
        assert_eq!(pkt.frames[0].len(), 256);
        assert_eq!(pkt.frames[1], &[0xBB; 5][..]);

        assert!(OpusPacket::parse(&[0x7A, 10, 1, 2]).is_err());
    }

    #[test]
    fn test_code3_vbr_lengths() {
        // VBR, 2 帧, 长度 [10, rest]
        let mut data = vec![0x7B, 0x82, 10];
        data.extend_from_slice(&[0x11; 10]);
        data.extend_from_slice(&[0x22; 7]);
        let pkt = OpusPacket::parse(&data).unwrap();
        assert!(pkt.vbr);
        assert_eq!(pkt.frame_count(), 2);
        assert_eq!(pkt.frames[0], &[0x11; 10][..]);
        assert_eq!(pkt.frames[1], &[0x22; 7][..]);
        assert_eq!(pkt.duration_samples(), 1920);
    }

    #[test]
    fn test_code3_cbr_with_padding() {
        // CBR, padding, 3 帧; 填充长度 255 + 2 → 254 + 2 = 256
        let mut data = vec![0x7B, 0x43, 0xFF, 0x02];
        data.extend_from_slice(&[0x33; 9]);
        data.extend_from_slice(&[0x00; 256]);
        let pkt = OpusPacket::parse(&data).unwrap();
        assert!(!pkt.vbr);
        assert_eq!(pkt.padding, 256);
        assert_eq!(pkt.frames, vec![&[0x33u8; 3][..]; 3]);

        // 负载无法平均分配
        let data = [0x7B, 0x03, 1, 2, 3, 4];
        assert!(matches!(
            OpusPacket::parse(&data),
            Err(LiuError::Malformed(_))
        ));
        // 帧数为 0
        assert!(OpusPacket::parse(&[0x7B, 0x00]).is_err());
    }

    #[test]
    fn test_opus_head_round_trip() {
        let head = OpusHead {
            channel_count: 2,
            pre_skip: 312,
            input_sample_rate: 44100,
            output_gain: -256,
            ..OpusHead::default()
        };
        let bytes = head.write();
        assert_eq!(bytes.len(), 19);
        assert_eq!(&bytes[..8], b"OpusHead");
        let parsed = OpusHead::parse(&bytes).unwrap();
        assert_eq!(parsed, head);
        assert_eq!(
            parsed.channel_maps(),
            vec![
                OpusChannelMap::Stream { stream: 0, channel: 0 },
                OpusChannelMap::Stream { stream: 0, channel: 1 },
            ]
        );
    }

    #[test]
    fn test_opus_head_family1_surround() {
        // 5.1: 4 个流, 其中 2 个双声道
        let head = OpusHead {
            channel_count: 6,
            mapping_family: 1,
            stream_count: 4,
            coupled_count: 2,
            channel_mapping: vec![0, 4, 1, 2, 3, 5],
            ..OpusHead::default()
        };
        let bytes = head.write();
        assert_eq!(bytes.len(), 19 + 2 + 6);
        let parsed = OpusHead::parse(&bytes).unwrap();
        assert_eq!(parsed, head);

        let maps = parsed.channel_maps();
        assert_eq!(maps.len(), 6);
        // 输出声道 1 取映射表第 2 项 (值 1): 流 0 右声道
        assert_eq!(maps[1], OpusChannelMap::Stream { stream: 0, channel: 1 });
        // 输出声道 3 取映射表第 5 项 (值 5): 单声道流 3
        assert_eq!(maps[3], OpusChannelMap::Stream { stream: 3, channel: 0 });
    }

    #[test]
    fn test_opus_head_errors() {
        assert!(matches!(
            OpusHead::parse(b"OpusHead"),
            Err(LiuError::TooShort { .. })
        ));
        let mut bytes = OpusHead::default().write();
        bytes[0] = b'X';
        assert!(matches!(
            OpusHead::parse(&bytes),
            Err(LiuError::Malformed(_))
        ));

        let mut bytes = OpusHead::default().write();
        bytes[18] = 2;
        assert!(matches!(
            OpusHead::parse(&bytes),
            Err(LiuError::Unsupported(_))
        ));

        let bad_index = OpusHead {
            channel_count: 2,
            mapping_family: 255,
            stream_count: 1,
            coupled_count: 0,
            channel_mapping: vec![0, 7],
            ..OpusHead::default()
        };
        assert!(OpusHead::parse(&bad_index.write()).is_err());
    }
}
