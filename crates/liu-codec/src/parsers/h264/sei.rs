//! H.264 SEI (Supplemental Enhancement Information) 消息.
//!
//! payloadType 与 payloadSize 均采用 0xFF 累加编码:
//! 每个 0xFF 字节贡献 255, 最后一个非 0xFF 字节给出余数.
//! 目前只识别 user_data_unregistered (type 5), 其余类型保留原始负载.

use liu_core::bitreader::BitReader;
use liu_core::bitwriter::BitWriter;
use liu_core::{LiuError, LiuResult};

use super::nal::add_emulation_prevention;

/// user_data_unregistered 的 payloadType
pub const SEI_USER_DATA_UNREGISTERED: u32 = 5;

/// SEI 负载
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeiPayload {
    /// 未注册用户数据: 16 字节 UUID + 任意数据
    UserDataUnregistered { uuid: [u8; 16], data: Vec<u8> },
    /// 其它类型, 原样保留
    Raw(Vec<u8>),
}

/// 单条 SEI 消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeiMessage {
    /// payloadType
    pub payload_type: u32,
    /// 负载内容
    pub payload: SeiPayload,
}

impl SeiMessage {
    /// 构造一条 user_data_unregistered 消息
    pub fn user_data(uuid: [u8; 16], data: Vec<u8>) -> Self {
        Self {
            payload_type: SEI_USER_DATA_UNREGISTERED,
            payload: SeiPayload::UserDataUnregistered { uuid, data },
        }
    }

    /// 负载字节数
    pub fn payload_size(&self) -> usize {
        match &self.payload {
            SeiPayload::UserDataUnregistered { data, .. } => 16 + data.len(),
            SeiPayload::Raw(data) => data.len(),
        }
    }

    /// 从 SEI RBSP 的当前位置解码一条消息
    pub fn decode(br: &mut BitReader) -> LiuResult<Self> {
        let payload_type = read_ff_coded(br)?;
        let payload_size = read_ff_coded(br)? as usize;
        let body = br.read_bytes(payload_size)?;

        let payload = if payload_type == SEI_USER_DATA_UNREGISTERED {
            if payload_size < 16 {
                return Err(LiuError::Malformed(format!(
                    "H.264: user_data_unregistered 长度不足 16 字节, size={}",
                    payload_size
                )));
            }
            let mut uuid = [0u8; 16];
            uuid.copy_from_slice(&body[..16]);
            SeiPayload::UserDataUnregistered {
                uuid,
                data: body[16..].to_vec(),
            }
        } else {
            SeiPayload::Raw(body.to_vec())
        };

        Ok(Self {
            payload_type,
            payload,
        })
    }

    /// 编码为 sei_message() 字节 (不含 NAL 头与 rbsp_trailing_bits)
    pub fn encode(&self, bw: &mut BitWriter) -> LiuResult<()> {
        write_ff_coded(bw, self.payload_type);
        write_ff_coded(bw, self.payload_size() as u32);
        match &self.payload {
            SeiPayload::UserDataUnregistered { uuid, data } => {
                bw.write_bytes(uuid)?;
                bw.write_bytes(data)?;
            }
            SeiPayload::Raw(data) => bw.write_bytes(data)?,
        }
        Ok(())
    }

    /// 编码为完整 SEI NAL (含 4 字节起始码与 NAL 头)
    pub fn to_nal(&self) -> LiuResult<Vec<u8>> {
        let mut bw = BitWriter::with_capacity(self.payload_size() + 16);
        self.encode(&mut bw)?;
        bw.write_bits(0x80, 8); // rbsp_trailing_bits

        let mut nal = vec![0x00, 0x00, 0x00, 0x01, 0x06];
        nal.extend_from_slice(&add_emulation_prevention(bw.data()));
        Ok(nal)
    }
}

/// 解析 SEI RBSP (不含 NAL 头) 中的全部消息
pub fn parse_sei_rbsp(rbsp: &[u8]) -> LiuResult<Vec<SeiMessage>> {
    let mut br = BitReader::new(rbsp);
    let mut messages = Vec::new();
    // 剩余只有 rbsp_trailing_bits (0x80) 时结束
    while br.bytes_left() > 1 || (br.bytes_left() == 1 && br.peek_bits(8)? != 0x80) {
        messages.push(SeiMessage::decode(&mut br)?);
    }
    Ok(messages)
}

fn read_ff_coded(br: &mut BitReader) -> LiuResult<u32> {
    let mut value = 0u32;
    loop {
        let byte = br.read_bits(8)?;
        value = value.saturating_add(byte);
        if byte != 0xFF {
            return Ok(value);
        }
    }
}

fn write_ff_coded(bw: &mut BitWriter, mut value: u32) {
    while value >= 0xFF {
        bw.write_bits(0xFF, 8);
        value -= 0xFF;
    }
    bw.write_bits(value, 8);
}
