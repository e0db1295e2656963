//! H.265/HEVC NAL (Network Abstraction Layer) 单元解析.
//!
//! HEVC NAL 头部为 2 字节 (比 H.264 多一字节):
//! - forbidden_zero_bit (1 bit)
//! - nal_unit_type (6 bits)
//! - nuh_layer_id (6 bits)
//! - nuh_temporal_id_plus1 (3 bits)
//!
//! 起始码扫描复用 H.264 的工具函数.

use liu_core::{LiuError, LiuResult};

use crate::parsers::h264::nal::{for_each_nal, remove_emulation_prevention, strip_start_code};

/// H.265 访问单元分隔符 (AUD), 含 4 字节起始码, pic_type=2
pub const H265_AUD_NAL: [u8; 7] = [0x00, 0x00, 0x00, 0x01, 0x46, 0x01, 0x50];

/// HEVC NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HevcNalUnitType {
    /// TRAIL_N (非参考尾随图像)
    TrailN,
    /// TRAIL_R (参考尾随图像)
    TrailR,
    /// TSA_N
    TsaN,
    /// TSA_R
    TsaR,
    /// STSA_N
    StsaN,
    /// STSA_R
    StsaR,
    /// RADL_N
    RadlN,
    /// RADL_R
    RadlR,
    /// RASL_N
    RaslN,
    /// RASL_R
    RaslR,
    /// BLA_W_LP (Broken Link Access)
    BlaWLp,
    /// BLA_W_RADL
    BlaWRadl,
    /// BLA_N_LP
    BlaNLp,
    /// IDR_W_RADL (Instantaneous Decoding Refresh)
    IdrWRadl,
    /// IDR_N_LP
    IdrNLp,
    /// CRA_NUT (Clean Random Access)
    Cra,
    /// VPS (Video Parameter Set)
    Vps,
    /// SPS (Sequence Parameter Set)
    Sps,
    /// PPS (Picture Parameter Set)
    Pps,
    /// AUD (Access Unit Delimiter)
    Aud,
    /// EOS (End of Sequence)
    Eos,
    /// EOB (End of Bitstream)
    Eob,
    /// FD (Filler Data)
    FillerData,
    /// PREFIX_SEI
    PrefixSei,
    /// SUFFIX_SEI
    SuffixSei,
    /// 未知类型
    Unknown(u8),
}

impl HevcNalUnitType {
    /// 从类型编号创建
    pub fn from_type_id(id: u8) -> Self {
        match id {
            0 => Self::TrailN,
            1 => Self::TrailR,
            2 => Self::TsaN,
            3 => Self::TsaR,
            4 => Self::StsaN,
            5 => Self::StsaR,
            6 => Self::RadlN,
            7 => Self::RadlR,
            8 => Self::RaslN,
            9 => Self::RaslR,
            16 => Self::BlaWLp,
            17 => Self::BlaWRadl,
            18 => Self::BlaNLp,
            19 => Self::IdrWRadl,
            20 => Self::IdrNLp,
            21 => Self::Cra,
            32 => Self::Vps,
            33 => Self::Sps,
            34 => Self::Pps,
            35 => Self::Aud,
            36 => Self::Eos,
            37 => Self::Eob,
            38 => Self::FillerData,
            39 => Self::PrefixSei,
            40 => Self::SuffixSei,
            _ => Self::Unknown(id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::TrailN => 0,
            Self::TrailR => 1,
            Self::TsaN => 2,
            Self::TsaR => 3,
            Self::StsaN => 4,
            Self::StsaR => 5,
            Self::RadlN => 6,
            Self::RadlR => 7,
            Self::RaslN => 8,
            Self::RaslR => 9,
            Self::BlaWLp => 16,
            Self::BlaWRadl => 17,
            Self::BlaNLp => 18,
            Self::IdrWRadl => 19,
            Self::IdrNLp => 20,
            Self::Cra => 21,
            Self::Vps => 32,
            Self::Sps => 33,
            Self::Pps => 34,
            Self::Aud => 35,
            Self::Eos => 36,
            Self::Eob => 37,
            Self::FillerData => 38,
            Self::PrefixSei => 39,
            Self::SuffixSei => 40,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        self.type_id() < 32
    }

    /// 是否为 IRAP (Intra Random Access Point) NAL, 封装层按关键帧处理
    pub fn is_irap(&self) -> bool {
        matches!(self.type_id(), 16..=21)
    }

    /// 是否为 IDR NAL
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }
}

/// HEVC NAL 单元
#[derive(Debug, Clone)]
pub struct HevcNalUnit {
    /// NAL 类型
    pub nal_type: HevcNalUnitType,
    /// nuh_layer_id
    pub layer_id: u8,
    /// nuh_temporal_id_plus1
    pub temporal_id_plus1: u8,
    /// NAL 数据 (不含起始码, 含 2 字节 NAL 头)
    pub data: Vec<u8>,
}

impl HevcNalUnit {
    /// 从原始 NAL 数据 (含 2 字节头) 解析
    pub fn parse(data: &[u8]) -> LiuResult<Self> {
        LiuError::check_len("HEVC NAL", data, 2)?;
        if data[0] & 0x80 != 0 {
            return Err(LiuError::Malformed(
                "HEVC: forbidden_zero_bit 非法, value=1".into(),
            ));
        }

        Ok(Self {
            nal_type: HevcNalUnitType::from_type_id((data[0] >> 1) & 0x3F),
            layer_id: ((data[0] & 1) << 5) | (data[1] >> 3),
            temporal_id_plus1: data[1] & 0x07,
            data: data.to_vec(),
        })
    }

    /// 去掉 NAL 头与防竞争字节后的 RBSP
    pub fn rbsp(&self) -> Vec<u8> {
        remove_emulation_prevention(&self.data[2..])
    }
}

/// 获取不含起始码的 NAL 的类型
pub fn nal_type_without_start_code(nal: &[u8]) -> HevcNalUnitType {
    HevcNalUnitType::from_type_id(nal.first().map_or(0, |b| (b >> 1) & 0x3F))
}

/// 获取 NAL 类型, 自动跳过开头的起始码
pub fn nal_type(data: &[u8]) -> HevcNalUnitType {
    nal_type_without_start_code(strip_start_code(data))
}

/// 判断一个访问单元是否为关键帧
///
/// 以第一个 VCL NAL 为准, IRAP 类型 (16..=21) 视为关键帧.
pub fn is_idr_frame(data: &[u8]) -> bool {
    let mut idr = false;
    for_each_nal(data, |nal| {
        let nal_type = nal_type(nal);
        if nal_type.is_vcl() {
            idr = nal_type.is_irap();
            return false;
        }
        true
    });
    idr
}

/// 访问单元中是否已包含 AUD
pub fn has_aud(data: &[u8]) -> bool {
    let mut found = false;
    for_each_nal(data, |nal| {
        if nal_type(nal) == HevcNalUnitType::Aud {
            found = true;
            return false;
        }
        true
    });
    found
}

/// 从 Annex B 格式分割 HEVC NAL 单元 (不含起始码)
pub fn split_hevc_annex_b(data: &[u8]) -> Vec<HevcNalUnit> {
    let mut nalus = Vec::new();
    for_each_nal(data, |nal| {
        let body = strip_start_code(nal);
        let end = body.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        if let Ok(nalu) = HevcNalUnit::parse(&body[..end]) {
            nalus.push(nalu);
        }
        true
    });
    nalus
}

/// 去掉起始码与 2 字节 NAL 头, 返回 RBSP
pub(crate) fn nal_to_rbsp(nal: &[u8], what: &'static str) -> LiuResult<Vec<u8>> {
    let nal = strip_start_code(nal);
    LiuError::check_len(what, nal, 3)?;
    Ok(remove_emulation_prevention(&nal[2..]))
}
