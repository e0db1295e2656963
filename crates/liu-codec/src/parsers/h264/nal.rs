//! H.264 NAL (Network Abstraction Layer) 单元解析.
//!
//! # Annex B 格式
//!
//! Annex B 使用起始码 (start code) 分隔 NAL 单元:
//! - 3 字节起始码: `00 00 01`
//! - 4 字节起始码: `00 00 00 01`
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌─────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └─────────────────────────────────────┘
//! ```
//!
//! # AVCC 格式
//!
//! AVCC (也称 AVC length-prefixed) 使用 4 字节长度前缀:
//! ```text
//! [length: 4 bytes BE] [NAL data: length bytes]
//! ```
//!
//! 起始码扫描与去防竞争字节的工具函数同样用于 H.265.

use liu_core::{LiuError, LiuResult};
use log::warn;

/// 4 字节起始码
pub const START_CODE_4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// 3 字节起始码
pub const START_CODE_3: [u8; 3] = [0x00, 0x00, 0x01];

/// H.264 访问单元分隔符 (AUD), 含 4 字节起始码, primary_pic_type=7
pub const H264_AUD_NAL: [u8; 6] = [0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NalUnitType {
    /// 非 IDR 图像切片 (P/B slice)
    Slice,
    /// 数据分区 A (DPA)
    SliceDpa,
    /// 数据分区 B (DPB)
    SliceDpb,
    /// 数据分区 C (DPC)
    SliceDpc,
    /// IDR 图像切片 (关键帧)
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 填充数据
    FillerData,
    /// SPS 扩展
    SpsExtension,
    /// 未知类型
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            2 => Self::SliceDpa,
            3 => Self::SliceDpb,
            4 => Self::SliceDpc,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            _ => Self::Unknown(type_id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDpa => 2,
            Self::SliceDpb => 3,
            Self::SliceDpc => 4,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::SpsExtension => 13,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDpa | Self::SliceDpb | Self::SliceDpc | Self::SliceIdr
        )
    }

    /// 是否为关键帧 (IDR)
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::SliceIdr)
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceDpa => write!(f, "SliceDPA"),
            Self::SliceDpb => write!(f, "SliceDPB"),
            Self::SliceDpc => write!(f, "SliceDPC"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EndOfSeq"),
            Self::EndOfStream => write!(f, "EndOfStream"),
            Self::FillerData => write!(f, "Filler"),
            Self::SpsExtension => write!(f, "SPSExt"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

/// 解析后的 NAL 单元
#[derive(Debug, Clone)]
pub struct NalUnit {
    /// NAL 单元类型
    pub nal_type: NalUnitType,
    /// nal_ref_idc (参考重要性, 0-3)
    pub ref_idc: u8,
    /// NAL 单元原始数据 (不含起始码, 含 NAL 头部字节)
    pub data: Vec<u8>,
}

impl NalUnit {
    /// 从 NAL 数据 (含头部字节) 解析
    pub fn parse(data: &[u8]) -> LiuResult<Self> {
        let Some(&header) = data.first() else {
            return Err(LiuError::Malformed("H.264: NAL 单元数据为空".into()));
        };

        let forbidden = (header >> 7) & 1;
        if forbidden != 0 {
            return Err(LiuError::Malformed(format!(
                "H.264: forbidden_zero_bit 非法, value={}",
                forbidden
            )));
        }

        Ok(Self {
            nal_type: NalUnitType::from_type_id(header & 0x1F),
            ref_idc: (header >> 5) & 0x03,
            data: data.to_vec(),
        })
    }

    /// 获取 RBSP (Raw Byte Sequence Payload) 数据
    ///
    /// 移除 NAL 头部字节和 emulation prevention 字节 (0x03).
    pub fn rbsp(&self) -> Vec<u8> {
        remove_emulation_prevention(&self.data[1..])
    }
}

// ============================================================
// 起始码扫描
// ============================================================

/// 从 `from` 开始查找下一个起始码
///
/// 返回 `(位置, 起始码长度)`, 长度为 3 或 4. `00 00 00 01` 优先识别为 4 字节.
pub fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 2 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 {
            if data[i + 2] == 0x01 {
                return Some((i, 3));
            }
            if i + 3 < data.len() && data[i + 2] == 0x00 && data[i + 3] == 0x01 {
                return Some((i, 4));
            }
        }
        i += 1;
    }
    None
}

/// 去掉开头的起始码 (若存在)
pub fn strip_start_code(data: &[u8]) -> &[u8] {
    if data.starts_with(&START_CODE_4) {
        &data[4..]
    } else if data.starts_with(&START_CODE_3) {
        &data[3..]
    } else {
        data
    }
}

/// 依次遍历 Annex B 数据中的 NAL 单元
///
/// 回调收到的切片包含起始码, 延伸到下一个起始码之前. 回调返回 `false` 时停止遍历.
/// 第一个起始码之前的字节被忽略.
pub fn for_each_nal<F>(data: &[u8], mut f: F)
where
    F: FnMut(&[u8]) -> bool,
{
    let Some((mut start, mut sc_len)) = find_start_code(data, 0) else {
        return;
    };
    loop {
        match find_start_code(data, start + sc_len) {
            Some((next, next_len)) => {
                if !f(&data[start..next]) {
                    return;
                }
                start = next;
                sc_len = next_len;
            }
            None => {
                f(&data[start..]);
                return;
            }
        }
    }
}

/// 获取不含起始码的 NAL 的类型
pub fn nal_type_without_start_code(nal: &[u8]) -> NalUnitType {
    NalUnitType::from_type_id(nal.first().map_or(0, |b| b & 0x1F))
}

/// 获取 NAL 类型, 自动跳过开头的起始码
pub fn nal_type(data: &[u8]) -> NalUnitType {
    nal_type_without_start_code(strip_start_code(data))
}

/// 判断一个访问单元是否为关键帧
///
/// 以第一个 VCL NAL 为准: 第一个切片为 IDR 即为关键帧.
pub fn is_idr_frame(data: &[u8]) -> bool {
    let mut idr = false;
    for_each_nal(data, |nal| {
        let nal_type = nal_type(nal);
        if nal_type.is_vcl() {
            idr = nal_type.is_idr();
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
        if nal_type(nal) == NalUnitType::Aud {
            found = true;
            return false;
        }
        true
    });
    found
}

// ============================================================
// Annex B / AVCC 分割与转换
// ============================================================

/// 从 Annex B 字节流中分割出所有 NAL 单元
///
/// 支持 3 字节 (00 00 01) 和 4 字节 (00 00 00 01) 起始码.
/// 返回的 NAL 单元不含起始码.
pub fn split_annex_b(data: &[u8]) -> Vec<NalUnit> {
    let mut nalus = Vec::new();
    for_each_nal(data, |nal| {
        let body = trim_trailing_zeros(strip_start_code(nal));
        if !body.is_empty() {
            if let Ok(nalu) = NalUnit::parse(body) {
                nalus.push(nalu);
            }
        }
        true
    });
    nalus
}

/// 从 AVCC (length-prefixed) 数据中提取 NAL 单元
///
/// `length_size` 通常为 4 (来自 AVCDecoderConfigurationRecord 的 lengthSizeMinusOne + 1)
pub fn split_avcc(data: &[u8], length_size: usize) -> Vec<NalUnit> {
    split_length_prefixed(data, length_size)
        .into_iter()
        .filter_map(|nal| NalUnit::parse(nal).ok())
        .collect()
}

/// 将 Annex B 格式转换为 AVCC 格式 (4 字节长度前缀)
pub fn annex_b_to_avcc(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    for_each_nal(data, |nal| {
        let body = trim_trailing_zeros(strip_start_code(nal));
        if !body.is_empty() {
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(body);
        }
        true
    });
    out
}

/// 将 AVCC 格式转换为 Annex B 格式 (4 字节起始码)
pub fn avcc_to_annex_b(data: &[u8], length_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    for nal in split_length_prefixed(data, length_size) {
        out.extend_from_slice(&START_CODE_4);
        out.extend_from_slice(nal);
    }
    out
}

/// 按长度前缀切分, 长度前缀字节数须在 1..=4
///
/// 长度越界时在该处停止, 已切出的 NAL 照常返回, 丢弃的字节以 warn 日志报告.
/// 需要把截断当作错误处理时使用 [`try_split_length_prefixed`].
pub fn split_length_prefixed(data: &[u8], length_size: usize) -> Vec<&[u8]> {
    if !(1..=4).contains(&length_size) {
        warn!(
            "AVCC: 长度前缀字节数非法, 丢弃 {} 字节, length_size={}",
            data.len(),
            length_size
        );
        return Vec::new();
    }
    let (nalus, consumed) = scan_length_prefixed(data, length_size);
    if consumed < data.len() {
        warn!(
            "AVCC: 长度前缀超出数据范围, 丢弃末尾 {} 字节, offset={}",
            data.len() - consumed,
            consumed
        );
    }
    nalus
}

/// 按长度前缀切分, 数据必须恰好由完整的 NAL 组成
pub fn try_split_length_prefixed(data: &[u8], length_size: usize) -> LiuResult<Vec<&[u8]>> {
    if !(1..=4).contains(&length_size) {
        return Err(LiuError::InvalidArgument(format!(
            "AVCC: 长度前缀字节数须在 1..=4, length_size={}",
            length_size
        )));
    }
    let (nalus, consumed) = scan_length_prefixed(data, length_size);
    if consumed < data.len() {
        return Err(LiuError::Malformed(format!(
            "AVCC: 长度前缀超出数据范围, offset={}, remaining={}",
            consumed,
            data.len() - consumed
        )));
    }
    Ok(nalus)
}

/// 返回完整的 NAL 与它们占用的字节数
fn scan_length_prefixed(data: &[u8], length_size: usize) -> (Vec<&[u8]>, usize) {
    let mut nalus = Vec::new();
    let mut pos = 0;
    while data.len() - pos >= length_size {
        let nal_len = data[pos..pos + length_size]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        let body = pos + length_size;
        if data.len() - body < nal_len {
            break;
        }
        nalus.push(&data[body..body + nal_len]);
        pos = body + nal_len;
    }
    (nalus, pos)
}

/// 移除 emulation prevention 字节 (0x00 0x00 0x03 → 0x00 0x00)
///
/// 得到的 SODB 可直接交给参数集解析器.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        if i + 2 < data.len() && data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x03 {
            rbsp.push(0x00);
            rbsp.push(0x00);
            i += 3;
        } else {
            rbsp.push(data[i]);
            i += 1;
        }
    }

    rbsp
}

/// 插入 emulation prevention 字节, 把 RBSP 转为 NAL 负载
///
/// 连续两个 0x00 之后若出现 0x00..=0x03, 先插入一个 0x03.
pub fn add_emulation_prevention(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + rbsp.len() / 64 + 1);
    let mut zeros = 0;
    for &b in rbsp {
        if zeros >= 2 && b <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(b);
        zeros = if b == 0x00 { zeros + 1 } else { 0 };
    }
    out
}

/// 去除尾部的 0 字节 (trailing_zero_8bits)
fn trim_trailing_zeros(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && data[end - 1] == 0x00 {
        end -= 1;
    }
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nal_type_create() {
        assert_eq!(NalUnitType::from_type_id(7), NalUnitType::Sps);
        assert_eq!(NalUnitType::from_type_id(8), NalUnitType::Pps);
        assert_eq!(NalUnitType::from_type_id(5), NalUnitType::SliceIdr);
        assert_eq!(NalUnitType::from_type_id(9), NalUnitType::Aud);
        for id in 0..=13 {
            assert_eq!(NalUnitType::from_type_id(id).type_id(), id);
        }
    }

    #[test]
    fn test_nal_unit_parse() {
        // 0b0_11_00111 = 0x67
        let nalu = NalUnit::parse(&[0x67, 0x42, 0x00, 0x1E]).unwrap();
        assert_eq!(nalu.nal_type, NalUnitType::Sps);
        assert_eq!(nalu.ref_idc, 3);
        assert!(NalUnit::parse(&[]).is_err());
    }

    #[test]
    fn test_nal_unit_reject_forbidden_zero_bit_set() {
        let err = NalUnit::parse(&[0xE7]).expect_err("forbidden_zero_bit=1 应返回错误");
        assert!(format!("{err}").contains("forbidden_zero_bit"));
    }

    #[test]
    fn test_find_start_code() {
        let data = [0xAA, 0x00, 0x00, 0x01, 0x67, 0x00, 0x00, 0x00, 0x01, 0x68];
        assert_eq!(find_start_code(&data, 0), Some((1, 3)));
        assert_eq!(find_start_code(&data, 4), Some((5, 4)));
        assert_eq!(find_start_code(&data, 9), None);
        assert_eq!(find_start_code(&[0x00, 0x00], 0), None);
    }

    #[test]
    fn test_for_each_nal_keeps_start_codes() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0xAA, // SPS
            0x00, 0x00, 0x01, 0x68, 0xBB, // PPS
            0x00, 0x00, 0x00, 0x01, 0x65, 0xCC, // IDR
        ];
        let mut units = Vec::new();
        for_each_nal(&data, |nal| {
            units.push(nal.to_vec());
            true
        });
        assert_eq!(units.len(), 3);
        assert_eq!(units[0], vec![0x00, 0x00, 0x00, 0x01, 0x67, 0xAA]);
        assert_eq!(units[1], vec![0x00, 0x00, 0x01, 0x68, 0xBB]);
        assert_eq!(nal_type(&units[2]), NalUnitType::SliceIdr);
    }

    #[test]
    fn test_for_each_nal_stop_early() {
        let data = [0x00, 0x00, 0x01, 0x09, 0x00, 0x00, 0x01, 0x67, 0x00, 0x00, 0x01, 0x68];
        let mut count = 0;
        for_each_nal(&data, |_| {
            count += 1;
            count < 2
        });
        assert_eq!(count, 2);
    }

    #[test]
    fn test_is_idr_frame_first_vcl_decides() {
        let mut au = H264_AUD_NAL.to_vec();
        au.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x67, 0x42]);
        au.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x88]);
        assert!(is_idr_frame(&au));
        assert!(has_aud(&au));

        let p_frame = [0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x00, 0x00, 0x01, 0x65, 0x88];
        assert!(!is_idr_frame(&p_frame));
        assert!(!has_aud(&p_frame));
    }

    #[test]
    fn test_annex_b_split_mixed_start_code() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0xAA, // SPS (4字节)
            0x00, 0x00, 0x01, 0x68, 0xBB, // PPS (3字节)
            0x00, 0x00, 0x01, 0x65, 0xDD, 0xEE, 0xFF, // IDR
        ];
        let nalus = split_annex_b(&data);
        assert_eq!(nalus.len(), 3);
        assert_eq!(nalus[0].nal_type, NalUnitType::Sps);
        assert_eq!(nalus[1].nal_type, NalUnitType::Pps);
        assert_eq!(nalus[2].nal_type, NalUnitType::SliceIdr);
        assert_eq!(nalus[2].data, vec![0x65, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn test_avcc_split_reject_invalid_length_size() {
        let data = [0x00, 0x00, 0x00, 0x02, 0x67, 0xAA];
        assert!(split_avcc(&data, 0).is_empty());
        assert!(split_avcc(&data, 5).is_empty());
        assert_eq!(split_avcc(&data, 4).len(), 1);
    }

    #[test]
    fn test_length_prefixed_truncated() {
        // 第二个 NAL 声明 5 字节, 实际只剩 2 字节
        let data = [0x00, 0x00, 0x00, 0x02, 0x67, 0xAA, 0x00, 0x00, 0x00, 0x05, 0x68, 0xBB];
        assert_eq!(split_length_prefixed(&data, 4), vec![&[0x67u8, 0xAA][..]]);
        let err = try_split_length_prefixed(&data, 4).unwrap_err();
        assert!(matches!(err, LiuError::Malformed(_)), "{err:?}");
        assert!(format!("{err}").contains("offset=6"));

        // 末尾只有半个长度前缀
        let err = try_split_length_prefixed(&data[..8], 4).unwrap_err();
        assert!(matches!(err, LiuError::Malformed(_)));

        assert!(matches!(
            try_split_length_prefixed(&data, 0),
            Err(LiuError::InvalidArgument(_))
        ));
        assert_eq!(try_split_length_prefixed(&data[..6], 4).unwrap().len(), 1);
        assert!(try_split_length_prefixed(&[], 4).unwrap().is_empty());

        // 两字节长度前缀
        let short = [0x00, 0x01, 0x09, 0x00, 0x02, 0x41, 0x9A];
        assert_eq!(try_split_length_prefixed(&short, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_annex_b_avcc_convert() {
        let annexb = [
            0x00, 0x00, 0x01, 0x67, 0xAA, // SPS
            0x00, 0x00, 0x01, 0x68, 0xBB, // PPS
        ];
        let avcc = annex_b_to_avcc(&annexb);
        assert_eq!(
            avcc,
            vec![0, 0, 0, 2, 0x67, 0xAA, 0, 0, 0, 2, 0x68, 0xBB]
        );

        let back = avcc_to_annex_b(&avcc, 4);
        assert_eq!(
            back,
            vec![0, 0, 0, 1, 0x67, 0xAA, 0, 0, 0, 1, 0x68, 0xBB]
        );
    }

    #[test]
    fn test_emulation_prevention_remove() {
        let data = [0x01, 0x00, 0x00, 0x03, 0x02, 0x03];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x01, 0x00, 0x00, 0x02, 0x03]
        );
        let data = [0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x01];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x00, 0x00, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_emulation_prevention_add() {
        let rbsp = [0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x05];
        let escaped = add_emulation_prevention(&rbsp);
        assert_eq!(
            escaped,
            vec![0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00, 0x00, 0x05]
        );
        assert_eq!(remove_emulation_prevention(&escaped), rbsp.to_vec());
    }

    #[test]
    fn test_rbsp_extract() {
        let nalu = NalUnit::parse(&[0x67, 0x42, 0x00, 0x00, 0x03, 0x01, 0xAA]).unwrap();
        assert_eq!(nalu.rbsp(), vec![0x42, 0x00, 0x00, 0x01, 0xAA]);
    }
}
