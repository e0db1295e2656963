//! H.264 PPS (Picture Parameter Set) 解析器.
//!
//! 只解析 PPS 开头与封装层相关的字段: id、所引用的 SPS 以及熵编码模式.

use liu_core::bitreader::BitReader;
use liu_core::golomb::read_ue;
use liu_core::{LiuError, LiuResult};

use super::nal::{remove_emulation_prevention, strip_start_code};

/// PPS 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    /// pic_parameter_set_id
    pub pps_id: u32,
    /// seq_parameter_set_id
    pub sps_id: u32,
    /// entropy_coding_mode_flag (true = CABAC)
    pub entropy_coding_mode: bool,
    /// bottom_field_pic_order_in_frame_present_flag
    pub bottom_field_pic_order_in_frame_present: bool,
    /// num_slice_groups_minus1
    pub num_slice_groups_minus1: u32,
}

impl Pps {
    /// 从 NAL 单元解析, 起始码可有可无
    pub fn from_nal(nal: &[u8]) -> LiuResult<Self> {
        let nal = strip_start_code(nal);
        LiuError::check_len("H.264 PPS NAL", nal, 2)?;
        parse_pps(&remove_emulation_prevention(&nal[1..]))
    }
}

/// 从 RBSP 数据 (不含 NAL 头) 解析 PPS
pub fn parse_pps(rbsp: &[u8]) -> LiuResult<Pps> {
    LiuError::check_len("H.264 PPS", rbsp, 1)?;
    let mut br = BitReader::new(rbsp);

    let pps_id = read_ue(&mut br)?;
    if pps_id > 255 {
        return Err(LiuError::Malformed(format!(
            "H.264: pps_id 超出范围, pps_id={}",
            pps_id
        )));
    }
    let sps_id = read_ue(&mut br)?;
    if sps_id > 31 {
        return Err(LiuError::Malformed(format!(
            "H.264: PPS 引用的 sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    Ok(Pps {
        pps_id,
        sps_id,
        entropy_coding_mode: br.read_flag()?,
        bottom_field_pic_order_in_frame_present: br.read_flag()?,
        num_slice_groups_minus1: read_ue(&mut br)?,
    })
}

/// 读取 PPS NAL 中的 pic_parameter_set_id
///
/// NAL 含头部字节, 起始码可有可无.
pub fn get_pps_id(nal: &[u8]) -> LiuResult<u32> {
    let nal = strip_start_code(nal);
    LiuError::check_len("H.264 PPS NAL", nal, 2)?;
    let rbsp = remove_emulation_prevention(&nal[1..]);
    read_ue(&mut BitReader::new(&rbsp))
}
