//! HEVC PPS (Picture Parameter Set) 解析, ITU-T H.265 §7.3.2.3.1.
//!
//! 只解析到 tiles 信息为止, hvcC 的 parallelismType 依赖
//! entropy_coding_sync_enabled_flag 与 tiles_enabled_flag.

use liu_core::bitreader::BitReader;
use liu_core::golomb::{read_se, read_ue};
use liu_core::{LiuError, LiuResult};

use super::nal::nal_to_rbsp;

/// PPS 解析结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HevcPps {
    /// pps_pic_parameter_set_id
    pub pps_id: u32,
    /// pps_seq_parameter_set_id
    pub sps_id: u32,
    /// dependent_slice_segments_enabled_flag
    pub dependent_slice_segments_enabled: bool,
    /// output_flag_present_flag
    pub output_flag_present: bool,
    /// num_extra_slice_header_bits
    pub num_extra_slice_header_bits: u8,
    /// cabac_init_present_flag
    pub cabac_init_present: bool,
    /// init_qp_minus26
    pub init_qp_minus26: i32,
    /// tiles_enabled_flag
    pub tiles_enabled: bool,
    /// entropy_coding_sync_enabled_flag
    pub entropy_coding_sync_enabled: bool,
    /// (num_tile_columns, num_tile_rows), 仅 tiles_enabled 时有效
    pub tile_grid: Option<(u32, u32)>,
    /// uniform_spacing_flag
    pub uniform_spacing: bool,
}

impl HevcPps {
    /// 从 PPS NAL 解析 (起始码可选)
    pub fn from_nal(nal: &[u8]) -> LiuResult<Self> {
        parse_hevc_pps(&nal_to_rbsp(nal, "HEVC PPS")?)
    }
}

/// 解析 PPS RBSP (不含 2 字节 NAL 头)
pub fn parse_hevc_pps(rbsp: &[u8]) -> LiuResult<HevcPps> {
    let mut br = BitReader::new(rbsp);
    let mut pps = HevcPps::default();

    pps.pps_id = read_ue(&mut br)?;
    if pps.pps_id > 63 {
        return Err(LiuError::Malformed(format!(
            "HEVC: pps_id 超出范围, pps_id={}",
            pps.pps_id
        )));
    }
    pps.sps_id = read_ue(&mut br)?;
    if pps.sps_id > 15 {
        return Err(LiuError::Malformed(format!(
            "HEVC: PPS 引用的 sps_id 超出范围, sps_id={}",
            pps.sps_id
        )));
    }

    pps.dependent_slice_segments_enabled = br.read_flag()?;
    pps.output_flag_present = br.read_flag()?;
    pps.num_extra_slice_header_bits = br.read_bits(3)? as u8;
    br.skip_bits(1)?; // sign_data_hiding_enabled_flag
    pps.cabac_init_present = br.read_flag()?;
    read_ue(&mut br)?; // num_ref_idx_l0_default_active_minus1
    read_ue(&mut br)?; // num_ref_idx_l1_default_active_minus1
    pps.init_qp_minus26 = read_se(&mut br)?;
    br.skip_bits(2)?; // constrained_intra_pred_flag, transform_skip_enabled_flag
    // cu_qp_delta_enabled_flag
    if br.read_flag()? {
        read_ue(&mut br)?; // diff_cu_qp_delta_depth
    }
    read_se(&mut br)?; // pps_cb_qp_offset
    read_se(&mut br)?; // pps_cr_qp_offset
    // pps_slice_chroma_qp_offsets_present_flag, weighted_pred_flag,
    // weighted_bipred_flag, transquant_bypass_enabled_flag
    br.skip_bits(4)?;
    pps.tiles_enabled = br.read_flag()?;
    pps.entropy_coding_sync_enabled = br.read_flag()?;

    if pps.tiles_enabled {
        let columns_minus1 = read_ue(&mut br)?;
        let rows_minus1 = read_ue(&mut br)?;
        if columns_minus1 > 19 || rows_minus1 > 21 {
            return Err(LiuError::Malformed(format!(
                "HEVC: tiles 数量超出范围, columns_minus1={}, rows_minus1={}",
                columns_minus1, rows_minus1
            )));
        }
        pps.tile_grid = Some((columns_minus1 + 1, rows_minus1 + 1));
        pps.uniform_spacing = br.read_flag()?;
        if !pps.uniform_spacing {
            for _ in 0..columns_minus1 + rows_minus1 {
                read_ue(&mut br)?; // column_width_minus1 / row_height_minus1
            }
        }
        br.skip_bits(1)?; // loop_filter_across_tiles_enabled_flag
    }

    Ok(pps)
}

/// 读取 PPS NAL 的 pps_id (起始码可选)
pub fn get_hevc_pps_id(nal: &[u8]) -> LiuResult<u32> {
    let rbsp = nal_to_rbsp(nal, "HEVC PPS")?;
    read_ue(&mut BitReader::new(&rbsp))
}
