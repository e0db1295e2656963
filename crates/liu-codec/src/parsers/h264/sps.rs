//! H.264 SPS (Sequence Parameter Set) 解析器.
//!
//! SPS 包含编码视频序列的全局参数, 包括:
//! - Profile / Level (编码规格)
//! - 图像宽度和高度 (以宏块为单位, 需要 cropping 调整)
//! - 色度格式与位深
//! - VUI (宽高比、timing、HRD、码流限制)
//!
//! 解析严格按 ITU-T H.264 表 7.3.2.1.1 的顺序读取, 不需要的字段也按语法跳过,
//! 保证游标落点正确.

use liu_core::bitreader::BitReader;
use liu_core::golomb::{read_se, read_ue};
use liu_core::{LiuError, LiuResult};

use super::nal::{remove_emulation_prevention, strip_start_code};

/// SPS 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    /// profile_idc (编码规格, 如 66=Baseline, 77=Main, 100=High)
    pub profile_idc: u8,
    /// constraint_set0..5 标志位与 2 位保留位
    pub constraint_set_flags: u8,
    /// level_idc (编码级别, 如 30=3.0, 41=4.1)
    pub level_idc: u8,
    /// seq_parameter_set_id
    pub sps_id: u32,
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    /// separate_colour_plane_flag
    pub separate_colour_plane: bool,
    /// bit_depth_luma_minus8
    pub bit_depth_luma_minus8: u32,
    /// bit_depth_chroma_minus8
    pub bit_depth_chroma_minus8: u32,
    /// log2(max_frame_num) = log2_max_frame_num_minus4 + 4
    pub log2_max_frame_num: u32,
    /// 图像顺序计数类型 (0, 1, 2)
    pub poc_type: u32,
    /// log2(max_pic_order_cnt_lsb) (仅 poc_type==0)
    pub log2_max_poc_lsb: u32,
    /// 最大参考帧数
    pub max_num_ref_frames: u32,
    /// gaps_in_frame_num_value_allowed_flag
    pub gaps_in_frame_num_allowed: bool,
    /// pic_width_in_mbs_minus1
    pub pic_width_in_mbs_minus1: u32,
    /// pic_height_in_map_units_minus1
    pub pic_height_in_map_units_minus1: u32,
    /// 是否为帧编码 (非场编码)
    pub frame_mbs_only: bool,
    /// direct_8x8_inference_flag
    pub direct_8x8_inference: bool,
    /// cropping 偏移 (左, 右, 上, 下), 单位为 crop unit
    pub crop: [u32; 4],
    /// 图像宽度 (像素, 已应用 cropping)
    pub width: u32,
    /// 图像高度 (像素, 已应用 cropping)
    pub height: u32,
    /// VUI 参数
    pub vui: Option<Vui>,
}

/// VUI 中提取的字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vui {
    /// 像素宽高比 (sar_width, sar_height), 未指定为 (0, 1)
    pub sar: (u32, u32),
    /// video_full_range_flag
    pub full_range: bool,
    /// colour_primaries / transfer_characteristics / matrix_coefficients
    pub colour_description: Option<(u8, u8, u8)>,
    /// (num_units_in_tick, time_scale)
    pub timing: Option<(u32, u32)>,
    /// fixed_frame_rate_flag
    pub fixed_frame_rate: bool,
    /// 是否带 NAL 或 VCL HRD
    pub hrd_present: bool,
    /// max_num_reorder_frames (bitstream_restriction)
    pub max_num_reorder_frames: Option<u32>,
    /// max_dec_frame_buffering (bitstream_restriction)
    pub max_dec_frame_buffering: Option<u32>,
}

impl Vui {
    /// 帧率 (time_scale, 2 * num_units_in_tick)
    pub fn frame_rate(&self) -> Option<(u32, u32)> {
        self.timing
            .map(|(units, scale)| (scale, units.saturating_mul(2)))
    }
}

impl Sps {
    /// 从 NAL 单元解析, 起始码可有可无
    pub fn from_nal(nal: &[u8]) -> LiuResult<Self> {
        let nal = strip_start_code(nal);
        LiuError::check_len("H.264 SPS NAL", nal, 4)?;
        parse_sps(&remove_emulation_prevention(&nal[1..]))
    }

    /// 图像分辨率 (width, height)
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 是否为 High 系列 profile (SPS 带色度/位深字段)
    pub fn is_high_profile(&self) -> bool {
        is_high_profile(self.profile_idc)
    }
}

/// 预定义的 SAR 表 (ITU-T H.264 表 E-1)
pub(crate) const SAR_TABLE: [(u32, u32); 17] = [
    (0, 1),
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

/// 从 RBSP 数据 (不含 NAL 头) 解析 SPS
pub fn parse_sps(rbsp: &[u8]) -> LiuResult<Sps> {
    LiuError::check_len("H.264 SPS", rbsp, 3)?;

    let mut br = BitReader::new(rbsp);

    let profile_idc = br.read_bits(8)? as u8;
    let constraint_set_flags = br.read_bits(8)? as u8;
    let level_idc = br.read_bits(8)? as u8;
    let sps_id = read_ue(&mut br)?;
    if sps_id > 31 {
        return Err(LiuError::Malformed(format!(
            "H.264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let mut chroma_format_idc = 1; // 默认 4:2:0
    let mut separate_colour_plane = false;
    let mut bit_depth_luma_minus8 = 0;
    let mut bit_depth_chroma_minus8 = 0;

    // High profile 及以上有额外字段
    if is_high_profile(profile_idc) {
        chroma_format_idc = read_ue(&mut br)?;
        if chroma_format_idc > 3 {
            return Err(LiuError::Malformed(format!(
                "H.264: chroma_format_idc 非法, value={}",
                chroma_format_idc
            )));
        }
        if chroma_format_idc == 3 {
            separate_colour_plane = br.read_flag()?;
        }
        bit_depth_luma_minus8 = read_ue(&mut br)?;
        bit_depth_chroma_minus8 = read_ue(&mut br)?;
        if bit_depth_luma_minus8 > 6 || bit_depth_chroma_minus8 > 6 {
            return Err(LiuError::Malformed(format!(
                "H.264: bit_depth 非法, luma_minus8={}, chroma_minus8={}",
                bit_depth_luma_minus8, bit_depth_chroma_minus8
            )));
        }
        br.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag

        if br.read_flag()? {
            // seq_scaling_matrix_present_flag
            let list_count = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..list_count {
                if br.read_flag()? {
                    skip_scaling_list(&mut br, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    let log2_max_frame_num_minus4 = read_ue(&mut br)?;
    if log2_max_frame_num_minus4 > 12 {
        return Err(LiuError::Malformed(format!(
            "H.264: log2_max_frame_num_minus4 超出范围, value={}",
            log2_max_frame_num_minus4
        )));
    }

    let poc_type = read_ue(&mut br)?;
    let mut log2_max_poc_lsb = 0;
    match poc_type {
        0 => {
            let log2_max_poc_lsb_minus4 = read_ue(&mut br)?;
            if log2_max_poc_lsb_minus4 > 12 {
                return Err(LiuError::Malformed(format!(
                    "H.264: log2_max_pic_order_cnt_lsb_minus4 超出范围, value={}",
                    log2_max_poc_lsb_minus4
                )));
            }
            log2_max_poc_lsb = log2_max_poc_lsb_minus4 + 4;
        }
        1 => {
            br.skip_bits(1)?; // delta_pic_order_always_zero_flag
            read_se(&mut br)?; // offset_for_non_ref_pic
            read_se(&mut br)?; // offset_for_top_to_bottom_field
            let num_ref_in_poc = read_ue(&mut br)?;
            if num_ref_in_poc > 255 {
                return Err(LiuError::Malformed(format!(
                    "H.264: num_ref_frames_in_pic_order_cnt_cycle 超出范围, value={}",
                    num_ref_in_poc
                )));
            }
            for _ in 0..num_ref_in_poc {
                read_se(&mut br)?; // offset_for_ref_frame
            }
        }
        2 => {}
        _ => {
            return Err(LiuError::Malformed(format!(
                "H.264: pic_order_cnt_type 非法, value={}",
                poc_type
            )));
        }
    }

    let max_num_ref_frames = read_ue(&mut br)?;
    if max_num_ref_frames > 16 {
        return Err(LiuError::Malformed(format!(
            "H.264: max_num_ref_frames 超出范围, value={}",
            max_num_ref_frames
        )));
    }
    let gaps_in_frame_num_allowed = br.read_flag()?;

    let pic_width_in_mbs_minus1 = read_ue(&mut br)?;
    let pic_height_in_map_units_minus1 = read_ue(&mut br)?;

    let frame_mbs_only = br.read_flag()?;
    if !frame_mbs_only {
        br.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    let direct_8x8_inference = br.read_flag()?;

    let mut crop = [0u32; 4];
    if br.read_flag()? {
        for c in crop.iter_mut() {
            *c = read_ue(&mut br)?;
        }
    }

    let chroma_array_type = if separate_colour_plane {
        0
    } else {
        chroma_format_idc
    };
    let (width, height) = compute_resolution(
        pic_width_in_mbs_minus1,
        pic_height_in_map_units_minus1,
        frame_mbs_only,
        chroma_array_type,
        &crop,
    )?;

    let vui = if br.read_flag()? {
        Some(parse_vui(&mut br)?)
    } else {
        None
    };

    Ok(Sps {
        profile_idc,
        constraint_set_flags,
        level_idc,
        sps_id,
        chroma_format_idc,
        separate_colour_plane,
        bit_depth_luma_minus8,
        bit_depth_chroma_minus8,
        log2_max_frame_num: log2_max_frame_num_minus4 + 4,
        poc_type,
        log2_max_poc_lsb,
        max_num_ref_frames,
        gaps_in_frame_num_allowed,
        pic_width_in_mbs_minus1,
        pic_height_in_map_units_minus1,
        frame_mbs_only,
        direct_8x8_inference,
        crop,
        width,
        height,
        vui,
    })
}

/// 读取 SPS NAL 中的 seq_parameter_set_id
///
/// NAL 含头部字节, 起始码可有可无.
pub fn get_sps_id(nal: &[u8]) -> LiuResult<u32> {
    let nal = strip_start_code(nal);
    LiuError::check_len("H.264 SPS NAL", nal, 5)?;
    let rbsp = remove_emulation_prevention(&nal[1..]);
    let mut br = BitReader::new(&rbsp);
    br.skip_bits(24)?;
    read_ue(&mut br)
}

// ============================================================
// 辅助函数
// ============================================================

/// 是否为 High Profile 或更高
fn is_high_profile(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    )
}

/// 获取 cropping 单位 (CropUnitX, CropUnitY)
fn cropping_unit(chroma_array_type: u32, frame_mbs_only: bool) -> (u32, u32) {
    let height_mult = if frame_mbs_only { 1 } else { 2 };
    match chroma_array_type {
        0 => (1, height_mult),
        1 => (2, 2 * height_mult),
        2 => (2, height_mult),
        _ => (1, height_mult),
    }
}

fn compute_resolution(
    width_in_mbs_minus1: u32,
    height_in_map_units_minus1: u32,
    frame_mbs_only: bool,
    chroma_array_type: u32,
    crop: &[u32; 4],
) -> LiuResult<(u32, u32)> {
    let overflow = || LiuError::Malformed("H.264: 计算分辨率时发生溢出".into());

    let (crop_unit_x, crop_unit_y) = cropping_unit(chroma_array_type, frame_mbs_only);
    let raw_width = width_in_mbs_minus1
        .checked_add(1)
        .and_then(|v| v.checked_mul(16))
        .ok_or_else(overflow)?;
    let raw_height = height_in_map_units_minus1
        .checked_add(1)
        .and_then(|v| v.checked_mul(if frame_mbs_only { 16 } else { 32 }))
        .ok_or_else(overflow)?;
    let crop_x = crop[0]
        .checked_add(crop[1])
        .and_then(|v| v.checked_mul(crop_unit_x))
        .ok_or_else(overflow)?;
    let crop_y = crop[2]
        .checked_add(crop[3])
        .and_then(|v| v.checked_mul(crop_unit_y))
        .ok_or_else(overflow)?;
    if crop_x >= raw_width || crop_y >= raw_height {
        return Err(LiuError::Malformed(format!(
            "H.264: 裁剪参数非法, raw={}x{}, crop_x={}, crop_y={}",
            raw_width, raw_height, crop_x, crop_y
        )));
    }
    Ok((raw_width - crop_x, raw_height - crop_y))
}

/// 跳过一个 scaling_list (delta_scale 循环)
fn skip_scaling_list(br: &mut BitReader, size: usize) -> LiuResult<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = read_se(br)?;
            if !(-128..=127).contains(&delta_scale) {
                return Err(LiuError::Malformed(format!(
                    "H.264: delta_scale 超出范围, delta_scale={}",
                    delta_scale
                )));
            }
            next_scale = (last_scale + delta_scale + 256).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

/// 解析 VUI 参数 (附录 E.1.1)
fn parse_vui(br: &mut BitReader) -> LiuResult<Vui> {
    let mut vui = Vui {
        sar: (0, 1),
        ..Vui::default()
    };

    // aspect_ratio_info_present_flag
    if br.read_flag()? {
        let ar_idc = br.read_bits(8)? as usize;
        if ar_idc == 255 {
            // Extended_SAR
            vui.sar = (br.read_bits(16)?, br.read_bits(16)?);
        } else if let Some(&sar) = SAR_TABLE.get(ar_idc) {
            vui.sar = sar;
        } else {
            return Err(LiuError::Malformed(format!(
                "H.264: VUI aspect_ratio_idc 非法, value={}",
                ar_idc
            )));
        }
    }

    // overscan_info_present_flag
    if br.read_flag()? {
        br.skip_bits(1)?; // overscan_appropriate_flag
    }

    // video_signal_type_present_flag
    if br.read_flag()? {
        br.skip_bits(3)?; // video_format
        vui.full_range = br.read_flag()?;
        if br.read_flag()? {
            vui.colour_description = Some((
                br.read_bits(8)? as u8,
                br.read_bits(8)? as u8,
                br.read_bits(8)? as u8,
            ));
        }
    }

    // chroma_loc_info_present_flag
    if br.read_flag()? {
        read_ue(br)?; // chroma_sample_loc_type_top_field
        read_ue(br)?; // chroma_sample_loc_type_bottom_field
    }

    // timing_info_present_flag
    if br.read_flag()? {
        let num_units = br.read_bits(32)?;
        let time_scale = br.read_bits(32)?;
        vui.fixed_frame_rate = br.read_flag()?;
        vui.timing = Some((num_units, time_scale));
    }

    let nal_hrd = br.read_flag()?;
    if nal_hrd {
        skip_hrd_parameters(br)?;
    }
    let vcl_hrd = br.read_flag()?;
    if vcl_hrd {
        skip_hrd_parameters(br)?;
    }
    if nal_hrd || vcl_hrd {
        br.skip_bits(1)?; // low_delay_hrd_flag
    }
    vui.hrd_present = nal_hrd || vcl_hrd;
    br.skip_bits(1)?; // pic_struct_present_flag

    // bitstream_restriction_flag
    if br.read_flag()? {
        br.skip_bits(1)?; // motion_vectors_over_pic_boundaries_flag
        read_ue(br)?; // max_bytes_per_pic_denom
        read_ue(br)?; // max_bits_per_mb_denom
        read_ue(br)?; // log2_max_mv_length_horizontal
        read_ue(br)?; // log2_max_mv_length_vertical
        vui.max_num_reorder_frames = Some(read_ue(br)?);
        vui.max_dec_frame_buffering = Some(read_ue(br)?);
    }

    Ok(vui)
}

/// 跳过 hrd_parameters (附录 E.1.2)
fn skip_hrd_parameters(br: &mut BitReader) -> LiuResult<()> {
    let cpb_cnt_minus1 = read_ue(br)?;
    if cpb_cnt_minus1 > 31 {
        return Err(LiuError::Malformed(format!(
            "H.264: cpb_cnt_minus1 超出范围, value={}",
            cpb_cnt_minus1
        )));
    }
    br.skip_bits(4)?; // bit_rate_scale
    br.skip_bits(4)?; // cpb_size_scale
    for _ in 0..=cpb_cnt_minus1 {
        read_ue(br)?; // bit_rate_value_minus1
        read_ue(br)?; // cpb_size_value_minus1
        br.skip_bits(1)?; // cbr_flag
    }
    // initial_cpb_removal_delay_length_minus1 / cpb_removal_delay_length_minus1
    // dpb_output_delay_length_minus1 / time_offset_length
    br.skip_bits(20)?;
    Ok(())
}
