//! HEVC SPS (Sequence Parameter Set) 解析器.
//!
//! 按 ITU-T H.265 §7.3.2.2.1 顺序读取, 覆盖:
//! - profile_tier_level
//! - 分辨率与 conformance window 裁剪
//! - scaling_list_data / st_ref_pic_set / 长期参考帧
//! - VUI (附录 E.2.1), 包括 min_spatial_segmentation_idc
//!
//! 不需要的字段按语法跳过, 保证后续字段的游标位置正确.

use liu_core::bitreader::BitReader;
use liu_core::golomb::{read_se, read_ue};
use liu_core::{LiuError, LiuResult};

use super::nal::nal_to_rbsp;
use super::ptl::{ProfileTierLevel, parse_profile_tier_level, skip_hrd_parameters};
use crate::parsers::h264::sps::SAR_TABLE;

/// st_ref_pic_set 数量上限
const MAX_SHORT_TERM_REF_PIC_SETS: u32 = 64;
/// 单个 st_ref_pic_set 中前向/后向参考帧数量上限
const MAX_REF_PICS: u32 = 16;

/// HEVC SPS 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcSps {
    /// sps_video_parameter_set_id
    pub vps_id: u8,
    /// sps_max_sub_layers_minus1
    pub max_sub_layers_minus1: u8,
    /// sps_temporal_id_nesting_flag
    pub temporal_id_nesting: bool,
    /// general profile/tier/level
    pub ptl: ProfileTierLevel,
    /// sps_seq_parameter_set_id
    pub sps_id: u32,
    /// chroma_format_idc
    pub chroma_format_idc: u32,
    /// separate_colour_plane_flag
    pub separate_colour_plane: bool,
    /// pic_width_in_luma_samples
    pub pic_width_in_luma_samples: u32,
    /// pic_height_in_luma_samples
    pub pic_height_in_luma_samples: u32,
    /// conformance window (left, right, top, bottom), 色度单位
    pub conformance_window: Option<[u32; 4]>,
    /// bit_depth_luma_minus8
    pub bit_depth_luma_minus8: u32,
    /// bit_depth_chroma_minus8
    pub bit_depth_chroma_minus8: u32,
    /// log2_max_pic_order_cnt_lsb
    pub log2_max_poc_lsb: u32,
    /// num_short_term_ref_pic_sets
    pub num_short_term_ref_pic_sets: u32,
    /// long_term_ref_pics_present_flag
    pub long_term_ref_pics_present: bool,
    /// sps_temporal_mvp_enabled_flag
    pub temporal_mvp_enabled: bool,
    /// strong_intra_smoothing_enabled_flag
    pub strong_intra_smoothing: bool,
    /// conformance window 裁剪后的显示宽度
    pub display_width: u32,
    /// conformance window 裁剪后的显示高度
    pub display_height: u32,
    /// VUI 参数
    pub vui: Option<HevcVui>,
}

/// HEVC VUI 参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HevcVui {
    /// 像素宽高比 (sar_width, sar_height)
    pub sar: (u32, u32),
    /// video_full_range_flag
    pub full_range: bool,
    /// (colour_primaries, transfer_characteristics, matrix_coeffs)
    pub colour_description: Option<(u8, u8, u8)>,
    /// default display window (left, right, top, bottom)
    pub default_display_window: Option<[u32; 4]>,
    /// (vui_num_units_in_tick, vui_time_scale)
    pub timing: Option<(u32, u32)>,
    /// min_spatial_segmentation_idc, 仅 bitstream_restriction_flag=1 时出现
    pub min_spatial_segmentation_idc: Option<u32>,
}

impl HevcSps {
    /// 从 SPS NAL 解析 (起始码可选)
    pub fn from_nal(nal: &[u8]) -> LiuResult<Self> {
        parse_hevc_sps(&nal_to_rbsp(nal, "HEVC SPS")?)
    }

    /// 编码分辨率 (pic_width_in_luma_samples, pic_height_in_luma_samples)
    pub fn resolution(&self) -> (u32, u32) {
        (self.pic_width_in_luma_samples, self.pic_height_in_luma_samples)
    }

    /// 裁剪后的显示分辨率
    pub fn display_size(&self) -> (u32, u32) {
        (self.display_width, self.display_height)
    }

    /// 帧率 (分子, 分母), HEVC 的 time_scale/num_units_in_tick 即为帧率
    pub fn frame_rate(&self) -> Option<(u32, u32)> {
        self.vui.as_ref()?.timing.map(|(units, scale)| (scale, units))
    }
}

/// 解析 SPS RBSP (不含 2 字节 NAL 头)
pub fn parse_hevc_sps(rbsp: &[u8]) -> LiuResult<HevcSps> {
    let mut br = BitReader::new(rbsp);

    let vps_id = br.read_bits(4)? as u8;
    let max_sub_layers_minus1 = br.read_bits(3)? as u8;
    if max_sub_layers_minus1 > 6 {
        return Err(LiuError::Malformed(format!(
            "HEVC: sps_max_sub_layers_minus1 超出范围, value={}",
            max_sub_layers_minus1
        )));
    }
    let temporal_id_nesting = br.read_flag()?;
    let ptl = parse_profile_tier_level(&mut br, max_sub_layers_minus1)?;

    let sps_id = read_ue(&mut br)?;
    if sps_id > 15 {
        return Err(LiuError::Malformed(format!(
            "HEVC: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let chroma_format_idc = read_ue(&mut br)?;
    if chroma_format_idc > 3 {
        return Err(LiuError::Malformed(format!(
            "HEVC: chroma_format_idc 非法, value={}",
            chroma_format_idc
        )));
    }
    let separate_colour_plane = chroma_format_idc == 3 && br.read_flag()?;

    let pic_width_in_luma_samples = read_ue(&mut br)?;
    let pic_height_in_luma_samples = read_ue(&mut br)?;
    let conformance_window = if br.read_flag()? {
        Some([
            read_ue(&mut br)?,
            read_ue(&mut br)?,
            read_ue(&mut br)?,
            read_ue(&mut br)?,
        ])
    } else {
        None
    };

    let bit_depth_luma_minus8 = read_ue(&mut br)?;
    let bit_depth_chroma_minus8 = read_ue(&mut br)?;
    let log2_max_poc_lsb_minus4 = read_ue(&mut br)?;
    if log2_max_poc_lsb_minus4 > 12 {
        return Err(LiuError::Malformed(format!(
            "HEVC: log2_max_pic_order_cnt_lsb_minus4 超出范围, value={}",
            log2_max_poc_lsb_minus4
        )));
    }
    let log2_max_poc_lsb = log2_max_poc_lsb_minus4 + 4;

    let sub_layer_ordering_info_present = br.read_flag()?;
    let first = if sub_layer_ordering_info_present {
        0
    } else {
        max_sub_layers_minus1
    };
    for _ in first..=max_sub_layers_minus1 {
        read_ue(&mut br)?; // sps_max_dec_pic_buffering_minus1
        read_ue(&mut br)?; // sps_max_num_reorder_pics
        read_ue(&mut br)?; // sps_max_latency_increase_plus1
    }

    // log2_min_luma_coding_block_size_minus3 ... max_transform_hierarchy_depth_intra
    for _ in 0..6 {
        read_ue(&mut br)?;
    }

    // scaling_list_enabled_flag
    if br.read_flag()? {
        // sps_scaling_list_data_present_flag
        if br.read_flag()? {
            skip_scaling_list_data(&mut br)?;
        }
    }

    br.skip_bits(2)?; // amp_enabled_flag, sample_adaptive_offset_enabled_flag
    // pcm_enabled_flag
    if br.read_flag()? {
        br.skip_bits(8)?; // pcm_sample_bit_depth_luma/chroma_minus1
        read_ue(&mut br)?; // log2_min_pcm_luma_coding_block_size_minus3
        read_ue(&mut br)?; // log2_diff_max_min_pcm_luma_coding_block_size
        br.skip_bits(1)?; // pcm_loop_filter_disabled_flag
    }

    let num_short_term_ref_pic_sets = read_ue(&mut br)?;
    if num_short_term_ref_pic_sets > MAX_SHORT_TERM_REF_PIC_SETS {
        return Err(LiuError::Malformed(format!(
            "HEVC: num_short_term_ref_pic_sets 超出范围, value={}",
            num_short_term_ref_pic_sets
        )));
    }
    let mut num_delta_pocs = Vec::with_capacity(num_short_term_ref_pic_sets as usize);
    for idx in 0..num_short_term_ref_pic_sets as usize {
        let count = parse_st_ref_pic_set(&mut br, idx, &num_delta_pocs)?;
        num_delta_pocs.push(count);
    }

    let long_term_ref_pics_present = br.read_flag()?;
    if long_term_ref_pics_present {
        let num_long_term = read_ue(&mut br)?;
        if num_long_term > 32 {
            return Err(LiuError::Malformed(format!(
                "HEVC: num_long_term_ref_pics_sps 超出范围, value={}",
                num_long_term
            )));
        }
        // lt_ref_pic_poc_lsb_sps(v) + used_by_curr_pic_lt_sps_flag
        br.skip_bits(num_long_term as usize * (log2_max_poc_lsb as usize + 1))?;
    }

    let temporal_mvp_enabled = br.read_flag()?;
    let strong_intra_smoothing = br.read_flag()?;
    let vui = if br.read_flag()? {
        Some(parse_vui(&mut br, max_sub_layers_minus1)?)
    } else {
        None
    };

    let (display_width, display_height) = cropped_size(
        pic_width_in_luma_samples,
        pic_height_in_luma_samples,
        chroma_format_idc,
        separate_colour_plane,
        conformance_window,
    );

    Ok(HevcSps {
        vps_id,
        max_sub_layers_minus1,
        temporal_id_nesting,
        ptl,
        sps_id,
        chroma_format_idc,
        separate_colour_plane,
        pic_width_in_luma_samples,
        pic_height_in_luma_samples,
        conformance_window,
        bit_depth_luma_minus8,
        bit_depth_chroma_minus8,
        log2_max_poc_lsb,
        num_short_term_ref_pic_sets,
        long_term_ref_pics_present,
        temporal_mvp_enabled,
        strong_intra_smoothing,
        display_width,
        display_height,
        vui,
    })
}

/// 读取 SPS NAL 的 sps_id (起始码可选)
pub fn get_hevc_sps_id(nal: &[u8]) -> LiuResult<u32> {
    let rbsp = nal_to_rbsp(nal, "HEVC SPS")?;
    let mut br = BitReader::new(&rbsp);
    br.skip_bits(4)?;
    let max_sub_layers_minus1 = br.read_bits(3)? as u8;
    br.skip_bits(1)?;
    parse_profile_tier_level(&mut br, max_sub_layers_minus1)?;
    read_ue(&mut br)
}

/// conformance window 以色度采样为单位, 换算为亮度像素后裁剪
fn cropped_size(
    width: u32,
    height: u32,
    chroma_format_idc: u32,
    separate_colour_plane: bool,
    window: Option<[u32; 4]>,
) -> (u32, u32) {
    let Some([left, right, top, bottom]) = window else {
        return (width, height);
    };
    let (sub_width, sub_height) = match (chroma_format_idc, separate_colour_plane) {
        (1, _) => (2, 2),
        (2, _) => (2, 1),
        _ => (1, 1),
    };
    let crop_w = left.saturating_add(right).saturating_mul(sub_width);
    let crop_h = top.saturating_add(bottom).saturating_mul(sub_height);
    (width.saturating_sub(crop_w), height.saturating_sub(crop_h))
}

/// 跳过 scaling_list_data() (§7.3.4)
fn skip_scaling_list_data(br: &mut BitReader) -> LiuResult<()> {
    for size_id in 0..4u32 {
        let step = if size_id == 3 { 3 } else { 1 };
        for _ in (0..6).step_by(step) {
            // scaling_list_pred_mode_flag
            if !br.read_flag()? {
                read_ue(br)?; // scaling_list_pred_matrix_id_delta
                continue;
            }
            let coef_num = 64u32.min(1u32 << (4 + (size_id << 1)));
            if size_id > 1 {
                read_se(br)?; // scaling_list_dc_coef_minus8
            }
            for _ in 0..coef_num {
                read_se(br)?; // scaling_list_delta_coef
            }
        }
    }
    Ok(())
}

/// 解析 st_ref_pic_set(idx) (§7.3.7), 返回 NumDeltaPocs[idx]
fn parse_st_ref_pic_set(
    br: &mut BitReader,
    idx: usize,
    num_delta_pocs: &[u32],
) -> LiuResult<u32> {
    let inter_ref_pic_set_prediction = idx != 0 && br.read_flag()?;

    if inter_ref_pic_set_prediction {
        // SPS 中 delta_idx_minus1 不出现, 参考集为前一个
        let ref_count = num_delta_pocs.get(idx - 1).copied().unwrap_or(0);
        br.skip_bits(1)?; // delta_rps_sign
        read_ue(br)?; // abs_delta_rps_minus1
        let mut count = 0;
        for _ in 0..=ref_count {
            let used_by_curr_pic = br.read_flag()?;
            let use_delta = used_by_curr_pic || br.read_flag()?;
            if use_delta {
                count += 1;
            }
        }
        return Ok(count);
    }

    let num_negative = read_ue(br)?;
    let num_positive = read_ue(br)?;
    if num_negative > MAX_REF_PICS || num_positive > MAX_REF_PICS {
        return Err(LiuError::Malformed(format!(
            "HEVC: st_ref_pic_set 参考帧数量超出范围, negative={}, positive={}",
            num_negative, num_positive
        )));
    }
    for _ in 0..num_negative + num_positive {
        read_ue(br)?; // delta_poc_sX_minus1
        br.skip_bits(1)?; // used_by_curr_pic_sX_flag
    }
    Ok(num_negative + num_positive)
}

/// 解析 VUI 参数 (附录 E.2.1)
fn parse_vui(br: &mut BitReader, max_sub_layers_minus1: u8) -> LiuResult<HevcVui> {
    let mut vui = HevcVui {
        sar: (0, 1),
        ..HevcVui::default()
    };

    // aspect_ratio_info_present_flag
    if br.read_flag()? {
        let ar_idc = br.read_bits(8)? as usize;
        if ar_idc == 255 {
            vui.sar = (br.read_bits(16)?, br.read_bits(16)?);
        } else if let Some(&sar) = SAR_TABLE.get(ar_idc) {
            vui.sar = sar;
        } else {
            return Err(LiuError::Malformed(format!(
                "HEVC: VUI aspect_ratio_idc 非法, value={}",
                ar_idc
            )));
        }
    }

    // overscan_info_present_flag
    if br.read_flag()? {
        br.skip_bits(1)?;
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
        read_ue(br)?;
        read_ue(br)?;
    }

    // neutral_chroma_indication_flag, field_seq_flag, frame_field_info_present_flag
    br.skip_bits(3)?;

    if br.read_flag()? {
        vui.default_display_window = Some([
            read_ue(br)?,
            read_ue(br)?,
            read_ue(br)?,
            read_ue(br)?,
        ]);
    }

    // vui_timing_info_present_flag
    if br.read_flag()? {
        let num_units_in_tick = br.read_bits(32)?;
        let time_scale = br.read_bits(32)?;
        vui.timing = Some((num_units_in_tick, time_scale));
        if br.read_flag()? {
            read_ue(br)?; // vui_num_ticks_poc_diff_one_minus1
        }
        if br.read_flag()? {
            skip_hrd_parameters(br, None, max_sub_layers_minus1)?;
        }
    }

    // bitstream_restriction_flag
    if br.read_flag()? {
        // tiles_fixed_structure, motion_vectors_over_pic_boundaries, restricted_ref_pic_lists
        br.skip_bits(3)?;
        let min_spatial = read_ue(br)?;
        if min_spatial > 4095 {
            return Err(LiuError::Malformed(format!(
                "HEVC: min_spatial_segmentation_idc 超出范围, value={}",
                min_spatial
            )));
        }
        vui.min_spatial_segmentation_idc = Some(min_spatial);
        for _ in 0..4 {
            read_ue(br)?;
        }
    }

    Ok(vui)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parsers::h264::nal::{START_CODE_4, add_emulation_prevention};
    use crate::parsers::h265::ptl::tests::write_ptl;
    use liu_core::bitwriter::BitWriter;
    use liu_core::golomb::{write_se, write_ue};

    /// 构造 HEVC SPS 的测试辅助
    pub(crate) struct HevcSpsBuilder {
        pub sps_id: u32,
        pub max_sub_layers_minus1: u8,
        pub profile_idc: u8,
        pub tier: u8,
        pub level_idc: u8,
        pub chroma_format_idc: u32,
        pub width: u32,
        pub height: u32,
        pub conformance: Option<[u32; 4]>,
        pub bit_depth_luma_minus8: u32,
        pub scaling_list: bool,
        pub timing: Option<(u32, u32)>,
        pub min_spatial_segmentation_idc: Option<u32>,
    }

    impl Default for HevcSpsBuilder {
        fn default() -> Self {
            Self {
                sps_id: 0,
                max_sub_layers_minus1: 0,
                profile_idc: 1,
                tier: 0,
                level_idc: 93,
                chroma_format_idc: 1,
                width: 1280,
                height: 720,
                conformance: None,
                bit_depth_luma_minus8: 0,
                scaling_list: false,
                timing: None,
                min_spatial_segmentation_idc: None,
            }
        }
    }

    impl HevcSpsBuilder {
        pub(crate) fn rbsp(&self) -> Vec<u8> {
            let mut bw = BitWriter::new();
            bw.write_bits(0, 4); // sps_video_parameter_set_id
            bw.write_bits(u32::from(self.max_sub_layers_minus1), 3);
            bw.write_bit(1);
            write_ptl(
                &mut bw,
                self.profile_idc,
                self.tier,
                self.level_idc,
                self.max_sub_layers_minus1,
            );
            write_ue(&mut bw, self.sps_id);
            write_ue(&mut bw, self.chroma_format_idc);
            if self.chroma_format_idc == 3 {
                bw.write_bit(0);
            }
            write_ue(&mut bw, self.width);
            write_ue(&mut bw, self.height);
            match self.conformance {
                Some(window) => {
                    bw.write_bit(1);
                    for v in window {
                        write_ue(&mut bw, v);
                    }
                }
                None => bw.write_bit(0),
            }
            write_ue(&mut bw, self.bit_depth_luma_minus8);
            write_ue(&mut bw, self.bit_depth_luma_minus8);
            write_ue(&mut bw, 4); // log2_max_pic_order_cnt_lsb_minus4
            bw.write_bit(1); // sps_sub_layer_ordering_info_present_flag
            for _ in 0..=self.max_sub_layers_minus1 {
                write_ue(&mut bw, 4);
                write_ue(&mut bw, 2);
                write_ue(&mut bw, 0);
            }
            for v in [0, 3, 0, 3, 1, 1] {
                write_ue(&mut bw, v);
            }
            if self.scaling_list {
                bw.write_bit(1);
                bw.write_bit(1);
                write_scaling_list_data(&mut bw);
            } else {
                bw.write_bit(0);
            }
            bw.write_bit(0); // amp_enabled_flag
            bw.write_bit(1); // sample_adaptive_offset_enabled_flag
            bw.write_bit(0); // pcm_enabled_flag

            // 两个短期参考集, 第二个使用帧间预测
            write_ue(&mut bw, 2);
            write_ue(&mut bw, 2); // num_negative_pics
            write_ue(&mut bw, 0); // num_positive_pics
            for _ in 0..2 {
                write_ue(&mut bw, 0);
                bw.write_bit(1);
            }
            bw.write_bit(1); // inter_ref_pic_set_prediction_flag
            bw.write_bit(0); // delta_rps_sign
            write_ue(&mut bw, 0); // abs_delta_rps_minus1
            // NumDeltaPocs[0] = 2, 需要 3 组标志
            bw.write_bit(1);
            bw.write_bit(0);
            bw.write_bit(1);
            bw.write_bit(1);

            bw.write_bit(1); // long_term_ref_pics_present_flag
            write_ue(&mut bw, 1);
            bw.write_bits(5, 8); // lt_ref_pic_poc_lsb_sps
            bw.write_bit(1);

            bw.write_bit(1); // sps_temporal_mvp_enabled_flag
            bw.write_bit(1); // strong_intra_smoothing_enabled_flag

            if self.timing.is_some() || self.min_spatial_segmentation_idc.is_some() {
                bw.write_bit(1);
                self.write_vui(&mut bw);
            } else {
                bw.write_bit(0);
            }
            bw.write_bit(0); // sps_extension_present_flag
            bw.write_bit(1); // rbsp_stop_one_bit
            bw.finish()
        }

        fn write_vui(&self, bw: &mut BitWriter) {
            bw.write_bit(1); // aspect_ratio_info_present_flag
            bw.write_bits(1, 8);
            bw.write_bit(0); // overscan_info_present_flag
            bw.write_bit(1); // video_signal_type_present_flag
            bw.write_bits(5, 3);
            bw.write_bit(0);
            bw.write_bit(1);
            bw.write_bits(1, 8);
            bw.write_bits(1, 8);
            bw.write_bits(1, 8);
            bw.write_bit(0); // chroma_loc_info_present_flag
            bw.write_bits(0, 3);
            bw.write_bit(0); // default_display_window_flag
            match self.timing {
                Some((units, scale)) => {
                    bw.write_bit(1);
                    bw.write_bits(units, 32);
                    bw.write_bits(scale, 32);
                    bw.write_bit(0);
                    bw.write_bit(0);
                }
                None => bw.write_bit(0),
            }
            match self.min_spatial_segmentation_idc {
                Some(idc) => {
                    bw.write_bit(1);
                    bw.write_bits(0, 3);
                    write_ue(bw, idc);
                    write_ue(bw, 2);
                    write_ue(bw, 1);
                    write_ue(bw, 15);
                    write_ue(bw, 15);
                }
                None => bw.write_bit(0),
            }
        }

        pub(crate) fn nal(&self) -> Vec<u8> {
            let mut nal = START_CODE_4.to_vec();
            nal.extend_from_slice(&[0x42, 0x01]);
            nal.extend_from_slice(&add_emulation_prevention(&self.rbsp()));
            nal
        }
    }

    fn write_scaling_list_data(bw: &mut BitWriter) {
        for size_id in 0..4u32 {
            let step = if size_id == 3 { 3 } else { 1 };
            for matrix_id in (0..6).step_by(step) {
                if matrix_id % 2 == 0 {
                    bw.write_bit(1);
                    let coef_num = 64u32.min(1u32 << (4 + (size_id << 1)));
                    if size_id > 1 {
                        write_se(bw, 8);
                    }
                    for _ in 0..coef_num {
                        write_se(bw, 1);
                    }
                } else {
                    bw.write_bit(0);
                    write_ue(bw, 0);
                }
            }
        }
    }

    #[test]
    fn test_parse_hevc_sps_720p() {
        let sps = HevcSps::from_nal(&HevcSpsBuilder::default().nal()).unwrap();
        assert_eq!(sps.resolution(), (1280, 720));
        assert_eq!(sps.chroma_format_idc, 1);
        assert_eq!(sps.ptl.profile_idc, 1);
        assert_eq!(sps.ptl.level_idc, 93);
        assert_eq!(sps.log2_max_poc_lsb, 8);
        assert_eq!(sps.num_short_term_ref_pic_sets, 2);
        assert!(sps.long_term_ref_pics_present);
        assert!(sps.temporal_mvp_enabled);
        assert!(sps.strong_intra_smoothing);
        assert!(sps.vui.is_none());
    }

    #[test]
    fn test_parse_hevc_sps_1080p_conformance_window() {
        let builder = HevcSpsBuilder {
            width: 1920,
            height: 1088,
            conformance: Some([0, 0, 0, 4]),
            ..HevcSpsBuilder::default()
        };
        let sps = parse_hevc_sps(&builder.rbsp()).unwrap();
        assert_eq!(sps.resolution(), (1920, 1088));
        assert_eq!(sps.display_size(), (1920, 1080));
    }

    #[test]
    fn test_parse_hevc_sps_scaling_list_and_vui() {
        let builder = HevcSpsBuilder {
            sps_id: 2,
            max_sub_layers_minus1: 1,
            bit_depth_luma_minus8: 2,
            scaling_list: true,
            timing: Some((1, 25)),
            min_spatial_segmentation_idc: Some(200),
            ..HevcSpsBuilder::default()
        };
        let sps = HevcSps::from_nal(&builder.nal()).unwrap();
        assert_eq!(sps.sps_id, 2);
        assert_eq!(sps.max_sub_layers_minus1, 1);
        assert_eq!(sps.bit_depth_luma_minus8, 2);
        let vui = sps.vui.as_ref().expect("应包含 VUI");
        assert_eq!(vui.sar, (1, 1));
        assert_eq!(vui.colour_description, Some((1, 1, 1)));
        assert_eq!(vui.min_spatial_segmentation_idc, Some(200));
        assert_eq!(sps.frame_rate(), Some((25, 1)));
        assert_eq!(get_hevc_sps_id(&builder.nal()).unwrap(), 2);
    }

    #[test]
    fn test_parse_hevc_sps_rejects_out_of_range() {
        let builder = HevcSpsBuilder {
            sps_id: 16,
            ..HevcSpsBuilder::default()
        };
        assert!(matches!(
            parse_hevc_sps(&builder.rbsp()),
            Err(LiuError::Malformed(_))
        ));

        let builder = HevcSpsBuilder {
            min_spatial_segmentation_idc: Some(5000),
            ..HevcSpsBuilder::default()
        };
        assert!(matches!(
            parse_hevc_sps(&builder.rbsp()),
            Err(LiuError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_hevc_sps_truncated() {
        let rbsp = HevcSpsBuilder::default().rbsp();
        let result = parse_hevc_sps(&rbsp[..rbsp.len() / 2]);
        assert!(matches!(result, Err(LiuError::OutOfRange(_))));
        assert!(matches!(
            HevcSps::from_nal(&[0x42, 0x01]),
            Err(LiuError::TooShort { .. })
        ));
    }
}
