//! HEVC profile_tier_level() 与 hrd_parameters() 语法 (ITU-T H.265 §7.3.3, §E.2.2).
//!
//! VPS、SPS 与 VUI 共用这两段语法.

use liu_core::bitreader::BitReader;
use liu_core::golomb::read_ue;
use liu_core::{LiuError, LiuResult};

/// general profile/tier/level 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileTierLevel {
    /// general_profile_space (2 bits)
    pub profile_space: u8,
    /// general_tier_flag
    pub tier_flag: u8,
    /// general_profile_idc (1=Main, 2=Main10, 3=MainStillPicture)
    pub profile_idc: u8,
    /// general_profile_compatibility_flags (32 bits)
    pub profile_compatibility_flags: u32,
    /// general_constraint_indicator_flags (48 bits)
    pub constraint_indicator_flags: u64,
    /// general_level_idc (level × 30)
    pub level_idc: u8,
}

impl Default for ProfileTierLevel {
    fn default() -> Self {
        Self {
            profile_space: 0,
            tier_flag: 0,
            profile_idc: 0,
            profile_compatibility_flags: 0xFFFF_FFFF,
            constraint_indicator_flags: 0xFFFF_FFFF_FFFF,
            level_idc: 0,
        }
    }
}

impl ProfileTierLevel {
    /// 把另一个参数集的 PTL 合并进来
    ///
    /// tier 取较大值; tier 升级时 level 直接采用新值, 否则取较大者.
    /// 兼容标志与约束标志按位与.
    pub fn merge(&mut self, other: &ProfileTierLevel) {
        self.profile_space = other.profile_space;
        if self.tier_flag < other.tier_flag {
            self.level_idc = other.level_idc;
        } else {
            self.level_idc = self.level_idc.max(other.level_idc);
        }
        self.tier_flag = self.tier_flag.max(other.tier_flag);
        self.profile_idc = self.profile_idc.max(other.profile_idc);
        self.profile_compatibility_flags &= other.profile_compatibility_flags;
        self.constraint_indicator_flags &= other.constraint_indicator_flags;
    }
}

/// 解析 profile_tier_level(profilePresentFlag=1, maxNumSubLayersMinus1)
///
/// 子层的 profile/level 信息只做跳过.
pub fn parse_profile_tier_level(
    br: &mut BitReader,
    max_sub_layers_minus1: u8,
) -> LiuResult<ProfileTierLevel> {
    let ptl = ProfileTierLevel {
        profile_space: br.read_bits(2)? as u8,
        tier_flag: br.read_bits(1)? as u8,
        profile_idc: br.read_bits(5)? as u8,
        profile_compatibility_flags: br.read_bits(32)?,
        constraint_indicator_flags: br.read_bits_u64(48)?,
        level_idc: br.read_bits(8)? as u8,
    };

    let sub_layers = usize::from(max_sub_layers_minus1);
    let mut profile_present = [false; 8];
    let mut level_present = [false; 8];
    for i in 0..sub_layers {
        profile_present[i] = br.read_flag()?;
        level_present[i] = br.read_flag()?;
    }
    if sub_layers > 0 {
        // reserved_zero_2bits
        br.skip_bits(2 * (8 - sub_layers))?;
    }
    for i in 0..sub_layers {
        if profile_present[i] {
            br.skip_bits(88)?;
        }
        if level_present[i] {
            br.skip_bits(8)?;
        }
    }

    Ok(ptl)
}

/// hrd_parameters 中各子层共用的标志
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HrdCommonFlags {
    /// nal_hrd_parameters_present_flag
    pub nal_hrd: bool,
    /// vcl_hrd_parameters_present_flag
    pub vcl_hrd: bool,
    /// sub_pic_hrd_params_present_flag
    pub sub_pic_hrd: bool,
}

/// 跳过 hrd_parameters(commonInfPresentFlag, maxNumSubLayersMinus1)
///
/// `inherited` 为 `None` 时从码流读取公共参数, 否则直接使用给定的公共标志
/// (VPS 中 cprms_present_flag 为 0 的 hrd_parameters). 返回本结构生效的公共标志.
pub fn skip_hrd_parameters(
    br: &mut BitReader,
    inherited: Option<HrdCommonFlags>,
    max_sub_layers_minus1: u8,
) -> LiuResult<HrdCommonFlags> {
    let common = match inherited {
        Some(flags) => flags,
        None => read_hrd_common(br)?,
    };
    let HrdCommonFlags {
        nal_hrd,
        vcl_hrd,
        sub_pic_hrd,
    } = common;

    for _ in 0..=max_sub_layers_minus1 {
        let fixed_pic_rate_general = br.read_flag()?;
        let fixed_pic_rate_within_cvs = if fixed_pic_rate_general {
            true
        } else {
            br.read_flag()?
        };

        let mut low_delay = false;
        if fixed_pic_rate_within_cvs {
            read_ue(br)?; // elemental_duration_in_tc_minus1
        } else {
            low_delay = br.read_flag()?;
        }

        let mut cpb_cnt_minus1 = 0;
        if !low_delay {
            cpb_cnt_minus1 = read_ue(br)?;
            if cpb_cnt_minus1 > 31 {
                return Err(LiuError::Malformed(format!(
                    "HEVC: cpb_cnt_minus1 超出范围, cpb_cnt_minus1={}",
                    cpb_cnt_minus1
                )));
            }
        }

        for present in [nal_hrd, vcl_hrd] {
            if present {
                skip_sub_layer_hrd(br, cpb_cnt_minus1, sub_pic_hrd)?;
            }
        }
    }
    Ok(common)
}

fn read_hrd_common(br: &mut BitReader) -> LiuResult<HrdCommonFlags> {
    let mut flags = HrdCommonFlags {
        nal_hrd: br.read_flag()?,
        vcl_hrd: br.read_flag()?,
        sub_pic_hrd: false,
    };
    if flags.nal_hrd || flags.vcl_hrd {
        flags.sub_pic_hrd = br.read_flag()?;
        if flags.sub_pic_hrd {
            // tick_divisor(8) du_cpb_removal_delay_increment_length(5)
            // sub_pic_cpb_params_in_pic_timing_sei(1) dpb_output_delay_du_length(5)
            br.skip_bits(19)?;
        }
        // bit_rate_scale(4) cpb_size_scale(4)
        br.skip_bits(8)?;
        if flags.sub_pic_hrd {
            br.skip_bits(4)?;
        }
        // initial_cpb_removal_delay_length(5) au_cpb_removal_delay_length(5)
        // dpb_output_delay_length(5)
        br.skip_bits(15)?;
    }
    Ok(flags)
}

fn skip_sub_layer_hrd(
    br: &mut BitReader,
    cpb_cnt_minus1: u32,
    sub_pic_hrd: bool,
) -> LiuResult<()> {
    for _ in 0..=cpb_cnt_minus1 {
        read_ue(br)?; // bit_rate_value_minus1
        read_ue(br)?; // cpb_size_value_minus1
        if sub_pic_hrd {
            read_ue(br)?; // cpb_size_du_value_minus1
            read_ue(br)?; // bit_rate_du_value_minus1
        }
        br.skip_bits(1)?; // cbr_flag
    }
    Ok(())
}
