//! HEVC VPS (Video Parameter Set) 解析, ITU-T H.265 §7.3.2.1.

use liu_core::bitreader::BitReader;
use liu_core::golomb::read_ue;
use liu_core::{LiuError, LiuResult};

use super::nal::nal_to_rbsp;
use super::ptl::{
    HrdCommonFlags, ProfileTierLevel, parse_profile_tier_level, skip_hrd_parameters,
};
use crate::parsers::h264::nal::strip_start_code;

/// VPS 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcVps {
    /// vps_video_parameter_set_id
    pub vps_id: u8,
    /// vps_max_layers_minus1
    pub max_layers_minus1: u8,
    /// vps_max_sub_layers_minus1
    pub max_sub_layers_minus1: u8,
    /// vps_temporal_id_nesting_flag
    pub temporal_id_nesting: bool,
    /// general profile/tier/level
    pub ptl: ProfileTierLevel,
    /// vps_max_layer_id
    pub max_layer_id: u8,
    /// vps_num_layer_sets_minus1
    pub num_layer_sets_minus1: u32,
    /// (num_units_in_tick, time_scale)
    pub timing: Option<(u32, u32)>,
    /// vps_num_hrd_parameters
    pub num_hrd_parameters: u32,
    /// vps_extension_flag
    pub extension: bool,
}

impl HevcVps {
    /// 从 VPS NAL 解析 (起始码可选)
    pub fn from_nal(nal: &[u8]) -> LiuResult<Self> {
        parse_hevc_vps(&nal_to_rbsp(nal, "HEVC VPS")?)
    }
}

/// 解析 VPS RBSP (不含 2 字节 NAL 头)
pub fn parse_hevc_vps(rbsp: &[u8]) -> LiuResult<HevcVps> {
    let mut br = BitReader::new(rbsp);

    let vps_id = br.read_bits(4)? as u8;
    br.skip_bits(2)?; // vps_base_layer_internal_flag, vps_base_layer_available_flag
    let max_layers_minus1 = br.read_bits(6)? as u8;
    let max_sub_layers_minus1 = br.read_bits(3)? as u8;
    if max_sub_layers_minus1 > 6 {
        return Err(LiuError::Malformed(format!(
            "HEVC: vps_max_sub_layers_minus1 超出范围, value={}",
            max_sub_layers_minus1
        )));
    }
    let temporal_id_nesting = br.read_flag()?;
    br.skip_bits(16)?; // vps_reserved_0xffff_16bits

    let ptl = parse_profile_tier_level(&mut br, max_sub_layers_minus1)?;

    let sub_layer_ordering_info_present = br.read_flag()?;
    let first = if sub_layer_ordering_info_present {
        0
    } else {
        max_sub_layers_minus1
    };
    for _ in first..=max_sub_layers_minus1 {
        read_ue(&mut br)?; // vps_max_dec_pic_buffering_minus1
        read_ue(&mut br)?; // vps_max_num_reorder_pics
        read_ue(&mut br)?; // vps_max_latency_increase_plus1
    }

    let max_layer_id = br.read_bits(6)? as u8;
    let num_layer_sets_minus1 = read_ue(&mut br)?;
    if num_layer_sets_minus1 > 1023 {
        return Err(LiuError::Malformed(format!(
            "HEVC: vps_num_layer_sets_minus1 超出范围, value={}",
            num_layer_sets_minus1
        )));
    }
    // layer_id_included_flag[i][j]
    let included_bits = num_layer_sets_minus1 as usize * (usize::from(max_layer_id) + 1);
    br.skip_bits(included_bits)?;

    let mut timing = None;
    let mut num_hrd_parameters = 0;
    if br.read_flag()? {
        let num_units_in_tick = br.read_bits(32)?;
        let time_scale = br.read_bits(32)?;
        timing = Some((num_units_in_tick, time_scale));
        if br.read_flag()? {
            read_ue(&mut br)?; // vps_num_ticks_poc_diff_one_minus1
        }
        num_hrd_parameters = read_ue(&mut br)?;
        if num_hrd_parameters > num_layer_sets_minus1 + 1 {
            return Err(LiuError::Malformed(format!(
                "HEVC: vps_num_hrd_parameters 超出范围, value={}",
                num_hrd_parameters
            )));
        }
        let mut common = HrdCommonFlags::default();
        for i in 0..num_hrd_parameters {
            read_ue(&mut br)?; // hrd_layer_set_idx
            // cprms_present_flag 为 0 时公共参数与上一个 hrd_parameters 相同
            let cprms_present = if i > 0 { br.read_flag()? } else { true };
            common = skip_hrd_parameters(
                &mut br,
                (!cprms_present).then_some(common),
                max_sub_layers_minus1,
            )?;
        }
    }
    let extension = br.read_flag()?;

    Ok(HevcVps {
        vps_id,
        max_layers_minus1,
        max_sub_layers_minus1,
        temporal_id_nesting,
        ptl,
        max_layer_id,
        num_layer_sets_minus1,
        timing,
        num_hrd_parameters,
        extension,
    })
}

/// 读取 VPS NAL 的 vps_id (起始码可选)
pub fn get_vps_id(nal: &[u8]) -> LiuResult<u8> {
    let nal = strip_start_code(nal);
    LiuError::check_len("HEVC VPS", nal, 3)?;
    Ok(nal[2] >> 4)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parsers::h264::nal::{START_CODE_4, add_emulation_prevention};
    use crate::parsers::h265::ptl::tests::write_ptl;
    use liu_core::bitwriter::BitWriter;
    use liu_core::golomb::write_ue;

    /// 构造 VPS NAL 的测试辅助
    pub(crate) struct VpsBuilder {
        pub vps_id: u8,
        pub max_sub_layers_minus1: u8,
        pub profile_idc: u8,
        pub tier: u8,
        pub level_idc: u8,
        pub timing: Option<(u32, u32)>,
        pub num_layer_sets_minus1: u32,
        /// 每个 hrd_parameters 的 cprms_present_flag (第一个总是 1)
        pub hrd: Vec<bool>,
        pub extension: bool,
    }

    impl Default for VpsBuilder {
        fn default() -> Self {
            Self {
                vps_id: 0,
                max_sub_layers_minus1: 0,
                profile_idc: 1,
                tier: 0,
                level_idc: 93,
                timing: None,
                num_layer_sets_minus1: 0,
                hrd: Vec::new(),
                extension: false,
            }
        }
    }

    impl VpsBuilder {
        pub(crate) fn rbsp(&self) -> Vec<u8> {
            let mut bw = BitWriter::new();
            bw.write_bits(u32::from(self.vps_id), 4);
            bw.write_bits(0b11, 2);
            bw.write_bits(0, 6);
            bw.write_bits(u32::from(self.max_sub_layers_minus1), 3);
            bw.write_bit(1);
            bw.write_bits(0xFFFF, 16);
            write_ptl(
                &mut bw,
                self.profile_idc,
                self.tier,
                self.level_idc,
                self.max_sub_layers_minus1,
            );
            bw.write_bit(1); // vps_sub_layer_ordering_info_present_flag
            for _ in 0..=self.max_sub_layers_minus1 {
                write_ue(&mut bw, 4);
                write_ue(&mut bw, 0);
                write_ue(&mut bw, 0);
            }
            bw.write_bits(0, 6); // vps_max_layer_id
            write_ue(&mut bw, self.num_layer_sets_minus1);
            for _ in 0..self.num_layer_sets_minus1 {
                bw.write_bit(1); // layer_id_included_flag
            }
            match self.timing {
                Some((units, scale)) => {
                    bw.write_bit(1);
                    bw.write_bits(units, 32);
                    bw.write_bits(scale, 32);
                    bw.write_bit(0);
                    write_ue(&mut bw, self.hrd.len() as u32);
                    for (i, &cprms_present) in self.hrd.iter().enumerate() {
                        write_ue(&mut bw, i as u32); // hrd_layer_set_idx
                        if i > 0 {
                            bw.write_flag(cprms_present);
                        }
                        self.write_hrd(&mut bw, i == 0 || cprms_present);
                    }
                }
                None => bw.write_bit(0),
            }
            bw.write_flag(self.extension);
            bw.write_bit(1); // rbsp_stop_one_bit
            bw.finish()
        }

        /// 只带 NAL HRD 的 hrd_parameters, 每个子层一个 CPB
        fn write_hrd(&self, bw: &mut BitWriter, common_inf_present: bool) {
            if common_inf_present {
                bw.write_bit(1); // nal_hrd_parameters_present_flag
                bw.write_bit(0); // vcl_hrd_parameters_present_flag
                bw.write_bit(0); // sub_pic_hrd_params_present_flag
                bw.write_bits(0, 8);
                bw.write_bits(0, 15);
            }
            for _ in 0..=self.max_sub_layers_minus1 {
                bw.write_bit(1); // fixed_pic_rate_general_flag
                write_ue(bw, 0); // elemental_duration_in_tc_minus1
                write_ue(bw, 0); // cpb_cnt_minus1
                write_ue(bw, 1000); // bit_rate_value_minus1
                write_ue(bw, 2000); // cpb_size_value_minus1
                bw.write_bit(1); // cbr_flag
            }
        }

        pub(crate) fn nal(&self) -> Vec<u8> {
            let mut nal = START_CODE_4.to_vec();
            nal.extend_from_slice(&[0x40, 0x01]);
            nal.extend_from_slice(&add_emulation_prevention(&self.rbsp()));
            nal
        }
    }

    #[test]
    fn test_parse_vps_basic() {
        let vps = HevcVps::from_nal(&VpsBuilder::default().nal()).unwrap();
        assert_eq!(vps.vps_id, 0);
        assert_eq!(vps.max_sub_layers_minus1, 0);
        assert!(vps.temporal_id_nesting);
        assert_eq!(vps.ptl.profile_idc, 1);
        assert_eq!(vps.ptl.level_idc, 93);
        assert!(vps.timing.is_none());
    }

    #[test]
    fn test_parse_vps_sub_layers_and_timing() {
        let builder = VpsBuilder {
            vps_id: 3,
            max_sub_layers_minus1: 2,
            timing: Some((1001, 60000)),
            ..VpsBuilder::default()
        };
        let vps = parse_hevc_vps(&builder.rbsp()).unwrap();
        assert_eq!(vps.vps_id, 3);
        assert_eq!(vps.max_sub_layers_minus1, 2);
        assert_eq!(vps.timing, Some((1001, 60000)));
        assert_eq!(get_vps_id(&builder.nal()).unwrap(), 3);
    }

    #[test]
    fn test_parse_vps_hrd_entries() {
        // 第二个 hrd_parameters 沿用第一个的公共参数, 仍然带有 NAL HRD 子层参数
        let builder = VpsBuilder {
            max_sub_layers_minus1: 1,
            timing: Some((1, 50)),
            num_layer_sets_minus1: 1,
            hrd: vec![true, false],
            extension: true,
            ..VpsBuilder::default()
        };
        let vps = parse_hevc_vps(&builder.rbsp()).unwrap();
        assert_eq!(vps.num_layer_sets_minus1, 1);
        assert_eq!(vps.num_hrd_parameters, 2);
        assert_eq!(vps.timing, Some((1, 50)));
        assert!(vps.extension);

        let vps = parse_hevc_vps(
            &VpsBuilder {
                extension: false,
                ..builder
            }
            .rbsp(),
        )
        .unwrap();
        assert!(!vps.extension);
    }

    #[test]
    fn test_parse_vps_hrd_with_common_info() {
        let builder = VpsBuilder {
            timing: Some((1001, 30000)),
            num_layer_sets_minus1: 1,
            hrd: vec![true, true],
            extension: true,
            ..VpsBuilder::default()
        };
        let vps = HevcVps::from_nal(&builder.nal()).unwrap();
        assert_eq!(vps.num_hrd_parameters, 2);
        assert!(vps.extension);

        let builder = VpsBuilder {
            extension: false,
            ..builder
        };
        assert!(!HevcVps::from_nal(&builder.nal()).unwrap().extension);
    }

    #[test]
    fn test_parse_vps_rejects_too_many_hrd() {
        let builder = VpsBuilder {
            timing: Some((1, 25)),
            hrd: vec![true, true],
            ..VpsBuilder::default()
        };
        assert!(matches!(
            parse_hevc_vps(&builder.rbsp()),
            Err(LiuError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_vps_rejects_sub_layers() {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 4);
        bw.write_bits(0b11, 2);
        bw.write_bits(0, 6);
        bw.write_bits(7, 3);
        bw.write_bits(0, 17);
        let data = bw.finish();
        assert!(matches!(
            parse_hevc_vps(&data),
            Err(LiuError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_vps_truncated() {
        let rbsp = VpsBuilder::default().rbsp();
        assert!(parse_hevc_vps(&rbsp[..8]).is_err());
        assert!(HevcVps::from_nal(&[0x40, 0x01]).is_err());
    }
}
