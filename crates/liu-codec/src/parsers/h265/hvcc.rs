//! HEVCDecoderConfigurationRecord (ISO/IEC 14496-15 §8.3.3.1).
//!
//! ```text
//! configurationVersion(8)
//! general_profile_space(2) general_tier_flag(1) general_profile_idc(5)
//! general_profile_compatibility_flags(32)
//! general_constraint_indicator_flags(48)
//! general_level_idc(8)
//! '1111' min_spatial_segmentation_idc(12)
//! '111111' parallelismType(2)
//! '111111' chromaFormat(2)
//! '11111' bitDepthLumaMinus8(3)
//! '11111' bitDepthChromaMinus8(3)
//! avgFrameRate(16)
//! constantFrameRate(2) numTemporalLayers(3) temporalIdNested(1) lengthSizeMinusOne(2)
//! numOfArrays(8)
//!   { array_completeness(1) '0' NAL_unit_type(6) numNalus(16)
//!     { nalUnitLength(16) nalUnit } }
//! ```
//!
//! 摘要字段由全部已登记的参数集重新计算, 参数集按 VPS/SPS/PPS 顺序分组保存.

use byteorder::{BigEndian, ByteOrder};
use liu_core::bitreader::BitReader;
use liu_core::bitwriter::BitWriter;
use liu_core::{LiuError, LiuResult};
use log::debug;

use super::nal::{HevcNalUnitType, nal_type};
use super::pps::{HevcPps, get_hevc_pps_id};
use super::ptl::ProfileTierLevel;
use super::sps::{HevcSps, get_hevc_sps_id};
use super::vps::{HevcVps, get_vps_id};
use crate::parsers::h264::nal::{START_CODE_4, for_each_nal, strip_start_code};

/// min_spatial_segmentation_idc 的合法上限
const MAX_SPATIAL_SEGMENTATION: u32 = 4096;
/// hvcC 固定头部长度
const HVCC_HEADER_LEN: usize = 23;

/// 同一类型的 NAL 数组
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HvccNalArray {
    /// array_completeness
    pub array_completeness: bool,
    /// NAL_unit_type
    pub nal_type: HevcNalUnitType,
    /// NAL 列表 (不含起始码)
    pub nalus: Vec<Vec<u8>>,
}

/// HEVCDecoderConfigurationRecord
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcDecoderConfig {
    /// configurationVersion
    pub version: u8,
    /// general profile/tier/level 摘要
    pub ptl: ProfileTierLevel,
    /// min_spatial_segmentation_idc, 4097 表示尚未从 VUI 得到
    pub min_spatial_segmentation_idc: u32,
    /// parallelismType
    pub parallelism_type: u8,
    /// chromaFormat
    pub chroma_format_idc: u8,
    /// bitDepthLumaMinus8
    pub bit_depth_luma_minus8: u8,
    /// bitDepthChromaMinus8
    pub bit_depth_chroma_minus8: u8,
    /// avgFrameRate (帧/256 秒), 0 表示未指定
    pub avg_frame_rate: u16,
    /// constantFrameRate
    pub constant_frame_rate: u8,
    /// numTemporalLayers
    pub num_temporal_layers: u8,
    /// temporalIdNested
    pub temporal_id_nested: bool,
    /// lengthSizeMinusOne
    pub length_size_minus_one: u8,
    /// NAL 数组
    pub arrays: Vec<HvccNalArray>,
}

impl Default for HevcDecoderConfig {
    fn default() -> Self {
        Self {
            version: 1,
            ptl: ProfileTierLevel::default(),
            min_spatial_segmentation_idc: MAX_SPATIAL_SEGMENTATION + 1,
            parallelism_type: 0,
            chroma_format_idc: 0,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            avg_frame_rate: 0,
            constant_frame_rate: 0,
            num_temporal_layers: 0,
            temporal_id_nested: false,
            length_size_minus_one: 3,
            arrays: Vec::new(),
        }
    }
}

/// 参数集数组的排列顺序
fn array_rank(nal_type: HevcNalUnitType) -> u8 {
    match nal_type {
        HevcNalUnitType::Vps => 0,
        HevcNalUnitType::Sps => 1,
        HevcNalUnitType::Pps => 2,
        _ => 3,
    }
}

impl HevcDecoderConfig {
    /// 创建空记录
    pub fn new() -> Self {
        Self::default()
    }

    /// NAL 长度前缀字节数
    pub fn length_size(&self) -> usize {
        usize::from(self.length_size_minus_one) + 1
    }

    /// 从关键帧 (Annex B) 中收集 VPS/SPS/PPS 构建记录
    pub fn from_annex_b(data: &[u8]) -> LiuResult<Self> {
        let mut config = Self::new();
        let mut result = Ok(());
        for_each_nal(data, |nal| {
            let step = match nal_type(nal) {
                HevcNalUnitType::Vps => config.update_vps(nal),
                HevcNalUnitType::Sps => config.update_sps(nal),
                HevcNalUnitType::Pps => config.update_pps(nal),
                _ => Ok(false),
            };
            if let Err(e) = step {
                result = Err(e);
                return false;
            }
            true
        });
        result?;
        if config.nalus(HevcNalUnitType::Sps).is_empty() {
            return Err(LiuError::Malformed("HEVC: 数据中没有 SPS".into()));
        }
        Ok(config)
    }

    /// 指定类型的 NAL 列表
    pub fn nalus(&self, nal_type: HevcNalUnitType) -> &[Vec<u8>] {
        self.arrays
            .iter()
            .find(|a| a.nal_type == nal_type)
            .map_or(&[], |a| a.nalus.as_slice())
    }

    /// 加入或替换 VPS (按 vps_id), 返回记录是否发生变化
    pub fn update_vps(&mut self, nal: &[u8]) -> LiuResult<bool> {
        let nal = strip_start_code(nal);
        HevcVps::from_nal(nal)?;
        let id = u32::from(get_vps_id(nal)?);
        self.upsert(HevcNalUnitType::Vps, nal, id, |n| {
            get_vps_id(n).map(u32::from)
        })
    }

    /// 加入或替换 SPS (按 sps_id), 返回记录是否发生变化
    pub fn update_sps(&mut self, nal: &[u8]) -> LiuResult<bool> {
        let nal = strip_start_code(nal);
        let id = HevcSps::from_nal(nal)?.sps_id;
        self.upsert(HevcNalUnitType::Sps, nal, id, get_hevc_sps_id)
    }

    /// 加入或替换 PPS (按 pps_id), 返回记录是否发生变化
    pub fn update_pps(&mut self, nal: &[u8]) -> LiuResult<bool> {
        let nal = strip_start_code(nal);
        let id = HevcPps::from_nal(nal)?.pps_id;
        self.upsert(HevcNalUnitType::Pps, nal, id, get_hevc_pps_id)
    }

    fn upsert(
        &mut self,
        nal_type: HevcNalUnitType,
        nal: &[u8],
        id: u32,
        id_of: impl Fn(&[u8]) -> LiuResult<u32>,
    ) -> LiuResult<bool> {
        let array_idx = match self.arrays.iter().position(|a| a.nal_type == nal_type) {
            Some(idx) => idx,
            None => {
                let idx = self
                    .arrays
                    .iter()
                    .position(|a| array_rank(a.nal_type) > array_rank(nal_type))
                    .unwrap_or(self.arrays.len());
                self.arrays.insert(
                    idx,
                    HvccNalArray {
                        array_completeness: true,
                        nal_type,
                        nalus: Vec::new(),
                    },
                );
                idx
            }
        };

        let nalus = &mut self.arrays[array_idx].nalus;
        match nalus
            .iter()
            .position(|n| id_of(n).is_ok_and(|nid| nid == id))
        {
            Some(idx) if nalus[idx] == nal => return Ok(false),
            Some(idx) => {
                debug!("HVCC: 替换 {:?}, id={}", nal_type, id);
                nalus[idx] = nal.to_vec();
            }
            None => {
                debug!("HVCC: 加入 {:?}, id={}", nal_type, id);
                nalus.push(nal.to_vec());
            }
        }

        self.refresh_summary()?;
        Ok(true)
    }

    /// 由全部参数集重新计算摘要字段
    fn refresh_summary(&mut self) -> LiuResult<()> {
        let mut ptl = ProfileTierLevel::default();
        let mut min_spatial = MAX_SPATIAL_SEGMENTATION + 1;
        let mut num_temporal_layers = 0u8;
        let mut temporal_id_nested = false;
        let mut chroma = self.chroma_format_idc;
        let mut luma_depth = self.bit_depth_luma_minus8;
        let mut chroma_depth = self.bit_depth_chroma_minus8;
        let mut parallelism = 0u8;

        for nal in self.nalus(HevcNalUnitType::Vps) {
            let vps = HevcVps::from_nal(nal)?;
            num_temporal_layers = num_temporal_layers.max(vps.max_sub_layers_minus1 + 1);
            ptl.merge(&vps.ptl);
        }

        for nal in self.nalus(HevcNalUnitType::Sps) {
            let sps = HevcSps::from_nal(nal)?;
            num_temporal_layers = num_temporal_layers.max(sps.max_sub_layers_minus1 + 1);
            temporal_id_nested = sps.temporal_id_nesting;
            chroma = (sps.chroma_format_idc & 0x03) as u8;
            luma_depth = (sps.bit_depth_luma_minus8 & 0x07) as u8;
            chroma_depth = (sps.bit_depth_chroma_minus8 & 0x07) as u8;
            ptl.merge(&sps.ptl);
            if let Some(idc) = sps.vui.as_ref().and_then(|v| v.min_spatial_segmentation_idc) {
                min_spatial = min_spatial.min(idc);
            }
        }

        for nal in self.nalus(HevcNalUnitType::Pps) {
            let pps = HevcPps::from_nal(nal)?;
            parallelism = match (pps.entropy_coding_sync_enabled, pps.tiles_enabled) {
                (true, true) => 0,
                (true, false) => 3,
                (false, true) => 2,
                (false, false) => 1,
            };
        }

        self.ptl = ptl;
        self.min_spatial_segmentation_idc = min_spatial;
        self.num_temporal_layers = num_temporal_layers;
        self.temporal_id_nested = temporal_id_nested;
        self.chroma_format_idc = chroma;
        self.bit_depth_luma_minus8 = luma_depth;
        self.bit_depth_chroma_minus8 = chroma_depth;
        self.parallelism_type = parallelism;
        Ok(())
    }

    /// 编码为 hvcC 字节
    ///
    /// min_spatial_segmentation_idc 超过 4095 时写 0, 此时 parallelismType 也写 0.
    pub fn encode(&self) -> LiuResult<Vec<u8>> {
        let min_spatial = if self.min_spatial_segmentation_idc > MAX_SPATIAL_SEGMENTATION - 1 {
            0
        } else {
            self.min_spatial_segmentation_idc
        };
        let parallelism = if min_spatial == 0 {
            0
        } else {
            self.parallelism_type
        };
        let num_arrays = u8::try_from(self.arrays.len()).map_err(|_| {
            LiuError::InvalidArgument(format!(
                "HEVC: NAL 数组数量超出 hvcC 上限, count={}",
                self.arrays.len()
            ))
        })?;

        let mut bw = BitWriter::with_capacity(HVCC_HEADER_LEN + 128);
        bw.write_bits(u32::from(self.version), 8);
        bw.write_bits(u32::from(self.ptl.profile_space), 2);
        bw.write_bits(u32::from(self.ptl.tier_flag), 1);
        bw.write_bits(u32::from(self.ptl.profile_idc), 5);
        bw.write_bits(self.ptl.profile_compatibility_flags, 32);
        bw.write_bits_u64(self.ptl.constraint_indicator_flags, 48);
        bw.write_bits(u32::from(self.ptl.level_idc), 8);
        bw.write_bits(0xF, 4);
        bw.write_bits(min_spatial, 12);
        bw.write_bits(0x3F, 6);
        bw.write_bits(u32::from(parallelism), 2);
        bw.write_bits(0x3F, 6);
        bw.write_bits(u32::from(self.chroma_format_idc), 2);
        bw.write_bits(0x1F, 5);
        bw.write_bits(u32::from(self.bit_depth_luma_minus8), 3);
        bw.write_bits(0x1F, 5);
        bw.write_bits(u32::from(self.bit_depth_chroma_minus8), 3);
        bw.write_bits(u32::from(self.avg_frame_rate), 16);
        bw.write_bits(u32::from(self.constant_frame_rate), 2);
        bw.write_bits(u32::from(self.num_temporal_layers), 3);
        bw.write_flag(self.temporal_id_nested);
        bw.write_bits(u32::from(self.length_size_minus_one), 2);
        bw.write_bits(u32::from(num_arrays), 8);

        for array in &self.arrays {
            bw.write_flag(array.array_completeness);
            bw.write_bit(0);
            bw.write_bits(u32::from(array.nal_type.type_id()), 6);
            let count = u16::try_from(array.nalus.len()).map_err(|_| {
                LiuError::InvalidArgument(format!(
                    "HEVC: NAL 数量超出 16 位, count={}",
                    array.nalus.len()
                ))
            })?;
            bw.write_bits(u32::from(count), 16);
            for nal in &array.nalus {
                let len = u16::try_from(nal.len()).map_err(|_| {
                    LiuError::InvalidArgument(format!(
                        "HEVC: NAL 长度超出 16 位, len={}",
                        nal.len()
                    ))
                })?;
                bw.write_bits(u32::from(len), 16);
                bw.write_bytes(nal)?;
            }
        }
        Ok(bw.finish())
    }

    /// 从 hvcC 字节解码
    pub fn decode(data: &[u8]) -> LiuResult<Self> {
        LiuError::check_len("hvcC", data, HVCC_HEADER_LEN)?;
        let mut br = BitReader::new(data);

        let mut config = Self {
            version: br.read_bits(8)? as u8,
            ..Self::default()
        };
        config.ptl = ProfileTierLevel {
            profile_space: br.read_bits(2)? as u8,
            tier_flag: br.read_bits(1)? as u8,
            profile_idc: br.read_bits(5)? as u8,
            profile_compatibility_flags: br.read_bits(32)?,
            constraint_indicator_flags: br.read_bits_u64(48)?,
            level_idc: br.read_bits(8)? as u8,
        };
        br.skip_bits(4)?;
        config.min_spatial_segmentation_idc = br.read_bits(12)?;
        br.skip_bits(6)?;
        config.parallelism_type = br.read_bits(2)? as u8;
        br.skip_bits(6)?;
        config.chroma_format_idc = br.read_bits(2)? as u8;
        br.skip_bits(5)?;
        config.bit_depth_luma_minus8 = br.read_bits(3)? as u8;
        br.skip_bits(5)?;
        config.bit_depth_chroma_minus8 = br.read_bits(3)? as u8;
        config.avg_frame_rate = br.read_bits(16)? as u16;
        config.constant_frame_rate = br.read_bits(2)? as u8;
        config.num_temporal_layers = br.read_bits(3)? as u8;
        config.temporal_id_nested = br.read_flag()?;
        config.length_size_minus_one = br.read_bits(2)? as u8;
        let num_arrays = br.read_bits(8)?;

        let mut pos = HVCC_HEADER_LEN;
        for i in 0..num_arrays {
            if pos + 3 > data.len() {
                return Err(LiuError::Malformed(format!(
                    "HEVC: hvcC NAL 数组头截断, index={}",
                    i
                )));
            }
            let array_completeness = data[pos] & 0x80 != 0;
            let nal_type = HevcNalUnitType::from_type_id(data[pos] & 0x3F);
            let count = usize::from(BigEndian::read_u16(&data[pos + 1..]));
            pos += 3;

            let mut nalus = Vec::with_capacity(count);
            for j in 0..count {
                if pos + 2 > data.len() {
                    return Err(LiuError::Malformed(format!(
                        "HEVC: hvcC NAL 长度字段截断, array={}, index={}",
                        i, j
                    )));
                }
                let len = usize::from(BigEndian::read_u16(&data[pos..]));
                pos += 2;
                if pos + len > data.len() {
                    return Err(LiuError::Malformed(format!(
                        "HEVC: hvcC NAL 数据截断, array={}, index={}, declared_len={}, remain={}",
                        i,
                        j,
                        len,
                        data.len() - pos
                    )));
                }
                nalus.push(data[pos..pos + len].to_vec());
                pos += len;
            }
            config.arrays.push(HvccNalArray {
                array_completeness,
                nal_type,
                nalus,
            });
        }

        Ok(config)
    }

    /// 按数组顺序输出带 4 字节起始码的全部 NAL
    pub fn to_annex_b(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for nal in self.arrays.iter().flat_map(|a| a.nalus.iter()) {
            out.extend_from_slice(&START_CODE_4);
            out.extend_from_slice(nal);
        }
        out
    }

    /// 解析第一个 SPS
    pub fn first_sps(&self) -> LiuResult<HevcSps> {
        let first = self
            .nalus(HevcNalUnitType::Sps)
            .first()
            .ok_or_else(|| LiuError::InvalidArgument("HEVC: hvcC 中没有 SPS".into()))?;
        HevcSps::from_nal(first)
    }
}
