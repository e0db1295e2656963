//! AVCDecoderConfigurationRecord (ISO/IEC 14496-15 §5.3.3.1).
//!
//! ```text
//! configurationVersion(8) = 1
//! AVCProfileIndication(8) profile_compatibility(8) AVCLevelIndication(8)
//! reserved(6) = '111111' lengthSizeMinusOne(2)
//! reserved(3) = '111'    numOfSequenceParameterSets(5)
//!   { sequenceParameterSetLength(16) sequenceParameterSetNALUnit }
//! numOfPictureParameterSets(8)
//!   { pictureParameterSetLength(16) pictureParameterSetNALUnit }
//! if profile_idc in (100, 110, 122, 144):
//!   reserved(6) chroma_format(2)
//!   reserved(5) bit_depth_luma_minus8(3)
//!   reserved(5) bit_depth_chroma_minus8(3)
//!   numOfSequenceParameterSetExt(8) { ... }
//! ```

use std::io::Write;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use liu_core::{LiuError, LiuResult};
use log::debug;

use super::nal::{NalUnitType, START_CODE_4, for_each_nal, nal_type, strip_start_code};
use super::pps::get_pps_id;
use super::sps::{Sps, get_sps_id};

/// AVCC 扩展字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvcHighProfileExt {
    /// chroma_format_idc
    pub chroma_format: u8,
    /// bit_depth_luma_minus8
    pub bit_depth_luma_minus8: u8,
    /// bit_depth_chroma_minus8
    pub bit_depth_chroma_minus8: u8,
    /// SPS 扩展 NAL 列表
    pub sps_ext: Vec<Vec<u8>>,
}

/// AVCDecoderConfigurationRecord
///
/// NAL 以不含起始码的形式保存, 同一组内 id 唯一.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfig {
    /// configurationVersion
    pub version: u8,
    /// AVCProfileIndication
    pub profile_idc: u8,
    /// profile_compatibility
    pub profile_compatibility: u8,
    /// AVCLevelIndication
    pub level_idc: u8,
    /// lengthSizeMinusOne
    pub length_size_minus_one: u8,
    /// SPS 列表
    pub sps: Vec<Vec<u8>>,
    /// PPS 列表
    pub pps: Vec<Vec<u8>>,
    /// High profile 扩展字段
    pub high_profile_ext: Option<AvcHighProfileExt>,
}

impl Default for AvcDecoderConfig {
    fn default() -> Self {
        Self {
            version: 1,
            profile_idc: 0,
            profile_compatibility: 0,
            level_idc: 0,
            length_size_minus_one: 3,
            sps: Vec::new(),
            pps: Vec::new(),
            high_profile_ext: None,
        }
    }
}

/// 带 AVCC 扩展字段的 profile
fn has_high_profile_ext(profile_idc: u8) -> bool {
    matches!(profile_idc, 100 | 110 | 122 | 144)
}

impl AvcDecoderConfig {
    /// 创建空记录
    pub fn new() -> Self {
        Self::default()
    }

    /// NAL 长度前缀字节数
    pub fn length_size(&self) -> usize {
        usize::from(self.length_size_minus_one) + 1
    }

    /// 从关键帧 (Annex B) 中收集 SPS/PPS 构建记录
    pub fn from_annex_b(data: &[u8]) -> LiuResult<Self> {
        let mut config = Self::new();
        let mut result = Ok(());
        for_each_nal(data, |nal| {
            let step = match nal_type(nal) {
                NalUnitType::Sps => config.update_sps(nal).map(|_| ()),
                NalUnitType::Pps => config.update_pps(nal).map(|_| ()),
                _ => Ok(()),
            };
            if let Err(e) = step {
                result = Err(e);
                return false;
            }
            true
        });
        result?;
        if config.sps.is_empty() {
            return Err(LiuError::Malformed("H.264: 数据中没有 SPS".into()));
        }
        Ok(config)
    }

    /// 加入或替换 SPS (按 sps_id), 返回记录是否发生变化
    ///
    /// 字节完全相同的 SPS 重复加入不会改变记录.
    pub fn update_sps(&mut self, nal: &[u8]) -> LiuResult<bool> {
        let nal = strip_start_code(nal);
        let sps = Sps::from_nal(nal)?;
        let id = sps.sps_id;

        match self
            .sps
            .iter()
            .position(|s| get_sps_id(s).is_ok_and(|sid| sid == id))
        {
            Some(idx) if self.sps[idx] == nal => return Ok(false),
            Some(idx) => {
                debug!("AVCC: 替换 SPS, sps_id={}", id);
                self.sps[idx] = nal.to_vec();
            }
            None => {
                debug!("AVCC: 加入 SPS, sps_id={}, {}x{}", id, sps.width, sps.height);
                self.sps.push(nal.to_vec());
            }
        }

        self.refresh_summary()?;
        Ok(true)
    }

    /// 加入或替换 PPS (按 pps_id), 返回记录是否发生变化
    pub fn update_pps(&mut self, nal: &[u8]) -> LiuResult<bool> {
        let nal = strip_start_code(nal);
        let id = get_pps_id(nal)?;

        match self
            .pps
            .iter()
            .position(|p| get_pps_id(p).is_ok_and(|pid| pid == id))
        {
            Some(idx) if self.pps[idx] == nal => Ok(false),
            Some(idx) => {
                debug!("AVCC: 替换 PPS, pps_id={}", id);
                self.pps[idx] = nal.to_vec();
                Ok(true)
            }
            None => {
                debug!("AVCC: 加入 PPS, pps_id={}", id);
                self.pps.push(nal.to_vec());
                Ok(true)
            }
        }
    }

    /// 以第一个 SPS 刷新 profile/level 与扩展字段
    fn refresh_summary(&mut self) -> LiuResult<()> {
        let Some(first) = self.sps.first() else {
            return Ok(());
        };
        let sps = Sps::from_nal(first)?;
        self.profile_idc = first[1];
        self.profile_compatibility = first[2];
        self.level_idc = first[3];
        self.high_profile_ext = if has_high_profile_ext(sps.profile_idc) {
            Some(AvcHighProfileExt {
                chroma_format: (sps.chroma_format_idc & 0x03) as u8,
                bit_depth_luma_minus8: (sps.bit_depth_luma_minus8 & 0x07) as u8,
                bit_depth_chroma_minus8: (sps.bit_depth_chroma_minus8 & 0x07) as u8,
                sps_ext: Vec::new(),
            })
        } else {
            None
        };
        Ok(())
    }

    /// 编码为 avcC 字节
    pub fn encode(&self) -> LiuResult<Vec<u8>> {
        if self.sps.is_empty() {
            return Err(LiuError::InvalidArgument(
                "H.264: 构建 avcC 需要至少一个 SPS".into(),
            ));
        }
        if self.sps.len() > 31 {
            return Err(LiuError::InvalidArgument(format!(
                "H.264: SPS 数量超出 avcC 上限, count={}",
                self.sps.len()
            )));
        }

        let mut out = Vec::with_capacity(64);
        out.write_all(&[
            self.version,
            self.profile_idc,
            self.profile_compatibility,
            self.level_idc,
            0xFC | (self.length_size_minus_one & 0x03),
            0xE0 | self.sps.len() as u8,
        ])?;
        write_nal_list(&mut out, &self.sps)?;
        out.write_u8(self.pps.len() as u8)?;
        write_nal_list(&mut out, &self.pps)?;

        if has_high_profile_ext(self.profile_idc) {
            let ext = self.high_profile_ext.clone().unwrap_or_default();
            out.write_all(&[
                0xFC | (ext.chroma_format & 0x03),
                0xF8 | (ext.bit_depth_luma_minus8 & 0x07),
                0xF8 | (ext.bit_depth_chroma_minus8 & 0x07),
                ext.sps_ext.len() as u8,
            ])?;
            write_nal_list(&mut out, &ext.sps_ext)?;
        }
        Ok(out)
    }

    /// 从 avcC 字节解码
    pub fn decode(data: &[u8]) -> LiuResult<Self> {
        LiuError::check_len("avcC", data, 7)?;

        let mut config = Self {
            version: data[0],
            profile_idc: data[1],
            profile_compatibility: data[2],
            level_idc: data[3],
            length_size_minus_one: data[4] & 0x03,
            ..Self::default()
        };

        let mut pos = 6;
        config.sps = read_nal_list(data, &mut pos, usize::from(data[5] & 0x1F), "SPS")?;

        let Some(&num_pps) = data.get(pos) else {
            return Err(LiuError::Malformed(
                "H.264: avcC 缺少 numOfPictureParameterSets 字段".into(),
            ));
        };
        pos += 1;
        config.pps = read_nal_list(data, &mut pos, usize::from(num_pps), "PPS")?;

        if has_high_profile_ext(config.profile_idc) && data.len() >= pos + 4 {
            let num_ext = usize::from(data[pos + 3]);
            let mut ext = AvcHighProfileExt {
                chroma_format: data[pos] & 0x03,
                bit_depth_luma_minus8: data[pos + 1] & 0x07,
                bit_depth_chroma_minus8: data[pos + 2] & 0x07,
                sps_ext: Vec::new(),
            };
            pos += 4;
            ext.sps_ext = read_nal_list(data, &mut pos, num_ext, "SPSExt")?;
            config.high_profile_ext = Some(ext);
        }

        Ok(config)
    }

    /// 输出带 4 字节起始码的 SPS 与 PPS
    pub fn to_annex_b(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for nal in self.sps.iter().chain(self.pps.iter()) {
            out.extend_from_slice(&START_CODE_4);
            out.extend_from_slice(nal);
        }
        out
    }

    /// 解析第一个 SPS
    pub fn first_sps(&self) -> LiuResult<Sps> {
        let first = self
            .sps
            .first()
            .ok_or_else(|| LiuError::InvalidArgument("H.264: avcC 中没有 SPS".into()))?;
        Sps::from_nal(first)
    }
}

fn write_nal_list(out: &mut Vec<u8>, list: &[Vec<u8>]) -> LiuResult<()> {
    for nal in list {
        let len = u16::try_from(nal.len()).map_err(|_| {
            LiuError::InvalidArgument(format!("H.264: NAL 长度超出 16 位, len={}", nal.len()))
        })?;
        out.write_u16::<BigEndian>(len)?;
        out.write_all(nal)?;
    }
    Ok(())
}

fn read_nal_list(
    data: &[u8],
    pos: &mut usize,
    count: usize,
    what: &str,
) -> LiuResult<Vec<Vec<u8>>> {
    let mut list = Vec::with_capacity(count);
    for i in 0..count {
        if *pos + 2 > data.len() {
            return Err(LiuError::Malformed(format!(
                "H.264: avcC {} 长度字段截断, index={}",
                what, i
            )));
        }
        let len = usize::from(BigEndian::read_u16(&data[*pos..]));
        *pos += 2;
        if len == 0 || *pos + len > data.len() {
            return Err(LiuError::Malformed(format!(
                "H.264: avcC {} 数据截断, index={}, declared_len={}, remain={}",
                what,
                i,
                len,
                data.len().saturating_sub(*pos)
            )));
        }
        list.push(data[*pos..*pos + len].to_vec());
        *pos += len;
    }
    Ok(list)
}
