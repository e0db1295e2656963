//! H.265/HEVC 码流解析器.
//!
//! 提供:
//! - NAL 单元类型识别与关键帧判断
//! - VPS / SPS / PPS 解析
//! - HEVCDecoderConfigurationRecord 构建与增量更新

pub mod hvcc;
pub mod nal;
pub mod pps;
pub mod ptl;
pub mod sps;
pub mod vps;

pub use hvcc::{HevcDecoderConfig, HvccNalArray};
pub use nal::{
    H265_AUD_NAL, HevcNalUnit, HevcNalUnitType, has_aud, is_idr_frame, nal_type,
    nal_type_without_start_code, split_hevc_annex_b,
};
pub use pps::{HevcPps, get_hevc_pps_id, parse_hevc_pps};
pub use ptl::ProfileTierLevel;
pub use sps::{HevcSps, HevcVui, get_hevc_sps_id, parse_hevc_sps};
pub use vps::{HevcVps, get_vps_id, parse_hevc_vps};
