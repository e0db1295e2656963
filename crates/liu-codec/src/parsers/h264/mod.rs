//! H.264/AVC 码流解析器.
//!
//! 提供对 H.264 Annex B 和 AVCC 格式码流的解析能力:
//! - NAL 单元分割与类型识别
//! - SPS / PPS / SEI 解析
//! - AVCDecoderConfigurationRecord 构建与增量更新
//! - Annex B ↔ AVCC 格式转换

pub mod avcc;
pub mod nal;
pub mod pps;
pub mod sei;
pub mod sps;

pub use avcc::{AvcDecoderConfig, AvcHighProfileExt};
pub use nal::{
    H264_AUD_NAL, NalUnit, NalUnitType, START_CODE_3, START_CODE_4, add_emulation_prevention,
    annex_b_to_avcc, avcc_to_annex_b, find_start_code, for_each_nal, has_aud, is_idr_frame, nal_type,
    nal_type_without_start_code, remove_emulation_prevention, split_annex_b, split_avcc,
    split_length_prefixed, strip_start_code, try_split_length_prefixed,
};
pub use pps::{Pps, get_pps_id, parse_pps};
pub use sei::{SeiMessage, SeiPayload, parse_sei_rbsp};
pub use sps::{Sps, Vui, get_sps_id, parse_sps};
