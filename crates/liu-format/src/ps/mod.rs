//! MPEG-2 节目流 (PS).
//!
//! - [`packet`]: pack header, system header, PSM 等记录
//! - [`muxer`]: 帧 -> pack
//! - [`demuxer`]: 字节流 -> 帧

pub mod demuxer;
pub mod muxer;
pub mod packet;

pub use demuxer::{PsDemuxer, PsRecord, RecordCallback};
pub use muxer::{PackCallback, PsMuxer, PsMuxerConfig};
pub use packet::{
    PackHeader, ProgramStreamMap, PsRecordKind, PsStreamType, SkippedRecord, SystemHeader,
    classify,
};
