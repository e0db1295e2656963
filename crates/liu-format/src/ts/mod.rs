//! MPEG-2 传输流 (TS).
//!
//! - [`packet`]: 188 字节包头与自适应字段
//! - [`psi`]: PAT/PMT 段
//! - [`muxer`]: 帧 -> TS 包
//! - [`demuxer`]: TS 包 -> 帧

pub mod demuxer;
pub mod muxer;
pub mod packet;
pub mod psi;

pub use demuxer::{TableCallback, TsDemuxer, TsTable};
pub use muxer::{PacketCallback, TsMuxer, TsMuxerConfig, TsStreamType};
pub use packet::{AdaptationField, AdaptationFlags, TS_PACKET_SIZE, TsHeader, TsPacket};
pub use psi::{Pat, PatProgram, Pmt, PmtStream};
