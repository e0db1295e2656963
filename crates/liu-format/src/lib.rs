//! # liu-format
//!
//! Liu 容器格式库, 负责 MPEG-2 系统层的封装与解封装.
//!
//! - PES: 包头编解码 (MPEG-2 与 MPEG-1)
//! - TS: 188 字节传输流, PAT/PMT, 按 PID 重组 PES
//! - PS: 节目流, pack/system header/PSM, 流式输入与缓存
//!
//! 所有引擎都是单线程的同步状态机, 输出通过回调交给调用方.

pub mod frame;
pub mod io;
pub mod pes;
pub mod ps;
pub mod ts;

// 重导出常用类型
pub use frame::{DemuxedFrame, FrameCallback};
pub use io::{IoBackend, IoContext, MemoryBackend};
pub use pes::PesPacket;
pub use ps::{PsDemuxer, PsMuxer, PsMuxerConfig, PsStreamType};
pub use ts::{TsDemuxer, TsMuxer, TsMuxerConfig, TsStreamType};
