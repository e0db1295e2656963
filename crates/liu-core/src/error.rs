//! 错误类型定义.
//!
//! 所有码流解析与封装/解封装操作共用一套错误分类:
//! - `NeedMore`: 数据不足, 调用方追加数据后重试
//! - `Malformed`: 字段违反结构约束 (长度不一致、CRC 错误、计数越界等)
//! - `OutOfRange`: 读游标越过缓冲区末尾
//! - `UnknownStreamId`: 向未注册的 PID/stream id 写入

use thiserror::Error;

/// Liu 错误类型
#[derive(Debug, Error)]
pub enum LiuError {
    /// 缓冲数据不足, 需要追加更多字节后重试
    #[error("需要更多数据")]
    NeedMore,

    /// 字段值违反结构约束
    #[error("数据格式错误: {0}")]
    Malformed(String),

    /// 读写位置越界
    #[error("越界访问: {0}")]
    OutOfRange(String),

    /// 未注册的流标识
    #[error("未找到流: id={0:#x}")]
    UnknownStreamId(u16),

    /// 输入长度不足以开始解析
    #[error("{what} 数据太短: 至少需要 {need} 字节, 实际 {got} 字节")]
    TooShort {
        what: &'static str,
        need: usize,
        got: usize,
    },

    /// 在非字节边界上执行字节操作
    #[error("未按字节对齐: {0}")]
    Misaligned(String),

    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作或格式
    #[error("不支持: {0}")]
    Unsupported(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 流结束
    #[error("已到达流末尾")]
    Eof,
}

impl LiuError {
    /// 是否为可通过追加数据恢复的错误
    pub fn is_need_more(&self) -> bool {
        matches!(self, Self::NeedMore)
    }

    /// 检查最少字节数, 不足时返回 `TooShort`
    pub fn check_len(what: &'static str, data: &[u8], need: usize) -> LiuResult<()> {
        if data.len() < need {
            return Err(Self::TooShort {
                what,
                need,
                got: data.len(),
            });
        }
        Ok(())
    }
}

/// Liu 结果类型别名
pub type LiuResult<T> = Result<T, LiuError>;
