//! I/O 抽象层.
//!
//! 为解封装器提供统一的字节流读取接口, 后端可以是文件或内存缓冲区.
//! 封装器的输出走回调, 不经过这里.

use std::io::{self, Read};
use std::path::Path;

use liu_core::{LiuError, LiuResult};

/// I/O 上下文
///
/// 在后端之上维护一个读缓冲区, TS 解封装器按 188 字节定长读取,
/// PS 解封装器按任意大小分块读取.
pub struct IoContext {
    /// 内部 I/O 实现
    inner: Box<dyn IoBackend>,
    /// 读缓冲区
    buffer: Vec<u8>,
    /// 缓冲区中的有效数据长度
    buf_len: usize,
    /// 缓冲区当前读取位置
    buf_pos: usize,
}

/// I/O 后端 trait
pub trait IoBackend: Send {
    /// 读取数据到缓冲区, 返回 0 表示到达末尾
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// 默认缓冲区大小 (32 KB)
const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

impl IoContext {
    /// 从 I/O 后端创建上下文
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        Self {
            inner: backend,
            buffer: vec![0u8; DEFAULT_BUFFER_SIZE],
            buf_len: 0,
            buf_pos: 0,
        }
    }

    /// 从内存数据创建上下文
    pub fn from_memory(data: Vec<u8>) -> Self {
        Self::new(Box::new(MemoryBackend::from_data(data)))
    }

    /// 打开文件读取
    pub fn open_read(path: impl AsRef<Path>) -> LiuResult<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(Box::new(FileBackend { file })))
    }

    /// 读取恰好 `buf.len()` 个字节
    ///
    /// 数据在读满之前耗尽时返回 `Eof`, 已读出的部分被丢弃.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> LiuResult<()> {
        let mut total_read = 0;
        while total_read < buf.len() {
            let n = self.read_available(&mut buf[total_read..])?;
            if n == 0 {
                return Err(LiuError::Eof);
            }
            total_read += n;
        }
        Ok(())
    }

    /// 读取至多 `buf.len()` 个字节, 返回实际读取数, 0 表示到达末尾
    pub fn read_available(&mut self, buf: &mut [u8]) -> LiuResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.buf_pos == self.buf_len {
            self.buf_pos = 0;
            self.buf_len = self.inner.read(&mut self.buffer)?;
            if self.buf_len == 0 {
                return Ok(0);
            }
        }
        let to_copy = (self.buf_len - self.buf_pos).min(buf.len());
        buf[..to_copy].copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + to_copy]);
        self.buf_pos += to_copy;
        Ok(to_copy)
    }
}

/// 文件 I/O 后端
struct FileBackend {
    file: std::fs::File,
}

impl IoBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// 内存缓冲区 I/O 后端
pub struct MemoryBackend {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryBackend {
    /// 从已有数据创建
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }
}
