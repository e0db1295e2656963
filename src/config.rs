//! 运行配置.
//!
//! ```json
//! {
//!   "logging": { "level": "debug", "directory": "logs" },
//!   "ts": { "psi_interval_ms": 200 },
//!   "ps": { "mux_rate": 8000 }
//! }
//! ```
//!
//! 缺省的字段取各自的默认值.

use std::path::Path;

use anyhow::{Context, Result};
use liu_format::{PsMuxerConfig, TsMuxerConfig};
use serde::Deserialize;

use crate::logging::LoggingConfig;

/// 顶层配置
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LiuConfig {
    /// 日志级别与输出目录, 交给 [`crate::logging::init`]
    pub logging: LoggingConfig,
    /// TS 封装器配置, 用于 `TsMuxer::with_config`
    pub ts: TsMuxerConfig,
    /// PS 封装器配置, 用于 `PsMuxer::with_config`
    pub ps: PsMuxerConfig,
}

impl LiuConfig {
    /// 从 JSON 文本解析
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("解析配置失败")
    }

    /// 读取并解析 JSON 配置文件
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("配置文件无效, path={}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = LiuConfig::from_json_str("{}").unwrap();
        assert_eq!(config, LiuConfig::default());
        assert_eq!(config.ts.pmt_pid, 0x200);
        assert_eq!(config.ps.mux_rate, 6106);
        assert_eq!(config.logging.directory, None);
    }

    #[test]
    fn test_partial_override() {
        let config = LiuConfig::from_json_str(
            r#"{"logging":{"level":"debug","directory":"logs"},"ts":{"psi_interval_ms":200}}"#,
        )
        .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.directory.as_deref(), Some("logs"));
        assert_eq!(config.logging.file_prefix, "liu");
        assert_eq!(config.ts.psi_interval_ms, 200);
        assert!(config.ts.insert_aud);
        assert_eq!(config.ps.rate_bound, 26234);
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(LiuConfig::from_json_str("{\"ts\": 3}").is_err());
    }
}
