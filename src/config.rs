//! 应用配置模块

use crate::error::{MirrorError, MirrorResult};
use crate::storage::{DEFAULT_CHUNK_SIZE, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// 默认配置文件名
pub const CONFIG_FILE_NAME: &str = "eeg-mirror.json";

/// 镜像配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    /// 本地镜像根目录
    #[serde(default)]
    pub local_dir: PathBuf,
    /// 清单和进度日志所在目录，未设置时使用 local_dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// 远程 bucket
    #[serde(default)]
    pub bucket: String,
    /// 远程前缀
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// 静态凭证，缺省时从环境变量 / profile 加载
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    /// 下载阶段排除的扩展名
    #[serde(default = "default_exclude_extensions")]
    pub exclude_extensions: Vec<String>,
    /// 下载阶段排除的 glob 模式
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// 续传前校验进度日志与清单是否一致
    #[serde(default = "default_verify_alignment")]
    pub verify_alignment: bool,
    /// 分块下载大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

fn default_prefix() -> String {
    "EEG/".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_exclude_extensions() -> Vec<String> {
    vec![".edf".to_string()]
}

fn default_verify_alignment() -> bool {
    true
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_op_timeout_secs() -> u64 {
    OP_TIMEOUT_SECS
}

fn default_io_timeout_secs() -> u64 {
    IO_TIMEOUT_SECS
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            local_dir: PathBuf::new(),
            state_dir: None,
            bucket: String::new(),
            prefix: default_prefix(),
            region: default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            exclude_extensions: default_exclude_extensions(),
            exclude_patterns: Vec::new(),
            verify_alignment: default_verify_alignment(),
            chunk_size: default_chunk_size(),
            op_timeout_secs: default_op_timeout_secs(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

impl MirrorConfig {
    /// 从配置文件加载，文件不存在时使用默认值
    pub fn load(config_file: &Path) -> MirrorResult<Self> {
        match fs::read_to_string(config_file) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                MirrorError::Config(format!("无法解析 {:?}: {}", config_file, e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// 保存配置，保留文件中的其他部分（如 log）
    pub fn save(&self, config_file: &Path) -> io::Result<()> {
        let mut config: serde_json::Value = if config_file.exists() {
            let content = fs::read_to_string(config_file)?;
            serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        let value = serde_json::to_value(self)?;
        if let (Some(target), serde_json::Value::Object(fields)) = (config.as_object_mut(), value)
        {
            target.extend(fields);
        }

        fs::write(config_file, serde_json::to_string_pretty(&config)?)
    }

    /// 检查必填项
    pub fn validate(&self) -> MirrorResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(MirrorError::Config("bucket 不能为空".to_string()));
        }
        if self.bucket.trim_start().starts_with("arn:") {
            return Err(MirrorError::Config(format!(
                "bucket 不支持 ARN ({})，请改用访问点别名（access point alias）作为 bucket",
                self.bucket
            )));
        }
        if self.local_dir.as_os_str().is_empty() {
            return Err(MirrorError::Config("localDir 不能为空".to_string()));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(MirrorError::Config(
                "accessKeyId 与 secretAccessKey 必须同时设置".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(MirrorError::Config("chunkSize 必须大于 0".to_string()));
        }
        Ok(())
    }

    /// 清单和进度日志所在目录
    pub fn state_dir(&self) -> &Path {
        self.state_dir.as_deref().unwrap_or(&self.local_dir)
    }
}
