//! 领域错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 镜像过程中的错误
///
/// 所有错误都直接上抛给调用方，本地不做任何重试；重新运行程序即可，
/// 进度日志保证从上次完成的位置继续。
#[derive(Debug, Error)]
pub enum MirrorError {
    /// 进度日志最后一行无法解析，可能是写入时被中断
    #[error("进度日志损坏 {path:?} 第 {line_no} 行: {line:?}")]
    CorruptLog {
        path: PathBuf,
        line_no: usize,
        line: String,
    },

    /// 清单文件格式错误或序号不连续
    #[error("清单格式错误 {path:?} 第 {line_no} 行: {reason}")]
    MalformedManifest {
        path: PathBuf,
        line_no: usize,
        reason: String,
    },

    /// 清单文件不存在
    #[error("清单文件不存在: {path:?}（请先运行列表阶段 --list）")]
    MissingManifest { path: PathBuf },

    /// 进度日志与清单内容不一致
    #[error("[{pass}] 进度日志与清单不一致: {reason}")]
    ManifestMisaligned { pass: String, reason: String },

    /// 对象键无法安全地写入行文件或映射到本地路径
    #[error("非法的对象键 {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// 条目动作（创建目录 / 下载）失败，该条目未被记录
    #[error("[{pass}] 条目 {index} ({key}) 处理失败: {source}")]
    Action {
        pass: String,
        index: u64,
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 远程列表失败
    #[error("列表 {prefix:?} 失败: {source}")]
    Listing {
        prefix: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type MirrorResult<T> = Result<T, MirrorError>;
