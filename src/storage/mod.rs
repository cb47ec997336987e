pub mod local;
pub mod s3;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;

pub use local::LocalTree;
pub use s3::S3Store;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, list 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read 等
pub const IO_TIMEOUT_SECS: u64 = 300;
/// 分块下载大小（字节）
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// 对象键流，按存储返回的顺序惰性产生
pub type KeyStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// 远程对象存储接口
///
/// 列表只能从头重新开始，不支持中途续传；续传只发生在下游的处理阶段。
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 递归列出前缀下的所有对象键（包括以 `/` 结尾的目录标记）
    async fn list_keys(&self, prefix: &str) -> Result<KeyStream>;

    /// 下载单个对象到本地文件，返回写入的字节数
    async fn download(&self, key: &str, dest: &Path) -> Result<u64>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}
