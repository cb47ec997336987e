//! 远程对象列表 - 生成目录清单与文件清单

use super::manifest::ManifestWriter;
use crate::error::{MirrorError, MirrorResult};
use crate::storage::RemoteStore;
use futures::TryStreamExt;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 列表结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSummary {
    pub directories: u64,
    pub files: u64,
}

/// 远程列表器
///
/// 每次运行都会删除并重建两份清单，列表本身不支持续传。
pub struct Lister {
    store: Arc<dyn RemoteStore>,
    prefix: String,
}

impl Lister {
    pub fn new(store: Arc<dyn RemoteStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// 以 `/` 结尾的键视为目录标记
    pub fn is_directory_key(key: &str) -> bool {
        key.ends_with('/')
    }

    /// 列出前缀下所有对象，写入目录清单和文件清单
    pub async fn list_into(
        &self,
        dir_manifest: &Path,
        file_manifest: &Path,
    ) -> MirrorResult<ListingSummary> {
        info!("开始列表: {}, prefix: {:?}", self.store.name(), self.prefix);

        let mut dirs = ManifestWriter::create(dir_manifest)?;
        let mut files = ManifestWriter::create(file_manifest)?;

        let mut keys = self
            .store
            .list_keys(&self.prefix)
            .await
            .map_err(|e| listing_error(&self.prefix, e))?;

        while let Some(key) = keys
            .try_next()
            .await
            .map_err(|e| listing_error(&self.prefix, e))?
        {
            // 跳过根目录
            if key.is_empty() || key == "/" {
                continue;
            }

            if Self::is_directory_key(&key) {
                let index = dirs.append(&key)?;
                debug!("目录 {}: {}", index, key);
            } else {
                let index = files.append(&key)?;
                debug!("文件 {}: {}", index, key);
            }
        }

        let summary = ListingSummary {
            directories: dirs.finish()?,
            files: files.finish()?,
        };

        info!(
            "列表完成: {} 个目录, {} 个文件",
            summary.directories, summary.files
        );

        Ok(summary)
    }
}

fn listing_error(prefix: &str, e: anyhow::Error) -> MirrorError {
    MirrorError::Listing {
        prefix: prefix.to_string(),
        source: e.into(),
    }
}
