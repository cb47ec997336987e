//! 可续传的清单处理循环
//!
//! 按清单顺序逐条执行动作，每条完成后写入进度日志。已完成或被过滤的条目
//! 在下次运行时都不会再处理；动作失败时该条目不记录，下次从它重新开始。

use super::manifest::{Manifest, ManifestEntry};
use super::record::SKIP_ANNOTATION;
use super::tracker::Tracker;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::storage::{LocalTree, RemoteStore};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 对象键过滤器，返回 false 的条目被跳过
pub trait KeyFilter: Send + Sync {
    fn accept(&self, key: &str) -> bool;
}

impl<F> KeyFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn accept(&self, key: &str) -> bool {
        self(key)
    }
}

/// 按扩展名和 glob 模式排除文件
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    extensions: Vec<String>,
    /// (正则, 是否匹配完整路径)
    patterns: Vec<(Regex, bool)>,
}

impl ExcludeFilter {
    pub fn new(extensions: &[String], patterns: &[String]) -> MirrorResult<Self> {
        let extensions = extensions
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .map(|e| if e.starts_with('.') { e } else { format!(".{}", e) })
            .collect();

        let patterns = patterns
            .iter()
            .map(|p| -> MirrorResult<(Regex, bool)> {
                Ok((Self::compile_pattern(p)?, p.contains('/')))
            })
            .collect::<MirrorResult<Vec<_>>>()?;

        Ok(Self {
            extensions,
            patterns,
        })
    }

    pub fn from_config(config: &MirrorConfig) -> MirrorResult<Self> {
        Self::new(&config.exclude_extensions, &config.exclude_patterns)
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.patterns.is_empty()
    }

    /// `**` 匹配任意字符，`*` 不跨越 `/`；不含 `/` 的模式只匹配文件名
    fn compile_pattern(pattern: &str) -> MirrorResult<Regex> {
        let escaped = regex::escape(&pattern.to_lowercase());
        let body = escaped.replace(r"\*\*", ".*").replace(r"\*", "[^/]*");
        Regex::new(&format!("^{}$", body))
            .map_err(|e| MirrorError::Config(format!("无效的排除模式 {:?}: {}", pattern, e)))
    }

    fn is_excluded(&self, key: &str) -> bool {
        let key = key.to_lowercase();

        if self.extensions.iter().any(|ext| key.ends_with(ext.as_str())) {
            return true;
        }

        let file_name = key.rsplit('/').next().unwrap_or(&key);
        self.patterns.iter().any(|(re, whole_path)| {
            if *whole_path {
                re.is_match(&key)
            } else {
                re.is_match(file_name)
            }
        })
    }
}

impl KeyFilter for ExcludeFilter {
    fn accept(&self, key: &str) -> bool {
        !self.is_excluded(key)
    }
}

/// 对单个清单条目执行的动作，要求可以安全地重复执行
#[async_trait]
pub trait EntryAction: Send + Sync {
    async fn apply(&self, entry: &ManifestEntry) -> Result<()>;
}

/// 在本地创建目录
pub struct MakeDirAction {
    tree: LocalTree,
}

impl MakeDirAction {
    pub fn new(tree: LocalTree) -> Self {
        Self { tree }
    }
}

#[async_trait]
impl EntryAction for MakeDirAction {
    async fn apply(&self, entry: &ManifestEntry) -> Result<()> {
        let path = self.tree.create_dir(&entry.key).await?;
        debug!("创建目录: {:?}", path);
        Ok(())
    }
}

/// 下载对象到本地，先写临时文件，成功后再改名
pub struct DownloadAction {
    store: Arc<dyn RemoteStore>,
    tree: LocalTree,
}

impl DownloadAction {
    pub fn new(store: Arc<dyn RemoteStore>, tree: LocalTree) -> Self {
        Self { store, tree }
    }
}

#[async_trait]
impl EntryAction for DownloadAction {
    async fn apply(&self, entry: &ManifestEntry) -> Result<()> {
        let (path, partial) = self.tree.prepare_file(&entry.key).await?;

        // 失败时清理半截的临时文件
        let guard = scopeguard::guard(partial.clone(), |p| {
            let _ = std::fs::remove_file(p);
        });

        debug!("下载 {} -> {:?}", entry.key, path);
        let bytes = self.store.download(&entry.key, &partial).await?;
        self.tree.commit(&partial, &path).await?;
        scopeguard::ScopeGuard::into_inner(guard);

        debug!("  下载完成: {} ({} 字节)", entry.key, bytes);
        Ok(())
    }
}

/// 单个阶段的处理报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub name: String,
    pub total: u64,
    pub resumed_from: u64,
    pub completed: u64,
    pub skipped: u64,
}

impl PassReport {
    /// 本次运行处理的条目数
    pub fn processed(&self) -> u64 {
        self.completed + self.skipped
    }
}

/// 检查进度日志是否仍然对应当前清单
pub fn check_alignment(manifest: &Manifest, tracker: &Tracker, verify: bool) -> MirrorResult<()> {
    let misaligned = |reason: String| MirrorError::ManifestMisaligned {
        pass: tracker.name().to_string(),
        reason,
    };

    let start = tracker.position();
    let total = manifest.len() as u64;
    if start > total {
        return Err(misaligned(format!(
            "日志已完成 {} 个条目，但清单 {:?} 只有 {} 个",
            start,
            manifest.path(),
            total
        )));
    }

    if !verify {
        return Ok(());
    }

    // skip 行不含对象键，用最近一条带键的记录对照清单
    let Some(last) = tracker.last_keyed_record() else {
        return Ok(());
    };
    let Some(recorded_key) = last.annotation.as_deref() else {
        return Ok(());
    };

    match manifest.get(last.index) {
        Some(entry) if entry.key == recorded_key => Ok(()),
        Some(entry) => Err(misaligned(format!(
            "日志第 {} 条记录为 {:?}，清单中为 {:?}（清单可能已重新生成，请使用 restart）",
            last.index, recorded_key, entry.key
        ))),
        None => Err(misaligned(format!(
            "清单中不存在第 {} 条记录",
            last.index
        ))),
    }
}

/// 从跟踪器的位置开始，按顺序处理剩余条目
pub async fn run_pass(
    manifest: &Manifest,
    tracker: &mut Tracker,
    filter: Option<&dyn KeyFilter>,
    action: &dyn EntryAction,
    verify: bool,
) -> MirrorResult<PassReport> {
    check_alignment(manifest, tracker, verify)?;

    let name = tracker.name().to_string();
    let start = tracker.position();
    let total = manifest.len() as u64;

    let mut report = PassReport {
        name: name.clone(),
        total,
        resumed_from: start,
        ..Default::default()
    };

    info!("[{}] 开始: 共 {} 个条目, 从 {} 继续", name, total, start);

    for entry in manifest.remaining(start) {
        debug_assert_eq!(entry.index, tracker.position());

        if let Some(filter) = filter {
            if !filter.accept(&entry.key) {
                debug!("[{}] 跳过 {}", name, entry.key);
                tracker.record(Some(SKIP_ANNOTATION))?;
                report.skipped += 1;
                continue;
            }
        }

        action
            .apply(entry)
            .await
            .map_err(|e| MirrorError::Action {
                pass: name.clone(),
                index: entry.index,
                key: entry.key.clone(),
                source: e.into(),
            })?;
        tracker.record(Some(&entry.key))?;
        report.completed += 1;

        info!("[{}] {}/{} {}", name, entry.index + 1, total, entry.key);
    }

    info!(
        "[{}] 完成: 本次处理 {} 个 (跳过 {}), 累计 {}/{}",
        name,
        report.processed(),
        report.skipped,
        tracker.position(),
        total
    );

    Ok(report)
}

/// 读取清单并运行一个阶段，`restart` 时先清除进度
pub async fn run_manifest(
    manifest_path: &Path,
    tracker: &mut Tracker,
    restart: bool,
    filter: Option<&dyn KeyFilter>,
    action: &dyn EntryAction,
    verify: bool,
) -> MirrorResult<PassReport> {
    if restart {
        tracker.reset()?;
    }
    let manifest = Manifest::load(manifest_path)?;
    run_pass(&manifest, tracker, filter, action, verify).await
}
