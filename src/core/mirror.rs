//! 镜像流程：列表 -> 创建目录 -> 下载文件
//!
//! 两个处理阶段各自拥有独立的进度日志，可以分别续传或重新开始。

use super::lister::{Lister, ListingSummary};
use super::resumable::{
    run_manifest, DownloadAction, ExcludeFilter, KeyFilter, MakeDirAction, PassReport,
};
use super::tracker::Tracker;
use crate::config::MirrorConfig;
use crate::error::MirrorResult;
use crate::storage::{LocalTree, RemoteStore};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub const DIR_MANIFEST: &str = "dir_list.txt";
pub const FILE_MANIFEST: &str = "file_list.txt";
pub const MKDIR_LOG: &str = "mkdir.log";
pub const DOWNLOAD_LOG: &str = "download.log";

/// 一次运行的选项
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// 先重新生成清单
    pub list: bool,
    /// 忽略目录阶段的已有进度
    pub restart_mkdir: bool,
    /// 忽略下载阶段的已有进度
    pub restart_download: bool,
    pub skip_mkdir: bool,
    pub skip_download: bool,
    /// 下载全部文件，不应用排除规则
    pub no_filter: bool,
}

/// 运行报告
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub started_at: i64,
    pub finished_at: i64,
    pub listing: Option<ListingSummary>,
    pub mkdir: Option<PassReport>,
    pub download: Option<PassReport>,
}

pub struct Mirror {
    config: MirrorConfig,
    store: Arc<dyn RemoteStore>,
    tree: LocalTree,
}

impl Mirror {
    pub fn new(config: MirrorConfig, store: Arc<dyn RemoteStore>) -> Self {
        let tree = LocalTree::new(&config.local_dir);
        Self {
            config,
            store,
            tree,
        }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    fn state_path(&self, name: &str) -> PathBuf {
        self.config.state_dir().join(name)
    }

    fn ensure_dirs(&self) -> MirrorResult<()> {
        std::fs::create_dir_all(&self.config.local_dir)?;
        std::fs::create_dir_all(self.config.state_dir())?;
        Ok(())
    }

    /// 重新生成目录清单和文件清单
    pub async fn list_remote(&self) -> MirrorResult<ListingSummary> {
        self.ensure_dirs()?;
        Lister::new(self.store.clone(), self.config.prefix.clone())
            .list_into(
                &self.state_path(DIR_MANIFEST),
                &self.state_path(FILE_MANIFEST),
            )
            .await
    }

    /// 按目录清单创建本地目录
    pub async fn make_dirs(&self, restart: bool) -> MirrorResult<PassReport> {
        self.ensure_dirs()?;
        let mut tracker = Tracker::open(self.state_path(MKDIR_LOG), "mkdir")?;
        let action = MakeDirAction::new(self.tree.clone());

        run_manifest(
            &self.state_path(DIR_MANIFEST),
            &mut tracker,
            restart,
            None,
            &action,
            self.config.verify_alignment,
        )
        .await
    }

    /// 按文件清单下载，filter 拒绝的文件记为 skip
    pub async fn download_files(
        &self,
        filter: Option<&dyn KeyFilter>,
        restart: bool,
    ) -> MirrorResult<PassReport> {
        self.ensure_dirs()?;
        let mut tracker = Tracker::open(self.state_path(DOWNLOAD_LOG), "download")?;
        let action = DownloadAction::new(self.store.clone(), self.tree.clone());

        run_manifest(
            &self.state_path(FILE_MANIFEST),
            &mut tracker,
            restart,
            filter,
            &action,
            self.config.verify_alignment,
        )
        .await
    }

    /// 完整运行：可选列表，然后创建目录，最后下载
    pub async fn run(&self, options: &RunOptions) -> MirrorResult<RunReport> {
        let mut report = RunReport {
            started_at: chrono::Utc::now().timestamp(),
            ..Default::default()
        };

        info!(
            "开始镜像: {} {:?} -> {:?}",
            self.store.name(),
            self.config.prefix,
            self.config.local_dir
        );

        if options.list {
            report.listing = Some(self.list_remote().await?);
        }

        if !options.skip_mkdir {
            report.mkdir = Some(self.make_dirs(options.restart_mkdir).await?);
        }

        if !options.skip_download {
            let exclude = ExcludeFilter::from_config(&self.config)?;
            let filter: Option<&dyn KeyFilter> = if options.no_filter || exclude.is_empty() {
                None
            } else {
                Some(&exclude)
            };
            report.download = Some(self.download_files(filter, options.restart_download).await?);
        }

        report.finished_at = chrono::Utc::now().timestamp();
        info!("镜像完成, 用时 {}s", report.finished_at - report.started_at);

        Ok(report)
    }
}
