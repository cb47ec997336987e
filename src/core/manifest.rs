//! 清单文件 - 按列表顺序编号的对象键

use super::record::Record;
use crate::error::{MirrorError, MirrorResult};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// 清单条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub index: u64,
    pub key: String,
}

/// 已加载的清单
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// 读取清单，要求第 N 行的序号等于 N
    pub fn load(path: &Path) -> MirrorResult<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MirrorError::MissingManifest {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let malformed = |line_no: usize, reason: String| MirrorError::MalformedManifest {
            path: path.to_path_buf(),
            line_no,
            reason,
        };

        let mut entries = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let line_no = i + 1;
            let record: Record = line.parse().map_err(|e| malformed(line_no, format!("{}", e)))?;

            if record.index != i as u64 {
                return Err(malformed(
                    line_no,
                    format!("序号不连续: 期望 {}, 实际 {}", i, record.index),
                ));
            }

            let key = record
                .annotation
                .filter(|k| !k.is_empty())
                .ok_or_else(|| malformed(line_no, "缺少对象键".to_string()))?;

            entries.push(ManifestEntry {
                index: record.index,
                key,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u64) -> Option<&ManifestEntry> {
        usize::try_from(index).ok().and_then(|i| self.entries.get(i))
    }

    /// 从 start 开始的剩余条目，start 越界时为空
    pub fn remaining(&self, start: u64) -> &[ManifestEntry] {
        let start = usize::try_from(start)
            .unwrap_or(usize::MAX)
            .min(self.entries.len());
        &self.entries[start..]
    }
}

/// 清单写入器，每个条目立即追加一行
pub struct ManifestWriter {
    path: PathBuf,
    file: File,
    next_index: u64,
}

impl ManifestWriter {
    /// 删除旧清单并创建空文件
    pub fn create(path: &Path) -> MirrorResult<Self> {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_index: 0,
        })
    }

    /// 追加一个对象键，返回分配的序号
    pub fn append(&mut self, key: &str) -> MirrorResult<u64> {
        if key.is_empty() || !Record::is_line_safe(key) {
            return Err(MirrorError::InvalidKey {
                key: key.to_string(),
                reason: "空键或包含换行符，无法写入清单".to_string(),
            });
        }

        let record = Record::new(self.next_index, Some(key));
        self.file.write_all(format!("{}\n", record).as_bytes())?;

        let index = self.next_index;
        self.next_index += 1;
        Ok(index)
    }

    /// 已写入的条目数
    pub fn count(&self) -> u64 {
        self.next_index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn finish(mut self) -> MirrorResult<u64> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(self.next_index)
    }
}
