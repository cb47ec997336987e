//! 进度跟踪 - 基于追加式日志的断点续传
//!
//! 日志是唯一的真实来源：游标永远从日志内容推导（最后一行序号 + 1），
//! 不单独持久化。每完成一个条目追加一行，从不改写已有内容。

use super::record::Record;
use crate::error::{MirrorError, MirrorResult};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 进度跟踪器
#[derive(Debug)]
pub struct Tracker {
    log_path: PathBuf,
    name: String,
    cursor: u64,
    last: Option<Record>,
    last_keyed: Option<Record>,
}

/// 从日志恢复出的状态
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Recovered {
    /// 下一个待处理条目的序号
    pub cursor: u64,
    /// 最后一行记录
    pub last: Option<Record>,
    /// 最近一条带对象键的记录（跳过 skip 和无注释的行）
    pub last_keyed: Option<Record>,
}

impl Tracker {
    /// 打开跟踪器，存在日志时从日志恢复游标
    pub fn open(log_path: impl Into<PathBuf>, name: &str) -> MirrorResult<Self> {
        let mut tracker = Self {
            log_path: log_path.into(),
            name: name.to_string(),
            cursor: 0,
            last: None,
            last_keyed: None,
        };
        tracker.recover()?;
        Ok(tracker)
    }

    fn recover(&mut self) -> MirrorResult<()> {
        // 按字节读取：崩溃可能把多字节字符截断在最后一行
        match fs::read(&self.log_path) {
            Ok(content) => {
                let recovered = recover_cursor(&self.log_path, &content)?;
                self.cursor = recovered.cursor;
                self.last = recovered.last;
                self.last_keyed = recovered.last_keyed;
                info!("[{}] 恢复进度: 已完成 {} 个条目", self.name, self.cursor);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.cursor = 0;
                self.last = None;
                self.last_keyed = None;
                debug!("[{}] 无进度日志，从头开始", self.name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 记录当前条目已完成，然后游标加一
    ///
    /// 先写日志再移动游标：两步之间崩溃时，下次恢复仍以日志为准。
    pub fn record(&mut self, annotation: Option<&str>) -> MirrorResult<u64> {
        if let Some(text) = annotation {
            if !Record::is_line_safe(text) {
                return Err(MirrorError::InvalidKey {
                    key: text.to_string(),
                    reason: "包含换行符，无法写入进度日志".to_string(),
                });
            }
        }

        let record = Record::new(self.cursor, annotation);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        file.write_all(format!("{}\n", record).as_bytes())?;
        file.sync_data()?;

        debug!("[{}] 更新 {}", self.name, record);

        let index = self.cursor;
        self.cursor += 1;
        if record.carries_key() {
            self.last_keyed = Some(record.clone());
        }
        self.last = Some(record);
        Ok(index)
    }

    /// 删除日志并回到起点，日志不存在时不报错
    pub fn reset(&mut self) -> MirrorResult<()> {
        match fs::remove_file(&self.log_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.cursor = 0;
        self.last = None;
        self.last_keyed = None;
        info!("[{}] 清除进度", self.name);
        Ok(())
    }

    /// 已完成的条目数，即下一个待处理条目的序号
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// 最后一条记录（恢复得到的或本次写入的）
    pub fn last_record(&self) -> Option<&Record> {
        self.last.as_ref()
    }

    /// 最近一条带对象键的记录
    pub fn last_keyed_record(&self) -> Option<&Record> {
        self.last_keyed.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// 从日志内容推导游标：最后一行序号 + 1
///
/// 只有最后一行决定游标；向前回溯到最近一条带对象键的记录为止，
/// 途经的每一行都必须是合法记录。
pub fn recover_cursor(path: &Path, content: &[u8]) -> MirrorResult<Recovered> {
    if content.is_empty() {
        warn!("进度日志为空，视为从头开始: {:?}", path);
        return Ok(Recovered::default());
    }

    let corrupt = |line_no: usize, line: &[u8]| MirrorError::CorruptLog {
        path: path.to_path_buf(),
        line_no,
        line: String::from_utf8_lossy(line).into_owned(),
    };

    let complete = content.ends_with(b"\n");
    let body = if complete {
        &content[..content.len() - 1]
    } else {
        content
    };
    let lines: Vec<&[u8]> = body
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();
    let line_count = lines.len();

    // 没有换行结尾说明最后一行只写了一半
    if !complete {
        return Err(corrupt(line_count, lines[line_count - 1]));
    }

    let parse = |line_no: usize| -> MirrorResult<Record> {
        let line = lines[line_no - 1];
        std::str::from_utf8(line)
            .ok()
            .and_then(|text| text.parse::<Record>().ok())
            .ok_or_else(|| corrupt(line_no, line))
    };

    let last = parse(line_count)?;
    if last.index + 1 != line_count as u64 {
        warn!(
            "进度日志行数 ({}) 与最后序号 ({}) 不一致: {:?}",
            line_count, last.index, path
        );
    }

    let mut last_keyed = None;
    for line_no in (1..=line_count).rev() {
        let record = if line_no == line_count {
            last.clone()
        } else {
            parse(line_no)?
        };
        if record.carries_key() {
            last_keyed = Some(record);
            break;
        }
    }

    Ok(Recovered {
        cursor: last.index + 1,
        last: Some(last),
        last_keyed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_fresh_tracker_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let tracker = Tracker::open(dir.path().join("mkdir.log"), "mkdir").unwrap();
        assert_eq!(tracker.position(), 0);
        assert!(tracker.last_record().is_none());
    }

    #[test]
    fn test_records_are_contiguous_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download.log");
        let mut tracker = Tracker::open(&path, "download").unwrap();

        for i in 0..5 {
            let index = tracker.record(Some(&format!("EEG/f{}.csv", i))).unwrap();
            assert_eq!(index, i);
        }

        let lines = log_lines(&path);
        assert_eq!(lines.len(), 5);
        for (i, line) in lines.iter().enumerate() {
            let record: Record = line.parse().unwrap();
            assert_eq!(record.index, i as u64);
        }
        assert_eq!(tracker.position(), 5);
    }

    #[test]
    fn test_recover_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download.log");
        {
            let mut tracker = Tracker::open(&path, "download").unwrap();
            tracker.record(Some("a")).unwrap();
            tracker.record(None).unwrap();
            tracker.record(Some("skip")).unwrap();
        }

        let mut tracker = Tracker::open(&path, "download").unwrap();
        assert_eq!(tracker.position(), 3);
        assert!(tracker.last_record().unwrap().is_skip());

        // 继续追加，不截断已有内容
        tracker.record(Some("d")).unwrap();
        assert_eq!(log_lines(&path), vec!["0, a", "1", "2, skip", "3, d"]);
    }

    #[test]
    fn test_recover_handles_multi_digit_index() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mkdir.log");
        let content: String = (0..12).map(|i| format!("{}, d{}/\n", i, i)).collect();
        fs::write(&path, content).unwrap();

        let tracker = Tracker::open(&path, "mkdir").unwrap();
        assert_eq!(tracker.position(), 12);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mkdir.log");
        let mut tracker = Tracker::open(&path, "mkdir").unwrap();

        tracker.reset().unwrap();
        assert_eq!(tracker.position(), 0);

        tracker.record(Some("a/")).unwrap();
        tracker.reset().unwrap();
        assert_eq!(tracker.position(), 0);
        assert!(!path.exists());

        tracker.reset().unwrap();
        assert_eq!(tracker.position(), 0);
    }

    #[test]
    fn test_non_numeric_last_line_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download.log");
        fs::write(&path, "0, a\ngarbage\n").unwrap();

        let err = Tracker::open(&path, "download").unwrap_err();
        match err {
            MirrorError::CorruptLog { line_no, line, .. } => {
                assert_eq!(line_no, 2);
                assert_eq!(line, "garbage");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_torn_last_line_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download.log");
        fs::write(&path, "0, a\n1, b\n2").unwrap();

        let err = Tracker::open(&path, "download").unwrap_err();
        assert!(matches!(err, MirrorError::CorruptLog { line_no: 3, .. }));
    }

    #[test]
    fn test_empty_log_is_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download.log");
        fs::write(&path, "").unwrap();

        let tracker = Tracker::open(&path, "download").unwrap();
        assert_eq!(tracker.position(), 0);
    }

    #[test]
    fn test_rejects_multiline_annotation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download.log");
        let mut tracker = Tracker::open(&path, "download").unwrap();

        let err = tracker.record(Some("a\nb")).unwrap_err();
        assert!(matches!(err, MirrorError::InvalidKey { .. }));
        assert_eq!(tracker.position(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_torn_multibyte_last_line_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download.log");
        let mut content = b"0, EEG/a.csv\n1, EEG/".to_vec();
        content.extend_from_slice(&"脑".as_bytes()[..2]);
        fs::write(&path, content).unwrap();

        let err = Tracker::open(&path, "download").unwrap_err();
        match err {
            MirrorError::CorruptLog { line_no, line, .. } => {
                assert_eq!(line_no, 2);
                assert!(line.starts_with("1, EEG/"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_utf8_complete_line_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download.log");
        fs::write(&path, b"0, EEG/\xff.csv\n").unwrap();

        let err = Tracker::open(&path, "download").unwrap_err();
        assert!(matches!(err, MirrorError::CorruptLog { line_no: 1, .. }));
    }

    #[test]
    fn test_non_ascii_keys_recover() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download.log");
        fs::write(&path, "0, EEG/脑电/a.csv\n").unwrap();

        let tracker = Tracker::open(&path, "download").unwrap();
        assert_eq!(tracker.position(), 1);
        assert_eq!(
            tracker.last_keyed_record().unwrap().annotation.as_deref(),
            Some("EEG/脑电/a.csv")
        );
    }

    #[test]
    fn test_last_keyed_record_looks_past_skips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download.log");
        fs::write(&path, "0, EEG/a.csv\n1, skip\n2, skip\n").unwrap();

        let mut tracker = Tracker::open(&path, "download").unwrap();
        assert_eq!(tracker.position(), 3);
        assert!(tracker.last_record().unwrap().is_skip());
        assert_eq!(tracker.last_keyed_record().unwrap().index, 0);

        tracker.record(Some("EEG/d.csv")).unwrap();
        assert_eq!(tracker.last_keyed_record().unwrap().index, 3);
        tracker.record(Some("skip")).unwrap();
        assert_eq!(tracker.last_keyed_record().unwrap().index, 3);

        tracker.reset().unwrap();
        assert!(tracker.last_keyed_record().is_none());
    }

    #[test]
    fn test_only_skips_have_no_keyed_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download.log");
        fs::write(&path, "0, skip\n1\n").unwrap();

        let tracker = Tracker::open(&path, "download").unwrap();
        assert_eq!(tracker.position(), 2);
        assert!(tracker.last_keyed_record().is_none());
    }
}
