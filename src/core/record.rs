//! 行记录编解码
//!
//! 清单与进度日志共用同一种行格式：`{index}` 或 `{index}, {annotation}`。

use std::fmt;
use std::str::FromStr;

/// 序号与注释之间的分隔符
pub const SEPARATOR: &str = ", ";

/// 跳过条目时写入的注释
pub const SKIP_ANNOTATION: &str = "skip";

/// 一行记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub index: u64,
    pub annotation: Option<String>,
}

/// 行解析失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordParseError {
    pub reason: String,
}

impl fmt::Display for RecordParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for RecordParseError {}

impl Record {
    pub fn new(index: u64, annotation: Option<&str>) -> Self {
        Self {
            index,
            annotation: annotation.map(str::to_string),
        }
    }

    /// 是否为被过滤跳过的条目
    pub fn is_skip(&self) -> bool {
        self.annotation.as_deref() == Some(SKIP_ANNOTATION)
    }

    /// 是否记录了实际处理过的对象键（可用于对照清单）
    pub fn carries_key(&self) -> bool {
        self.annotation.is_some() && !self.is_skip()
    }

    /// 注释能否安全地写在一行内
    pub fn is_line_safe(text: &str) -> bool {
        !text.contains('\n') && !text.contains('\r')
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.annotation {
            Some(annotation) => write!(f, "{}{}{}", self.index, SEPARATOR, annotation),
            None => write!(f, "{}", self.index),
        }
    }
}

impl FromStr for Record {
    type Err = RecordParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (head, annotation) = match line.split_once(SEPARATOR) {
            Some((head, rest)) => (head, Some(rest.to_string())),
            None => (line, None),
        };

        if head.is_empty() || !head.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RecordParseError {
                reason: format!("行首不是序号: {:?}", head),
            });
        }

        let index = head.parse::<u64>().map_err(|e| RecordParseError {
            reason: format!("序号超出范围: {}", e),
        })?;

        Ok(Self { index, annotation })
    }
}
