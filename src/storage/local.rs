use crate::error::{MirrorError, MirrorResult};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// 下载中的临时文件后缀
const PARTIAL_SUFFIX: &str = ".part";

/// 本地镜像目录
#[derive(Debug, Clone)]
pub struct LocalTree {
    root: PathBuf,
}

impl LocalTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 把对象键映射到本地路径，拒绝跳出根目录的键
    pub fn resolve(&self, key: &str) -> MirrorResult<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));

        let mut path = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(MirrorError::InvalidKey {
                        key: key.to_string(),
                        reason: "包含上级目录或绝对路径".to_string(),
                    })
                }
            }
        }

        if path == self.root {
            return Err(MirrorError::InvalidKey {
                key: key.to_string(),
                reason: "映射到了镜像根目录".to_string(),
            });
        }

        Ok(path)
    }

    /// 创建目录（含父目录），已存在时不报错
    pub async fn create_dir(&self, key: &str) -> MirrorResult<PathBuf> {
        let path = self.resolve(key)?;
        fs::create_dir_all(&path).await?;
        Ok(path)
    }

    /// 为下载准备路径：确保父目录存在，返回 (最终路径, 临时路径)
    pub async fn prepare_file(&self, key: &str) -> MirrorResult<(PathBuf, PathBuf)> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok((path.clone(), Self::partial_path(&path)))
    }

    /// 下载完成后把临时文件移动到最终位置
    pub async fn commit(&self, partial: &Path, path: &Path) -> MirrorResult<()> {
        fs::rename(partial, path).await?;
        Ok(())
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(PARTIAL_SUFFIX);
        PathBuf::from(name)
    }
}
