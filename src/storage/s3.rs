use super::{KeyStream, RemoteStore};
use crate::config::MirrorConfig;
use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Operator};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub struct S3Store {
    operator: Operator,
    chunk_size: u64,
    name: String,
}

impl S3Store {
    pub fn from_config(config: &MirrorConfig) -> Result<Self> {
        use opendal::services::S3;

        let mut builder = S3::default().bucket(&config.bucket).region(&config.region);

        if let Some(ref ep) = config.endpoint {
            if !ep.is_empty() {
                builder = builder.endpoint(ep);
            }
        }

        // 未配置静态密钥时由 opendal 从环境变量 / profile 加载凭证
        if let (Some(ak), Some(sk)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder.access_key_id(ak).secret_access_key(sk);
        }

        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(config.op_timeout_secs))
                    .with_io_timeout(Duration::from_secs(config.io_timeout_secs)),
            )
            .finish();

        Ok(Self::with_operator(
            operator,
            config.chunk_size,
            format!("s3://{}", config.bucket),
        ))
    }

    /// 使用已构建好的 Operator
    pub fn with_operator(operator: Operator, chunk_size: u64, name: impl Into<String>) -> Self {
        Self {
            operator,
            chunk_size: chunk_size.max(1),
            name: name.into(),
        }
    }
}

/// 按 chunk_size 分段读取对象并顺序写入 dest，返回对象大小
async fn download_ranged(
    operator: &Operator,
    key: &str,
    dest: &Path,
    chunk_size: u64,
) -> Result<u64> {
    let size = operator.stat(key).await?.content_length();

    let mut file = tokio::fs::File::create(dest).await?;
    let mut offset = 0u64;

    while offset < size {
        let end = (offset + chunk_size).min(size);
        let data = operator.read_with(key).range(offset..end).await?;
        file.write_all(&data.to_vec()).await?;
        debug!("  {} 已写入 {}/{} 字节", key, end, size);
        offset = end;
    }

    file.flush().await?;
    file.sync_all().await?;

    Ok(size)
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn list_keys(&self, prefix: &str) -> Result<KeyStream> {
        let lister = self.operator.lister_with(prefix).recursive(true).await?;

        let keys = lister
            .map_ok(|entry| entry.path().to_string())
            .map_err(anyhow::Error::from);

        Ok(Box::pin(keys))
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<u64> {
        download_ranged(&self.operator, key, dest, self.chunk_size).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
