use anyhow::{Context, Result};
use clap::Parser;
use eegmirror_lib::config::CONFIG_FILE_NAME;
use eegmirror_lib::logging::{log_dir, LogConfig, SizeRotatingWriter};
use eegmirror_lib::{Mirror, MirrorConfig, RunOptions, S3Store};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

/// 把对象存储前缀镜像到本地目录，中断后可续传
#[derive(Parser, Debug)]
#[command(name = "eeg-mirror", version, about)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// 覆盖配置中的本地目录
    #[arg(long)]
    local_dir: Option<PathBuf>,

    /// 覆盖配置中的 bucket
    #[arg(long)]
    bucket: Option<String>,

    /// 先重新列出远程对象并重建清单
    #[arg(long)]
    list: bool,

    /// 忽略已有进度，重新创建所有目录
    #[arg(long)]
    restart_mkdir: bool,

    /// 忽略已有进度，重新下载所有文件
    #[arg(long)]
    restart_download: bool,

    #[arg(long)]
    skip_mkdir: bool,

    #[arg(long)]
    skip_download: bool,

    /// 不应用排除规则，下载全部文件
    #[arg(long)]
    no_filter: bool,

    /// 把生效的配置写回配置文件后退出
    #[arg(long)]
    write_config: bool,

    /// 输出 debug 日志
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            list: self.list,
            restart_mkdir: self.restart_mkdir,
            restart_download: self.restart_download,
            skip_mkdir: self.skip_mkdir,
            skip_download: self.skip_download,
            no_filter: self.no_filter,
        }
    }
}

/// 初始化日志系统：控制台 + 可选的文件日志
fn init_logging(config_file: &Path, state_dir: &Path, verbose: bool) {
    let config = LogConfig::load(config_file);

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config.tracing_level()
    };
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "opendal=warn"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    let console_layer = tracing_subscriber::fmt::layer().with_target(false);

    let file_layer = if config.enabled {
        match SizeRotatingWriter::new(&log_dir(state_dir), config.max_size_mb) {
            Ok(writer) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false),
            ),
            Err(e) => {
                eprintln!("无法创建日志文件，仅输出到控制台: {}", e);
                None
            }
        }
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<MirrorConfig> {
    let mut config = MirrorConfig::load(&cli.config)
        .with_context(|| format!("加载配置失败: {:?}", cli.config))?;

    if let Some(ref dir) = cli.local_dir {
        config.local_dir = dir.clone();
    }
    if let Some(ref bucket) = cli.bucket {
        config.bucket = bucket.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    if cli.write_config {
        config
            .save(&cli.config)
            .with_context(|| format!("写入配置失败: {:?}", cli.config))?;
        println!("配置已写入 {:?}", cli.config);
        return Ok(());
    }

    std::fs::create_dir_all(config.state_dir())
        .with_context(|| format!("无法创建状态目录: {:?}", config.state_dir()))?;
    init_logging(&cli.config, config.state_dir(), cli.verbose);

    let store = S3Store::from_config(&config).context("创建 S3 存储失败")?;
    let mirror = Mirror::new(config, Arc::new(store));

    let report = mirror.run(&cli.run_options()).await?;

    if let Some(listing) = &report.listing {
        info!("清单: {} 个目录, {} 个文件", listing.directories, listing.files);
    }
    for pass in [&report.mkdir, &report.download].into_iter().flatten() {
        info!(
            "[{}] 本次完成 {}, 跳过 {}, 总计 {}",
            pass.name, pass.completed, pass.skipped, pass.total
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("错误: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
