use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::{error, info, warn};

use novel_harvester::base_system::config::load_or_create;
use novel_harvester::base_system::context::Config;
use novel_harvester::base_system::logging::{LogOptions, LogSystem};
use novel_harvester::book_parser::manifest::VolumeManifest;
use novel_harvester::download::{VolumeProgress, download_volume};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "novel-harvester")]
#[command(about = "按卷清单下载轻小说章节与插图，输出 Markdown")]
struct Cli {
    /// 卷清单文件（YAML / JSON）
    manifest: Option<PathBuf>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 逐章顺序抓取（覆盖配置中的 harvest_mode）
    #[arg(long, default_value_t = false)]
    sequential: bool,

    /// 并发抓取线程上限，0 表示每章一个线程
    #[arg(long)]
    workers: Option<usize>,

    /// 不下载封面与插图
    #[arg(long, default_value_t = false)]
    no_assets: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("Novel Harvester v{}", VERSION);
        return ExitCode::SUCCESS;
    }

    let log = match init_logging(cli.debug, cli.data_dir.as_deref()) {
        Ok(log) => log,
        Err(err) => {
            eprintln!("日志初始化失败：{err:#}");
            return ExitCode::FAILURE;
        }
    };

    let code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    };
    log.safe_exit();
    code
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let manifest_path = cli
        .manifest
        .as_ref()
        .ok_or_else(|| anyhow!("缺少卷清单文件参数，使用 --help 查看用法"))?;

    let mut config =
        load_or_create::<Config>(cli.data_dir.as_deref()).map_err(|e| anyhow!(e.to_string()))?;
    apply_overrides(&mut config, cli);
    info!(target: "startup", "当前版本: v{}", VERSION);

    let manifest = VolumeManifest::load(manifest_path)?;
    let progress = VolumeProgress::new(std::io::stderr().is_terminal());
    let report = download_volume(&config, &manifest, &progress)?;

    println!(
        "完成：{} 章成功，{} 章失败，图片 {} 成功 {} 失败 -> {}",
        report.chapters_ok,
        report.failures.len(),
        report.assets_ok,
        report.assets_failed,
        report.output.display()
    );
    for failure in &report.failures {
        warn!("第 {} 章失败：{}", failure.ordinal + 1, failure.error);
    }

    if report.all_failed() {
        error!("所有章节均下载失败");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if cli.sequential {
        config.harvest_mode = "sequential".to_string();
    }
    if let Some(workers) = cli.workers {
        config.max_workers = workers;
    }
    if cli.no_assets {
        config.download_assets = false;
    }
}

fn init_logging(debug: bool, base_dir: Option<&std::path::Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: std::io::stdout().is_terminal(),
        archive_on_exit: true,
        console: true,
    };
    LogSystem::init(opts, base_dir).map_err(|e| anyhow!(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let cli = Cli::parse_from([
            "novel-harvester",
            "vol.yml",
            "--sequential",
            "--workers",
            "0",
            "--no-assets",
            "--data-dir",
            "/data",
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.harvest_mode, "sequential");
        assert_eq!(config.max_workers, 0);
        assert!(!config.download_assets);
        assert!(config.save_path.is_empty());
        assert_eq!(cli.manifest.as_deref(), Some(std::path::Path::new("vol.yml")));
    }

    #[test]
    fn defaults_leave_config_untouched() {
        let cli = Cli::parse_from(["novel-harvester", "v.yml"]);
        let mut config = Config::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.harvest_mode, "concurrent");
        assert_eq!(config.max_workers, 8);
        assert!(config.download_assets);
    }
}
