use std::cell::Cell;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{io, panic, thread, time::Duration};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024; // 10MB
const FLUSH_WAIT_MS: u64 = 200;

thread_local! {
    static RECOVERABLE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// 执行一段 panic 会被调用方就地处理的代码。
///
/// 其中发生的 panic 只记一条警告，不会触发日志收尾，也不会输出默认的 panic 报告。
pub fn catch_recoverable<F, R>(f: F) -> thread::Result<R>
where
    F: FnOnce() -> R,
{
    RECOVERABLE_DEPTH.with(|d| d.set(d.get() + 1));
    let outcome = panic::catch_unwind(panic::AssertUnwindSafe(f));
    RECOVERABLE_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    outcome
}

pub fn in_recoverable_section() -> bool {
    RECOVERABLE_DEPTH.with(|d| d.get() > 0)
}

/// 只有主线程上未被捕获的 panic 才会结束进程。
pub(crate) fn panic_ends_process(thread_name: Option<&str>) -> bool {
    !in_recoverable_section() && thread_name == Some("main")
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("time formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            archive_on_exit: true,
            console: true,
        }
    }
}

/// 控制台 + `logs/latest.log` 双通道日志；退出时把 latest.log 打包为 zip。
pub struct LogSystem {
    runtime: Arc<LogRuntime>,
}

impl LogSystem {
    pub fn init(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let logs_dir = base_dir
            .map(|b| b.join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"));
        fs::create_dir_all(&logs_dir)?;
        let latest_log = logs_dir.join("latest.log");

        archive_if_large(&latest_log, &logs_dir)?;

        let file_appender = rolling::never(&logs_dir, "latest.log");
        let (file_writer, guard) = non_blocking::NonBlockingBuilder::default()
            .lossy(false)
            .finish(file_appender);

        let console_level = if options.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };

        // 进度条在 stderr 上绘制，日志走 stdout
        let console_writer: BoxMakeWriter = if options.console {
            BoxMakeWriter::new(io::stdout)
        } else {
            BoxMakeWriter::new(io::sink)
        };

        let console_layer = fmt::layer()
            .with_target(false)
            .with_level(true)
            .with_thread_names(true)
            .with_ansi(options.use_color)
            .with_writer(console_writer)
            .with_filter(console_level);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_writer(file_writer)
            .with_filter(LevelFilter::DEBUG);

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("global subscriber") || msg.contains("already") {
                    LogError::AlreadyInitialized
                } else {
                    LogError::SubscriberInit(e)
                }
            })?;

        let runtime = Arc::new(LogRuntime {
            logs_dir,
            latest_log,
            guard: Mutex::new(Some(guard)),
            exit_called: AtomicBool::new(false),
            archive_on_exit: options.archive_on_exit,
        });

        runtime.install_signal_handler();
        runtime.install_panic_hook();

        Ok(Self { runtime })
    }

    pub fn logs_dir(&self) -> &Path {
        &self.runtime.logs_dir
    }

    pub fn safe_exit(&self) {
        self.runtime.safe_exit();
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.runtime.safe_exit();
    }
}

struct LogRuntime {
    logs_dir: PathBuf,
    latest_log: PathBuf,
    guard: Mutex<Option<WorkerGuard>>,
    exit_called: AtomicBool,
    archive_on_exit: bool,
}

impl LogRuntime {
    fn install_signal_handler(self: &Arc<Self>) {
        let runtime = Arc::clone(self);
        let _ = ctrlc::set_handler(move || {
            runtime.safe_exit();
            std::process::exit(130);
        });
    }

    fn install_panic_hook(self: &Arc<Self>) {
        let runtime = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if in_recoverable_section() {
                warn!("recovered panic: {info}");
                return;
            }
            if let Some(location) = info.location() {
                error!("panic at {}:{}: {}", location.file(), location.line(), info);
            } else {
                error!("panic: {info}");
            }
            if panic_ends_process(thread::current().name()) {
                runtime.safe_exit();
                previous(info);
            }
        }));
    }

    fn safe_exit(&self) {
        if self.exit_called.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Ok(mut guard) = self.guard.lock() {
            guard.take();
        }

        // 等待文件句柄释放（Windows）
        thread::sleep(Duration::from_millis(FLUSH_WAIT_MS));

        if self.archive_on_exit
            && let Err(err) = archive_log_file(&self.latest_log, &self.logs_dir)
        {
            eprintln!("failed to archive log: {err}");
        }
    }
}

fn archive_if_large(latest_log: &Path, logs_dir: &Path) -> Result<(), LogError> {
    if let Ok(meta) = fs::metadata(latest_log)
        && meta.len() >= MAX_LOG_BYTES
    {
        archive_log_file(latest_log, logs_dir)?;
    }
    Ok(())
}

fn archive_log_file(latest_log: &Path, logs_dir: &Path) -> Result<Option<PathBuf>, LogError> {
    if !latest_log.exists() {
        return Ok(None);
    }
    if fs::metadata(latest_log)?.len() == 0 {
        let _ = fs::remove_file(latest_log);
        return Ok(None);
    }

    let timestamp = OffsetDateTime::now_utc().format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let archive_path = logs_dir.join(format!("log_{timestamp}.zip"));

    let file = File::create(&archive_path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(format!("{timestamp}.log"), options)?;
    let mut log = File::open(latest_log)?;
    io::copy(&mut log, &mut zip)?;
    zip.finish()?;
    drop(log);

    let _ = fs::remove_file(latest_log);
    info!("log archived to {}", archive_path.display());
    Ok(Some(archive_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn recoverable_section_is_scoped_and_nested() {
        assert!(!in_recoverable_section());
        let inner = catch_recoverable(|| {
            let nested = catch_recoverable(in_recoverable_section).unwrap();
            (nested, in_recoverable_section())
        })
        .unwrap();
        assert_eq!(inner, (true, true));
        assert!(!in_recoverable_section());

        let caught = catch_recoverable(|| -> u8 { panic!("inner failure") });
        assert!(caught.is_err());
        assert!(!in_recoverable_section());
    }

    #[test]
    fn only_uncaught_main_thread_panics_end_the_process() {
        assert!(panic_ends_process(Some("main")));
        assert!(!panic_ends_process(Some("harvest-0")));
        assert!(!panic_ends_process(None));
        let inside = catch_recoverable(|| panic_ends_process(Some("main"))).unwrap();
        assert!(!inside);
    }

    #[test]
    fn archive_packs_and_removes_latest_log() {
        let dir = tempfile::tempdir().unwrap();
        let latest = dir.path().join("latest.log");
        fs::write(&latest, "line one\nline two\n").unwrap();

        let archive = archive_log_file(&latest, dir.path()).unwrap().unwrap();
        assert!(!latest.exists());

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 1);
        let mut text = String::new();
        zip.by_index(0).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "line one\nline two\n");
    }

    #[test]
    fn empty_log_is_dropped_without_archive() {
        let dir = tempfile::tempdir().unwrap();
        let latest = dir.path().join("latest.log");
        fs::write(&latest, "").unwrap();
        assert!(archive_log_file(&latest, dir.path()).unwrap().is_none());
        assert!(!latest.exists());
    }

    #[test]
    fn small_log_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let latest = dir.path().join("latest.log");
        fs::write(&latest, "x").unwrap();
        archive_if_large(&latest, dir.path()).unwrap();
        assert!(latest.exists());
    }
}
