use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

static CRASH_LOG_PATH: OnceCell<PathBuf> = OnceCell::new();
static SENTRY_GUARD: Mutex<Option<sentry::ClientInitGuard>> = Mutex::new(None);

const LOG_DIR: &str = "EvgaPipeBridge";
const CRASH_LOG_FILE: &str = "crash.log";

/// Destination for errors the device cannot surface to the host any other way.
pub trait ErrorSink: Send + Sync {
    fn error(&self, message: &str);
}

/// Default sink: the `log` facade, the crash log, and Sentry when enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn error(&self, message: &str) {
        error!("[EVGA] {}", message);

        if let Err(e) = append_crash_log(&format_report("ERROR", "device", message)) {
            error!("[CRASH LOGGER] Failed to write error report: {}", e);
        }

        if is_sentry_enabled() {
            sentry::with_scope(
                |scope| {
                    scope.set_tag("component", "evga_device");
                    scope.set_level(Some(sentry::Level::Error));
                },
                || {
                    sentry::capture_message(message, sentry::Level::Error);
                },
            );
        }
    }
}

/// Initialize Sentry reporting. An empty or missing DSN leaves it disabled.
pub fn init_sentry(dsn: Option<&str>, environment: Option<&str>) -> bool {
    let dsn = match dsn {
        Some(d) if !d.is_empty() => d,
        _ => {
            info!("[SENTRY] No DSN provided - Sentry disabled");
            return false;
        }
    };

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: environment.map(|e| std::borrow::Cow::Owned(e.to_string())),
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    if !guard.is_enabled() {
        info!("[SENTRY] Failed to initialize");
        return false;
    }

    *lock_guard() = Some(guard);
    info!("[SENTRY] Initialized - Environment: {:?}", environment);
    true
}

pub fn is_sentry_enabled() -> bool {
    lock_guard().as_ref().map_or(false, |g| g.is_enabled())
}

/// Flush pending events and disable Sentry.
pub fn shutdown_sentry() {
    if let Some(guard) = lock_guard().take() {
        info!("[SENTRY] Flushing and shutting down");
        drop(guard);
    }
}

fn lock_guard() -> std::sync::MutexGuard<'static, Option<sentry::ClientInitGuard>> {
    SENTRY_GUARD
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Initialize env_logger. `RUST_LOG` wins; otherwise only warnings and errors are shown.
pub fn init_logger() {
    let mut builder = env_logger::Builder::from_default_env();

    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(LevelFilter::Warn);
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {}: {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    let _ = builder.try_init();
}

/// Set up the crash log and install a panic hook that writes to it.
pub fn init_crash_logger() {
    let log_dir = dirs::data_local_dir()
        .map(|dir| dir.join(LOG_DIR))
        .unwrap_or_else(|| PathBuf::from("."));

    let _ = fs::create_dir_all(&log_dir);
    let log_path = log_dir.join(CRASH_LOG_FILE);
    let _ = CRASH_LOG_PATH.set(log_path.clone());

    std::panic::set_hook(Box::new(|panic_info| {
        let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic payload".to_string()
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "Unknown location".to_string());

        let report = format_report(
            "PANIC",
            &location,
            &format!(
                "{}\n\nBacktrace:\n{}",
                payload,
                std::backtrace::Backtrace::capture()
            ),
        );

        if is_sentry_enabled() {
            sentry::capture_message(&report, sentry::Level::Fatal);
        }

        if let Err(e) = append_crash_log(&report) {
            error!("[CRASH LOGGER] Failed to write crash log: {}", e);
        }

        error!("{}", report);
    }));

    info!("[CRASH LOGGER] Initialized - Log: {:?}", log_path);
}

fn format_report(kind: &str, context: &str, message: &str) -> String {
    format!(
        "===== {} =====\nTimestamp: {}\nContext: {}\nThread: {}\n{}\n",
        kind,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        context,
        std::thread::current().name().unwrap_or("unnamed"),
        message
    )
}

/// Append to the crash log. A no-op until `init_crash_logger` has run.
fn append_crash_log(report: &str) -> std::io::Result<()> {
    let Some(path) = CRASH_LOG_PATH.get() else {
        return Ok(());
    };

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_carries_context() {
        let report = format_report("ERROR", "device", "pipe closed");
        assert!(report.starts_with("===== ERROR ====="));
        assert!(report.contains("Context: device"));
        assert!(report.contains("pipe closed"));
    }

    #[test]
    fn test_sink_without_crash_log_does_not_fail() {
        LogErrorSink.error("nothing listening");
        assert!(!is_sentry_enabled());
    }

    #[test]
    fn test_sentry_disabled_without_dsn() {
        assert!(!init_sentry(None, None));
        assert!(!init_sentry(Some(""), Some("test")));
    }
}
