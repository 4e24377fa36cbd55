//! Logging setup for binaries embedding the retry helper.
//!
//! Records go to `~/.local/state/retryx/retryx.log` when the state dir is
//! writable, otherwise to stderr. `RUST_LOG` overrides the default filter.
//!
//! The default filter also enables every level inside a `retry` span once
//! the call has forced tracing (an auto-trace retry), so the retried
//! attempt logs the diagnostics the first one did not.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,retryx=debug,retryx_core=debug";
const VERBOSE_FILTER: &str = "debug";
/// Span-field directive matching scopes whose tracing was forced.
const FORCED_TRACE_DIRECTIVE: &str = "[retry{forced=true}]=trace";

/// Where log records are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
}

/// Default log file under the XDG state dir.
pub fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("retryx")?;
    Ok(xdg_dirs.get_state_home().join("retryx.log"))
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> EnvFilter {
    let base = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    EnvFilter::new(format!("{base},{FORCED_TRACE_DIRECTIVE}"))
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose))
}

/// Install the global subscriber writing to `target`.
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init(target: &LogTarget, verbose: bool) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_ansi(false);
    match target {
        LogTarget::File(path) => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("create log dir {}", dir.display()))?;
            }
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            builder
                .with_writer(Arc::new(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?;
            tracing::info!("retryx logging initialized at {}", path.display());
        }
        LogTarget::Stderr => {
            builder
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?;
        }
    }
    Ok(())
}

/// Log to the default file, falling back to stderr when that is not possible.
pub fn init_logging(verbose: bool) -> LogTarget {
    let file_target = log_file_path().map(LogTarget::File);
    if let Ok(target) = &file_target {
        if init(target, verbose).is_ok() {
            return target.clone();
        }
    }
    // A second init only fails if a subscriber is already installed, which
    // is fine: records still go somewhere.
    let _ = init(&LogTarget::Stderr, verbose);
    LogTarget::Stderr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::config::RetryConfig;
    use crate::retry::{Options, RetryHelper};
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn forced_trace_enables_debug_only_on_traced_attempt() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(default_filter(false))
            .with_ansi(false)
            .with_writer({
                let capture = capture.clone();
                move || capture.clone()
            })
            .finish();

        let config = RetryConfig {
            max_wait_secs: 0.001,
            jitter_millis: 0,
            retry_with_trace_on_failure: true,
            ..RetryConfig::default()
        };
        let helper = RetryHelper::new(&config).unwrap();
        let opts = Options::new().with_retry_with_trace(|_| true);

        let mut attempt = 0;
        let result = tracing::subscriber::with_default(subscriber, || {
            helper.execute(
                ActionKind::ChangeUpdate,
                || {
                    attempt += 1;
                    tracing::debug!(target: "work", "work diagnostic on attempt {}", attempt);
                    if attempt == 1 {
                        anyhow::bail!("index out of sync");
                    }
                    Ok(attempt)
                },
                &opts,
                |_| false,
            )
        });

        assert_eq!(result.unwrap(), 2);
        let out = capture.contents();
        assert!(out.contains("retry with tracing enabled"), "{out}");
        assert!(!out.contains("work diagnostic on attempt 1"), "{out}");
        assert!(out.contains("work diagnostic on attempt 2"), "{out}");
    }

    #[test]
    fn default_filter_carries_forced_trace_directive() {
        for verbose in [false, true] {
            let rendered = default_filter(verbose).to_string();
            assert!(rendered.contains("retry"), "{rendered}");
            assert!(rendered.contains("forced"), "{rendered}");
        }
    }

    #[test]
    fn log_file_lives_under_retryx_state_dir() {
        if let Ok(path) = log_file_path() {
            assert!(path.ends_with("retryx.log"));
            assert!(path.to_string_lossy().contains("retryx"));
        }
    }

    #[test]
    fn unwritable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as the log file.
        let target = LogTarget::File(dir.path().to_path_buf());
        assert!(init(&target, false).is_err());
    }
}
