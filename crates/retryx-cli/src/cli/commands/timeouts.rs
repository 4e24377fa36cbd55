//! `retryx timeouts` – show the resolved default timeout per action kind.

use anyhow::Result;
use retryx_core::config::RetryxConfig;
use retryx_core::retry::RetryHelper;

pub fn run_timeouts(cfg: &RetryxConfig) -> Result<()> {
    let helper = RetryHelper::new(&cfg.retry)?;
    println!("{:<16} {:>10}", "ACTION", "TIMEOUT");
    for (kind, timeout) in helper.default_timeouts().iter() {
        println!("{:<16} {:>10}", kind, format!("{}ms", timeout.as_millis()));
    }
    let backoff = helper.backoff();
    println!(
        "backoff: max wait {}ms, jitter up to {}ms; auto-trace retries {}",
        backoff.max_wait().as_millis(),
        backoff.jitter().as_millis(),
        if cfg.retry.retry_with_trace_on_failure {
            "enabled"
        } else {
            "disabled"
        }
    );
    Ok(())
}
