//! Long-running pipeline: scheduler, consumer and statistics writer as tokio
//! tasks sharing one cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::app::{AppContext, Result};
use crate::consumer::Consumer;
use crate::stats::StatisticsWriter;
use crate::store::Store;

pub struct Daemon {
    ctx: Arc<AppContext>,
    run_for: Option<Duration>,
}

impl Daemon {
    /// `run_for` stops the daemon after that long; `None` runs until a signal.
    pub fn new(ctx: Arc<AppContext>, run_for: Option<Duration>) -> Self {
        Self { ctx, run_for }
    }

    /// Run until SIGINT/SIGTERM (ctrl-c on Windows) or the run duration elapses.
    pub async fn run(&self) -> Result<()> {
        let cancel = CancellationToken::new();
        spawn_signal_handler(cancel.clone())?;
        self.run_until(cancel).await
    }

    /// Run until `cancel` fires, then wait for every task to finish.
    pub async fn run_until(&self, cancel: CancellationToken) -> Result<()> {
        if let Some(run_for) = self.run_for {
            info!(duration = %format_duration(run_for), "Daemon will stop after duration");
            let timer = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = timer.cancelled() => {}
                    _ = sleep(run_for) => {
                        info!("Run duration elapsed");
                        timer.cancel();
                    }
                }
            });
        }

        info!(
            sources = self.ctx.scheduler.source_count(),
            pid = std::process::id(),
            "postwatch started"
        );

        let mut tasks = JoinSet::new();

        let scheduler = self.ctx.scheduler.clone();
        let token = cancel.clone();
        tasks.spawn(async move { scheduler.run(token).await });

        let consumer = Consumer::new(
            self.ctx.feed.clone(),
            self.ctx.store.clone(),
            self.ctx.config.consumer.clone(),
        );
        let token = cancel.clone();
        tasks.spawn(async move { consumer.run(token).await });

        if self.ctx.config.statistics.enabled {
            let writer =
                StatisticsWriter::new(self.ctx.store.clone(), self.ctx.config.statistics.clone());
            let token = cancel.clone();
            tasks.spawn(async move { writer.run(token).await });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Task failed: {}", e);
                cancel.cancel();
            }
        }

        let stored = self.ctx.store.get_all_posts().map(|p| p.len()).unwrap_or(0);
        info!(stored_posts = stored, "postwatch stopped");
        Ok(())
    }
}

#[cfg(unix)]
fn spawn_signal_handler(cancel: CancellationToken) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });

    Ok(())
}

#[cfg(windows)]
fn spawn_signal_handler(cancel: CancellationToken) -> Result<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received ctrl-c"),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });

    Ok(())
}

/// Parse a duration like "30s", "5m", "1h", "1d" or plain seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim().to_lowercase();

    let (value, unit, scale) = if let Some(hours) = s.strip_suffix('h') {
        (hours, "hours", 3600)
    } else if let Some(minutes) = s.strip_suffix('m') {
        (minutes, "minutes", 60)
    } else if let Some(days) = s.strip_suffix('d') {
        (days, "days", 86400)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, "seconds", 1)
    } else {
        let secs = s
            .parse::<u64>()
            .map_err(|_| format!("Invalid duration: {}. Use format like '30s', '5m', '1h'", s))?;
        return Ok(Duration::from_secs(secs));
    };

    let secs = value
        .parse::<u64>()
        .map_err(|_| format!("Invalid {}: {}", unit, value))?
        .checked_mul(scale)
        .ok_or_else(|| format!("Duration too large: {}", s))?;

    Ok(Duration::from_secs(secs))
}

/// Format a duration with the largest whole unit.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 86400 && secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
