// src/bin/ivr_watch.rs
//
// Terminal watcher for the live dashboard tiles: polls active calls and the
// transcription queue and prints one line per tick, plus the error rate for
// the chosen filters.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ivr_portal::client::{ApiClient, DashboardClient, Metric, QueryCache, LIVE_POLL};
use ivr_portal::filters::{FilterQuery, Filters};
use ivr_portal::routes::dashboard::infrastructure::{ErrorRate, TranscriptionQueue};
use ivr_portal::routes::dashboard::telephony::ActiveCalls;
use ivr_portal::stats::{classify, Gauge};

#[derive(Parser, Debug)]
#[command(name = "ivr-watch")]
#[command(about = "Poll the IVR portal's live metrics and print a summary per tick")]
struct Args {
    /// API root
    #[arg(long, env = "IVR_API_URL", default_value = "http://localhost:5000/api")]
    base_url: String,

    /// Seconds between polls
    #[arg(long, default_value_t = LIVE_POLL.as_secs())]
    interval: u64,

    /// Print a single line and exit
    #[arg(long)]
    once: bool,

    #[arg(long)]
    from: Option<String>,

    #[arg(long)]
    to: Option<String>,

    /// Comma separated
    #[arg(long)]
    insurance: Option<String>,

    #[arg(long)]
    practice: Option<String>,

    #[arg(long)]
    dnis: Option<String>,

    #[arg(long)]
    call_type: Option<String>,
}

impl Args {
    fn filters(&self) -> Result<Filters> {
        let query = FilterQuery {
            from: self.from.clone(),
            to: self.to.clone(),
            insurance: self.insurance.clone(),
            practice: self.practice.clone(),
            dnis: self.dnis.clone(),
            call_type: self.call_type.clone(),
        };
        query.parse().context("invalid filter")
    }
}

async fn tick(client: &DashboardClient, filters: &Filters) -> Result<String> {
    let (active, queue, errors) = tokio::try_join!(
        client.refresh::<ActiveCalls>(Metric::ActiveCalls, filters),
        client.refresh::<TranscriptionQueue>(Metric::TranscriptionQueue, filters),
        client.metric::<ErrorRate>(Metric::ErrorRate, filters),
    )?;
    Ok(summary_line(&active, &queue, &errors))
}

/// One status line, each value tagged with its threshold colour.
fn summary_line(active: &ActiveCalls, queue: &TranscriptionQueue, errors: &ErrorRate) -> String {
    format!(
        "active {}/{} ({:.1}%, {}) | queue {} (oldest {}s, {}) | errors {:.2}% of {} ({})",
        active.current,
        active.capacity,
        active.utilization_pct,
        classify(Gauge::Capacity, active.utilization_pct),
        queue.current,
        queue.avg_wait_seconds,
        classify(Gauge::TranscriptionQueue, queue.current as f64),
        errors.rate,
        errors.total_calls,
        classify(Gauge::ErrorRate, errors.rate),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ivr_watch=info,ivr_portal=warn")),
        )
        .init();

    let args = Args::parse();
    let filters = args.filters()?;
    let api = ApiClient::new(&args.base_url).context("building HTTP client")?;
    let client = DashboardClient::new(api, QueryCache::new());

    if args.once {
        println!("{}", tick(&client, &filters).await?);
        return Ok(());
    }

    tracing::info!(base_url = %args.base_url, every_secs = args.interval, "watching live metrics");
    let mut interval = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => match tick(&client, &filters).await {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "poll failed"),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("stopping");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_tags_each_value() {
        let active = ActiveCalls {
            current: 460,
            capacity: 500,
            utilization_pct: 92.0,
            status_breakdown: Vec::new(),
            history: Vec::new(),
        };
        let queue = TranscriptionQueue { current: 40, avg_wait_seconds: 125, history: Vec::new() };
        let errors = ErrorRate {
            rate: 6.5,
            total_errors: 13,
            total_calls: 200,
            trend_data: Vec::new(),
            breakdown: Vec::new(),
        };
        assert_eq!(
            summary_line(&active, &queue, &errors),
            "active 460/500 (92.0%, red) | queue 40 (oldest 125s, green) | errors 6.50% of 200 (yellow)"
        );
    }
}
