#![forbid(unsafe_code)]

// Metrics reporting - periodic snapshots while running, summary block at the end

use crate::control_plane::CleanupSummary;
use crate::metrics::{FleetMetrics, MetricsSnapshot};
use crate::session::SessionReport;
use crate::stop::StopListener;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Logs a snapshot every `period` until the stop signal fires. Takes no
/// snapshot on the way out; the coordinator prints the final one.
pub async fn run_periodic(metrics: FleetMetrics, period: Duration, mut stop: StopListener) {
    let started = Instant::now();
    let mut ticker = interval_at(started + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.stopped() => break,
            _ = ticker.tick() => {
                log_snapshot(&metrics.snapshot(), started.elapsed());
            }
        }
    }
}

pub fn log_snapshot(snap: &MetricsSnapshot, elapsed: Duration) {
    info!(
        "[{}] Established: {}, Active: {}, Failed: {}, Messages: {}, Errors: {}",
        format_elapsed(elapsed),
        snap.established,
        snap.active,
        snap.failed,
        snap.messages_received,
        snap.errors
    );
}

/// `HH:MM:SS`, hours unbounded.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub fn print_summary(
    requested: usize,
    snap: &MetricsSnapshot,
    elapsed: Duration,
    passed: bool,
    sessions: &[SessionReport],
    cleanup: Option<&CleanupSummary>,
) {
    println!("\n=== Ground Station Link Load Test Results ===");
    println!("Duration: {}", format_elapsed(elapsed));
    println!("Requested Clients: {}", requested);
    println!("Established: {}", snap.established);
    println!("Failed: {}", snap.failed);
    println!("Active at end: {}", snap.active);
    println!("Messages Received: {}", snap.messages_received);
    println!("Errors: {}", snap.errors);

    let unfinished: Vec<&SessionReport> = sessions
        .iter()
        .filter(|s| s.state != crate::session::SessionState::Closed)
        .collect();
    if !unfinished.is_empty() {
        println!("\nSessions not closed cleanly:");
        for s in unfinished {
            println!("  client-{} ({}): {}, {} messages", s.client_id, s.name, s.state, s.messages_received);
        }
    }

    if let Some(cleanup) = cleanup {
        println!("\nCleanup: {} deleted, {} failed", cleanup.deleted, cleanup.failed);
    }

    if passed {
        println!("\nPASS: all {} clients connected with no errors", requested);
    } else {
        println!("\nFAIL: load test did not meet criteria");
    }
    println!("=============================================\n");
}
