#![forbid(unsafe_code)]

// Fleet coordinator - provisions, launches, stops, joins and cleans up

use crate::config::FleetConfig;
use crate::control_plane::{CleanupSummary, ControlPlaneClient, Provisioner};
use crate::error::LinkResult;
use crate::metrics::{FleetMetrics, MetricsSnapshot};
use crate::reporter;
use crate::session::{Session, SessionReport, SessionState};
use crate::stop::StopSignal;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{error, info, warn};

/// Outcome of one fleet run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetReport {
    pub requested: usize,
    pub snapshot: MetricsSnapshot,
    pub passed: bool,
    pub sessions: Vec<SessionReport>,
    pub cleanup: Option<CleanupSummary>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl FleetReport {
    pub fn print_summary(&self) {
        reporter::print_summary(
            self.requested,
            &self.snapshot,
            self.elapsed,
            self.passed,
            &self.sessions,
            self.cleanup.as_ref(),
        );
    }
}

/// Pass iff every requested session was established and nothing failed or errored.
pub fn verdict(snap: &MetricsSnapshot, requested: usize) -> bool {
    snap.failed == 0 && snap.errors == 0 && snap.established == requested as u64
}

struct LaunchedSession {
    client_id: usize,
    name: String,
    handle: JoinHandle<SessionReport>,
}

pub struct FleetCoordinator {
    config: FleetConfig,
    metrics: FleetMetrics,
    stop: StopSignal,
    control_plane: ControlPlaneClient,
}

impl FleetCoordinator {
    pub fn new(config: FleetConfig, metrics: FleetMetrics) -> LinkResult<Self> {
        let control_plane = ControlPlaneClient::new(&config.base_url)?;
        Ok(Self {
            config,
            metrics,
            stop: StopSignal::new(),
            control_plane,
        })
    }

    /// Handle for stopping the run from outside. Triggering it early ends the
    /// run the same way the duration elapsing does.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Runs for the configured duration.
    pub async fn run(self) -> LinkResult<FleetReport> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Runs until the configured duration elapses, `interrupt` completes or the
    /// stop signal is triggered, whichever comes first.
    ///
    /// Fails only when provisioning fails; no session is launched in that case
    /// and nothing is cleaned up.
    pub async fn run_until<F>(self, interrupt: F) -> LinkResult<FleetReport>
    where
        F: Future<Output = ()>,
    {
        let requested = self.config.clients;
        info!("Starting load test with {} clients for {:?}", requested, self.config.duration);

        let provisioner = Provisioner::new(self.control_plane.clone(), self.config.operator_token.clone());
        let identities = match provisioner.create_identities(requested).await {
            Ok(identities) => identities,
            Err(e) => {
                error!("Failed to create ground stations: {}", e);
                return Err(e);
            }
        };

        let started = Instant::now();
        let reporter = tokio::spawn(reporter::run_periodic(
            self.metrics.clone(),
            self.config.report_interval,
            self.stop.subscribe(),
        ));

        tokio::pin!(interrupt);
        let mut external_stop = self.stop.subscribe();
        let session_config = self.config.session_config();
        let mut launched = Vec::with_capacity(identities.len());
        let mut interrupted = false;

        for (index, identity) in identities.iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = &mut interrupt => { interrupted = true; break; }
                    _ = external_stop.stopped() => { interrupted = true; break; }
                    _ = sleep(self.config.stagger) => {}
                }
            }

            let client_id = index + 1;
            let session = Session::new(
                client_id,
                identity.clone(),
                self.control_plane.clone(),
                session_config.clone(),
                self.metrics.clone(),
                self.stop.subscribe(),
            );
            launched.push(LaunchedSession {
                client_id,
                name: identity.name.clone(),
                handle: tokio::spawn(session.run()),
            });
        }
        info!("Launched {} of {} sessions", launched.len(), identities.len());

        if interrupted {
            info!("Interrupted while launching sessions");
        } else {
            tokio::select! {
                _ = sleep(self.config.duration) => info!("Test duration elapsed"),
                _ = &mut interrupt => info!("Received interrupt signal, shutting down..."),
                _ = external_stop.stopped() => info!("Stop requested, shutting down..."),
            }
        }

        if self.stop.trigger() {
            info!("Stop signal sent to {} sessions", launched.len());
        }

        let sessions = self.join_sessions(launched).await;
        if let Err(e) = reporter.await {
            warn!("Reporter task ended abnormally: {}", e);
        }

        let snapshot = self.metrics.snapshot();
        let elapsed = started.elapsed();
        reporter::log_snapshot(&snapshot, elapsed);
        let passed = verdict(&snapshot, requested);
        if passed {
            info!("Verdict: PASS");
        } else {
            warn!("Verdict: FAIL");
        }

        let cleanup = if self.config.cleanup {
            Some(provisioner.delete_identities(&identities).await)
        } else {
            info!("Cleanup disabled, leaving {} ground stations in place", identities.len());
            None
        };

        Ok(FleetReport {
            requested,
            snapshot,
            passed,
            sessions,
            cleanup,
            elapsed,
        })
    }

    /// Waits for every session against one shared deadline. Sessions still
    /// running at the deadline are aborted and counted as failed.
    async fn join_sessions(&self, launched: Vec<LaunchedSession>) -> Vec<SessionReport> {
        let deadline = Instant::now() + self.config.shutdown_grace;
        let mut reports = Vec::with_capacity(launched.len());

        for mut session in launched {
            let report = match timeout_at(deadline, &mut session.handle).await {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    error!("client-{} ({}): session task ended abnormally: {}", session.client_id, session.name, e);
                    self.metrics.record_abandoned();
                    abandoned_report(&session)
                }
                Err(_) => {
                    warn!(
                        "client-{} ({}): still running after {:?}, aborting",
                        session.client_id, session.name, self.config.shutdown_grace
                    );
                    session.handle.abort();
                    // Wait for the abort so the session's active slot is released
                    let _ = (&mut session.handle).await;
                    self.metrics.record_abandoned();
                    abandoned_report(&session)
                }
            };
            reports.push(report);
        }

        reports
    }
}

fn abandoned_report(session: &LaunchedSession) -> SessionReport {
    SessionReport {
        client_id: session.client_id,
        name: session.name.clone(),
        state: SessionState::Failed,
        messages_received: 0,
    }
}
