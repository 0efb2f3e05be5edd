//! Run progress reporting
//!
//! One run id threads through every phase-boundary log line so a run can
//! be followed end to end, and balances are reported at the same points
//! the operator would check them by hand.

use crate::settlement::{BalanceSnapshot, SettlementReport};

use ethers::types::U256;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Orchestration phases in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Deployment,
    Funding,
    Topology,
    Initiation,
    Settlement,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Deployment => "deployment",
            Phase::Funding => "funding",
            Phase::Topology => "topology",
            Phase::Initiation => "initiation",
            Phase::Settlement => "settlement",
        }
    }
}

/// Timing handle for one phase, closed by `phase_completed`
pub struct PhaseSpan {
    phase: Phase,
    started: Instant,
}

pub struct ProgressReporter {
    run_id: Uuid,
    started: Instant,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, "Orchestration run starting");
        Self {
            run_id,
            started: Instant::now(),
        }
    }

    pub fn phase_started(&self, phase: Phase) -> PhaseSpan {
        info!(run_id = %self.run_id, phase = phase.as_str(), "Phase started");
        PhaseSpan {
            phase,
            started: Instant::now(),
        }
    }

    pub fn phase_completed(&self, span: PhaseSpan) {
        let elapsed = span.started.elapsed();
        info!(
            run_id = %self.run_id,
            phase = span.phase.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Phase completed"
        );
        crate::metrics::record_phase_duration(span.phase.as_str(), elapsed.as_secs_f64());
    }

    /// Report an account balance at a phase boundary
    pub fn balance(&self, label: &str, chain: &str, balance: U256) {
        info!(
            run_id = %self.run_id,
            chain,
            label,
            balance = %balance,
            "Balance report"
        );
    }

    pub fn settled(&self, snapshot: &BalanceSnapshot, report: &SettlementReport) {
        info!(
            run_id = %self.run_id,
            chain = %snapshot.chain,
            from = %snapshot.value,
            to = %report.final_balance,
            polls = report.polls,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Transfer settled"
        );
    }

    pub fn finished(&self) {
        info!(
            run_id = %self.run_id,
            total_elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Orchestration run finished"
        );
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
