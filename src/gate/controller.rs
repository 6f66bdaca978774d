//! Per-lane gate state machine with autonomous close

use crate::actuator::Servo;
use crate::diagnostics::Diagnostics;
use anyhow::Result;
use gate_shared::{GateState, Lane, RetriggerPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Angles and timing of one gate
#[derive(Debug, Clone, Copy)]
pub struct GateSettings {
    pub open_angle: u32,
    pub closed_angle: u32,
    pub dwell: Duration,
    pub retrigger: RetriggerPolicy,
}

/// Close bookkeeping, guarded by the gate lock
#[derive(Debug, Default)]
struct CloseSlot {
    state: GateState,
    /// Close tasks scheduled and not yet finished
    outstanding: usize,
    /// Most recently scheduled close
    pending: Option<(u64, JoinHandle<()>)>,
    next_id: u64,
}

struct GateInner {
    lane: Lane,
    settings: GateSettings,
    servo: Servo,
    diagnostics: Arc<Diagnostics>,
    slot: Mutex<CloseSlot>,
}

/// Drives one lane's servo
///
/// State changes and servo writes happen under one per-gate lock, so the
/// dispatch path and close tasks never interleave a write with a state update.
#[derive(Clone)]
pub struct GateController {
    inner: Arc<GateInner>,
}

impl GateController {
    pub fn new(
        lane: Lane,
        settings: GateSettings,
        servo: Servo,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                lane,
                settings,
                servo,
                diagnostics,
                slot: Mutex::new(CloseSlot::default()),
            }),
        }
    }

    pub fn lane(&self) -> Lane {
        self.inner.lane
    }

    pub async fn state(&self) -> GateState {
        self.inner.slot.lock().await.state
    }

    /// Close tasks currently scheduled
    pub async fn pending_closes(&self) -> usize {
        self.inner.slot.lock().await.outstanding
    }

    /// Configure the servo channel and move it to the closed angle
    pub async fn init(&self, period_us: u32) -> Result<()> {
        let inner = &self.inner;
        let _slot = inner.slot.lock().await;
        inner.servo.init(period_us)?;
        inner.servo.set_angle(inner.settings.closed_angle)?;
        info!(
            "[GATE] {} gate servo '{}' on channel {} positioned closed ({} deg)",
            inner.lane,
            inner.servo.name(),
            inner.servo.channel(),
            inner.settings.closed_angle
        );
        Ok(())
    }

    /// Open the gate and schedule its close
    pub async fn open(&self) {
        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;
        let label = inner.lane.label();

        inner
            .diagnostics
            .snapshot(&format!("Before open {} gate", label));
        info!("[GATE] Opening {} gate...", inner.lane);
        if let Err(e) = inner.servo.set_angle(inner.settings.open_angle) {
            error!("[GATE] Failed to open {} gate: {:#}", inner.lane, e);
        }
        inner
            .diagnostics
            .snapshot(&format!("After open {} gate", label));

        if inner.settings.retrigger == RetriggerPolicy::Replace {
            if let Some((id, handle)) = slot.pending.take() {
                handle.abort();
                slot.outstanding -= 1;
                debug!("[GATE] {} close #{} replaced", inner.lane, id);
            }
        }

        let id = slot.next_id;
        slot.next_id += 1;
        slot.outstanding += 1;
        slot.state = GateState::OpenPendingClose;

        let task_inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(task_inner.settings.dwell).await;
            task_inner.close(id).await;
        });
        // Overlap keeps earlier closes running detached
        slot.pending = Some((id, handle));

        debug!(
            "[GATE] {} close #{} scheduled in {:?} ({} outstanding)",
            inner.lane, id, inner.settings.dwell, slot.outstanding
        );
    }
}

impl GateInner {
    /// Timer expiry for close task `id`
    async fn close(&self, id: u64) {
        let mut slot = self.slot.lock().await;
        let label = self.lane.label();

        self.diagnostics
            .snapshot(&format!("Before close {} gate", label));
        info!("[GATE] Closing {} gate...", self.lane);
        if let Err(e) = self.servo.set_angle(self.settings.closed_angle) {
            error!("[GATE] Failed to close {} gate: {:#}", self.lane, e);
        }
        self.diagnostics
            .snapshot(&format!("After close {} gate", label));

        slot.outstanding = slot.outstanding.saturating_sub(1);
        if slot.pending.as_ref().map(|(pending_id, _)| *pending_id) == Some(id) {
            slot.pending = None;
        }
        if slot.outstanding == 0 {
            slot.state = GateState::Closed;
        }
    }
}
