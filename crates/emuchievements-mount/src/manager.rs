//! Mount manager: applies an ordered set of mounts and reverses them.
//!
//! The `MountManager` is the only component that changes host state. Mounts
//! are applied one at a time in declaration order; each success is pushed onto
//! the applied stack before the next mount starts, so a failure at mount *k*
//! still leaves 1..k-1 recorded for reversal. Teardown pops that stack in
//! LIFO order. Per-mount failures are logged and collected, never propagated
//! to sibling mounts.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use crate::config::{ActivationPolicy, MountConfig};
use crate::error::MountError;
use crate::events::{EventBus, MOUNTS_ACTIVE, MOUNTS_TORN_DOWN};
use crate::guard::guard_async;
use crate::host::{HostRouter, RenderProvider};
use crate::mount::{Mount, MountKind, Teardown};
use crate::page::PageMount;
use crate::patch::PatchMount;

/// Lifecycle of one manager instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Registering,
    Active,
    Unregistering,
    TornDown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Registering => "registering",
            Phase::Active => "active",
            Phase::Unregistering => "unregistering",
            Phase::TornDown => "torn down",
        })
    }
}

/// Identifies one mount in logs and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountRecord {
    /// Position in declaration order.
    pub index: usize,
    pub kind: MountKind,
    pub label: String,
}

impl fmt::Display for MountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} ({})", self.index, self.label, self.kind)
    }
}

#[derive(Debug)]
pub struct FailedMount {
    pub record: MountRecord,
    pub error: MountError,
}

/// What `register()` did.
#[derive(Debug, Default)]
pub struct RegistrationReport {
    /// Successfully applied mounts, in application order.
    pub applied: Vec<MountRecord>,
    pub failed: Vec<FailedMount>,
    /// Mounts never attempted because teardown was requested mid-registration.
    pub skipped: Vec<MountRecord>,
}

/// What teardown did.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Reverted mounts, in reversal order.
    pub reverted: Vec<MountRecord>,
    pub failed: Vec<FailedMount>,
}

struct AppliedMount {
    record: MountRecord,
    mount: Arc<dyn Mount>,
    state: Teardown,
}

struct Inner {
    phase: Phase,
    pending: Vec<Arc<dyn Mount>>,
    applied: Vec<AppliedMount>,
    /// Set by the first unregister call; any later call is rejected.
    teardown_claimed: bool,
    /// Asks an in-flight `register()` to stop after the current mount.
    teardown_requested: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    phase_tx: watch::Sender<Phase>,
    bus: EventBus,
    router: Arc<dyn HostRouter>,
    config: MountConfig,
}

impl Shared {
    fn set_phase(&self, inner: &mut Inner, phase: Phase) {
        tracing::debug!(from = %inner.phase, to = %phase, "mount manager phase change");
        inner.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    fn invalid(operation: &'static str, phase: Phase) -> MountError {
        tracing::error!(operation = %operation, phase = %phase, "mount manager contract violation");
        MountError::InvalidState { operation, phase }
    }

    async fn teardown(&self) -> TeardownReport {
        let applied = {
            let mut inner = self.inner.lock();
            self.set_phase(&mut inner, Phase::Unregistering);
            std::mem::take(&mut inner.applied)
        };

        let mut report = TeardownReport::default();
        for entry in applied.into_iter().rev() {
            let AppliedMount {
                record,
                mount,
                state,
            } = entry;
            match guard_async("unmount", mount.unmount(state)).await {
                Ok(()) => {
                    tracing::debug!(
                        mount_index = record.index,
                        mount_kind = %record.kind,
                        mount = %record.label,
                        "mount reverted"
                    );
                    report.reverted.push(record);
                }
                Err(e) => {
                    tracing::error!(
                        mount_index = record.index,
                        mount_kind = %record.kind,
                        mount = %record.label,
                        "unmount failed: {e}"
                    );
                    report.failed.push(FailedMount { record, error: e });
                }
            }
        }

        {
            let mut inner = self.inner.lock();
            self.set_phase(&mut inner, Phase::TornDown);
        }

        tracing::info!(
            reverted = report.reverted.len(),
            failed = report.failed.len(),
            "mounts torn down"
        );
        let payload = serde_json::json!({
            "reverted": &report.reverted,
            "failed": report.failed.len(),
        });
        self.bus.publish(MOUNTS_TORN_DOWN, &payload);
        report
    }

    async fn unregister(&self) -> Result<TeardownReport, MountError> {
        let mut phase_rx = self.phase_tx.subscribe();
        {
            let mut inner = self.inner.lock();
            let phase = inner.phase;
            match phase {
                Phase::Idle | Phase::Unregistering | Phase::TornDown => {
                    return Err(Self::invalid("unregister", phase));
                }
                _ if inner.teardown_claimed => {
                    return Err(Self::invalid("unregister", phase));
                }
                Phase::Registering => {
                    tracing::info!("teardown requested while registering, waiting for in-flight mount");
                    inner.teardown_claimed = true;
                    inner.teardown_requested = true;
                }
                Phase::Active => inner.teardown_claimed = true,
            }
        }

        let settled = phase_rx
            .wait_for(|phase| matches!(phase, Phase::Active | Phase::TornDown))
            .await
            .map(|phase| *phase);
        if let Ok(Phase::TornDown) = settled {
            // A fail-fast rollback already reverted everything.
            return Ok(TeardownReport::default());
        }

        Ok(self.teardown().await)
    }
}

/// Orchestrates an ordered collection of mounts.
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct MountManager {
    shared: Arc<Shared>,
}

impl fmt::Debug for MountManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("MountManager")
            .field("phase", &inner.phase)
            .field("pending", &inner.pending.len())
            .field("applied", &inner.applied.len())
            .finish()
    }
}

impl MountManager {
    pub fn new(bus: EventBus, router: Arc<dyn HostRouter>, config: MountConfig) -> Self {
        let (phase_tx, _) = watch::channel(Phase::Idle);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    phase: Phase::Idle,
                    pending: Vec::new(),
                    applied: Vec::new(),
                    teardown_claimed: false,
                    teardown_requested: false,
                }),
                phase_tx,
                bus,
                router,
                config,
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    pub fn phase(&self) -> Phase {
        self.shared.inner.lock().phase
    }

    /// Watch phase changes, starting from the current phase.
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.shared.phase_tx.subscribe()
    }

    /// Records of the currently applied mounts, in application order.
    pub fn applied(&self) -> Vec<MountRecord> {
        self.shared
            .inner
            .lock()
            .applied
            .iter()
            .map(|a| a.record.clone())
            .collect()
    }

    /// Number of mounts declared so far.
    pub fn declared(&self) -> usize {
        self.shared.inner.lock().pending.len()
    }

    /// Append a mount to the sequence. Only allowed before `register()`.
    pub fn add_mount(&self, mount: impl Mount + 'static) -> Result<(), MountError> {
        let mut inner = self.shared.inner.lock();
        if inner.phase != Phase::Idle {
            return Err(Shared::invalid("add a mount", inner.phase));
        }
        tracing::debug!(
            mount_index = inner.pending.len(),
            mount_kind = %mount.kind(),
            mount = %mount.label(),
            "mount declared"
        );
        inner.pending.push(Arc::new(mount));
        Ok(())
    }

    /// Declare a route registration with the manager's router.
    pub fn add_page_mount(&self, path: &str, provider: RenderProvider) -> Result<(), MountError> {
        let page = PageMount::new(self.shared.router.clone(), path, provider);
        self.add_mount(page)
    }

    pub fn add_patch_mount(&self, patch: PatchMount) -> Result<(), MountError> {
        self.add_mount(patch)
    }

    /// Apply every declared mount, in order, once.
    ///
    /// Returns the handle that reverses this activation. Under
    /// [`ActivationPolicy::FailFast`] the first failure rolls back what was
    /// applied and yields [`MountError::ActivationAborted`].
    pub async fn register(&self) -> Result<Unregister, MountError> {
        let shared = &self.shared;
        let mounts = {
            let mut inner = shared.inner.lock();
            if inner.phase != Phase::Idle {
                return Err(Shared::invalid("register", inner.phase));
            }
            shared.set_phase(&mut inner, Phase::Registering);
            std::mem::take(&mut inner.pending)
        };

        let policy = shared.config.activation_policy;
        tracing::info!(mounts = mounts.len(), policy = %policy, "registering mounts");

        let mut report = RegistrationReport::default();
        let total = mounts.len();
        for (index, mount) in mounts.into_iter().enumerate() {
            let record = MountRecord {
                index,
                kind: mount.kind(),
                label: mount.label(),
            };

            if shared.inner.lock().teardown_requested {
                tracing::warn!(mount_index = index, mount = %record.label, "skipping mount, teardown requested");
                report.skipped.push(record);
                continue;
            }

            let outcome = guard_async("mount", mount.mount()).await;
            match outcome {
                Ok(state) => {
                    tracing::debug!(
                        mount_index = index,
                        mount_kind = %record.kind,
                        mount = %record.label,
                        "mount applied"
                    );
                    shared.inner.lock().applied.push(AppliedMount {
                        record: record.clone(),
                        mount,
                        state,
                    });
                    report.applied.push(record);
                }
                Err(e) => {
                    tracing::error!(
                        mount_index = index,
                        mount_kind = %record.kind,
                        mount = %record.label,
                        "mount failed: {e}"
                    );
                    if policy == ActivationPolicy::FailFast {
                        tracing::warn!(
                            mount_index = index,
                            remaining = total - index - 1,
                            "fail-fast activation, rolling back"
                        );
                        shared.teardown().await;
                        return Err(MountError::ActivationAborted {
                            index,
                            label: record.label,
                            source: Box::new(e),
                        });
                    }
                    report.failed.push(FailedMount { record, error: e });
                }
            }
        }

        {
            let mut inner = shared.inner.lock();
            shared.set_phase(&mut inner, Phase::Active);
        }

        tracing::info!(
            applied = report.applied.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "mounts registered"
        );
        let failed: Vec<&MountRecord> = report.failed.iter().map(|f| &f.record).collect();
        let payload = serde_json::json!({
            "applied": &report.applied,
            "failed": failed,
        });
        shared.bus.publish(MOUNTS_ACTIVE, &payload);

        Ok(Unregister {
            shared: self.shared.clone(),
            report,
        })
    }

    /// Reverse the current activation.
    ///
    /// Rejected before `register()` and after teardown. If registration is
    /// still running, no further mounts are started and teardown begins once
    /// the in-flight mount settles.
    pub async fn unregister(&self) -> Result<TeardownReport, MountError> {
        self.shared.unregister().await
    }
}

/// Reverses one activation; obtained from [`MountManager::register`].
pub struct Unregister {
    shared: Arc<Shared>,
    report: RegistrationReport,
}

impl fmt::Debug for Unregister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unregister")
            .field("applied", &self.report.applied.len())
            .finish_non_exhaustive()
    }
}

impl Unregister {
    pub fn report(&self) -> &RegistrationReport {
        &self.report
    }

    /// Revert every applied mount in reverse order. A second call is rejected.
    pub async fn unregister(&self) -> Result<TeardownReport, MountError> {
        self.shared.unregister().await
    }
}
