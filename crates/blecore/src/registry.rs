//! Background task registry keyed by connection epoch.
//!
//! Every task spawned on behalf of a connection is registered here together
//! with the [`Epoch`] it belongs to. [`TaskRegistry::cancel_all`] cancels
//! every task of the current epoch and advances the epoch, so a task from an
//! old connection can neither register new work nor publish data: both
//! [`TaskRegistry::spawn`] and [`TaskRegistry::emit_if_current`] check the
//! epoch under the registry lock.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Generation counter for connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a registered task does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Maps low-level link state onto connection status.
    StateObserver,
    /// Battery level notification subscription.
    BatterySubscription,
    /// One-shot device information read.
    DeviceInfo,
    /// Periodic signal strength polling.
    RssiPoll,
}

struct BackgroundTask {
    kind: TaskKind,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Idempotent.
    fn cancel(&self) {
        self.token.cancel();
        self.handle.abort();
    }

    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

struct RegistryState {
    epoch: Epoch,
    root: CancellationToken,
    tasks: Vec<BackgroundTask>,
}

/// Tracks the cancelable tasks spawned for the current connection.
pub struct TaskRegistry {
    runtime: Handle,
    state: Mutex<RegistryState>,
}

impl TaskRegistry {
    /// Create an empty registry that spawns onto `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            state: Mutex::new(RegistryState {
                epoch: Epoch(0),
                root: CancellationToken::new(),
                tasks: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current epoch and its cancellation token.
    ///
    /// The token is cancelled by the next [`cancel_all`](Self::cancel_all).
    pub fn current(&self) -> (Epoch, CancellationToken) {
        let state = self.lock();
        (state.epoch, state.root.clone())
    }

    /// Whether `epoch` is still the current one.
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.lock().epoch == epoch
    }

    /// Spawn a task for `epoch`.
    ///
    /// `task` receives a token that is cancelled on teardown; the spawned
    /// future is also dropped at that point. Returns `false` without
    /// spawning if `epoch` is no longer current.
    pub fn spawn<F, Fut>(&self, epoch: Epoch, kind: TaskKind, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.lock();
        if state.epoch != epoch {
            debug!(%epoch, current = %state.epoch, ?kind, "Refusing to spawn task for stale epoch");
            return false;
        }
        state.tasks.retain(|t| !t.is_finished());

        let token = state.root.child_token();
        let fut = task(token.clone());
        let guard = token.clone();
        let handle = self.runtime.spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = fut => {}
            }
        });
        state.tasks.push(BackgroundTask {
            kind,
            token,
            handle,
        });
        true
    }

    /// Like [`spawn`](Self::spawn), but first cancels any task of the same kind.
    pub fn replace<F, Fut>(&self, epoch: Epoch, kind: TaskKind, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        {
            let mut state = self.lock();
            if state.epoch != epoch {
                return false;
            }
            state.tasks.retain(|t| {
                if t.kind == kind {
                    t.cancel();
                    false
                } else {
                    true
                }
            });
        }
        self.spawn(epoch, kind, task)
    }

    /// Cancel every registered task, clear the registry and advance the epoch.
    ///
    /// Idempotent. Returns the new epoch.
    pub fn cancel_all(&self) -> Epoch {
        let mut state = self.lock();
        state.root.cancel();
        let cancelled = state.tasks.len();
        for task in state.tasks.drain(..) {
            task.cancel();
        }
        state.epoch = Epoch(state.epoch.0 + 1);
        state.root = CancellationToken::new();
        debug!(cancelled, epoch = %state.epoch, "Cancelled background tasks");
        state.epoch
    }

    /// Run `emit` only if `epoch` is still current.
    ///
    /// `emit` runs while the registry is locked, so it cannot interleave with
    /// [`cancel_all`](Self::cancel_all). It must not call back into the registry.
    pub fn emit_if_current(&self, epoch: Epoch, emit: impl FnOnce()) -> bool {
        let state = self.lock();
        if state.epoch != epoch {
            return false;
        }
        emit();
        true
    }

    /// Number of registered tasks that are still running.
    pub fn active(&self) -> usize {
        self.lock().tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Kinds of the registered tasks that are still running.
    pub fn kinds(&self) -> Vec<TaskKind> {
        self.lock()
            .tasks
            .iter()
            .filter(|t| !t.is_finished())
            .map(|t| t.kind)
            .collect()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("TaskRegistry")
            .field("epoch", &state.epoch)
            .field("tasks", &state.tasks.len())
            .finish()
    }
}
