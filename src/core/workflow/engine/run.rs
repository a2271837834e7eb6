use crate::core::workflow::function::CancelSignal;
use conductor_types::{InstanceId, WorkflowInstance};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;

/// Live state of one instance whose scheduling loop is running in this process.
///
/// The async mutex guards the instance and serializes its persistence writes.
pub(crate) struct RunHandle {
    pub(crate) instance_id: InstanceId,
    pub(crate) state: Mutex<WorkflowInstance>,
    pub(crate) wake: Notify,
    cancel_tx: watch::Sender<bool>,
    shutdown: AtomicBool,
    join: StdMutex<Option<JoinHandle<()>>>,
}

impl RunHandle {
    pub(crate) fn new(instance: WorkflowInstance) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            instance_id: instance.instance_id,
            state: Mutex::new(instance),
            wake: Notify::new(),
            cancel_tx,
            shutdown: AtomicBool::new(false),
            join: StdMutex::new(None),
        }
    }

    pub(crate) fn cancel_signal(&self) -> CancelSignal {
        CancelSignal::new(self.cancel_tx.subscribe())
    }

    /// Flip the flag task functions observe through [`CancelSignal`].
    pub(crate) fn signal_cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.signal_cancel();
        self.wake.notify_one();
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn set_join(&self, handle: JoinHandle<()>) {
        let mut slot = self.join.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(handle);
    }

    pub(crate) fn take_join(&self) -> Option<JoinHandle<()>> {
        self.join
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}
