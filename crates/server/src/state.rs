use std::sync::Arc;

use bucketlog_ingest::Orchestrator;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Held by the task running a pass; a trigger that cannot take it is
    /// dropped.
    pub run_lock: Arc<Mutex<()>>,
    /// Cancelled on shutdown so a pass stuck polling a load job gives up.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, shutdown: CancellationToken) -> Self {
        Self {
            orchestrator,
            run_lock: Arc::new(Mutex::new(())),
            shutdown,
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Wait for an in-flight pass to finish.
    pub async fn wait_idle(&self) {
        let _ = self.run_lock.lock().await;
    }
}
