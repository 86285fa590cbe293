//! In-process Optimizer scheduler (spec.md §4.6), replacing the Python
//! prototype's subprocess-per-trigger + PID-signal singleton pattern with
//! structured cancellation: at most one Optimizer run per service, a new
//! trigger preempts whatever run is already in flight for that service.

use std::collections::HashMap;
use std::sync::Arc;

use log::{error, info};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::StateCache;
use crate::config::AppConfig;
use crate::error::ScaleWaveError;
use crate::platform::PlatformAdapter;
use crate::types::Service;

struct RunHandle {
    #[allow(dead_code)]
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Keyed by service name. Each service gets its own mutex around its single
/// `RunHandle` slot, so preempting a slow-to-cancel run for one service never
/// blocks a `trigger()` call for an unrelated one (spec.md §146 / SPEC_FULL.md
/// §5: "no cross-service locking"). The outer map lock is only ever held long
/// enough to get-or-insert a service's per-service mutex.
pub struct OptimizerScheduler<C: StateCache> {
    platform: Arc<dyn PlatformAdapter>,
    cache: Arc<C>,
    config: Arc<AppConfig>,
    active: Mutex<HashMap<String, Arc<Mutex<Option<RunHandle>>>>>,
}

impl<C: StateCache + 'static> OptimizerScheduler<C> {
    pub fn new(platform: Arc<dyn PlatformAdapter>, cache: Arc<C>, config: Arc<AppConfig>) -> Self {
        Self {
            platform,
            cache,
            config,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Preempts any Optimizer run already in flight for `service.name` and
    /// starts a new one.
    pub async fn trigger(&self, service: Service) {
        let slot = {
            let mut active = self.active.lock().await;
            active
                .entry(service.name.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone()
        };

        let mut slot = slot.lock().await;

        if let Some(previous) = slot.take() {
            previous.cancel.cancel();
            if let Err(e) = previous.task.await {
                if !e.is_cancelled() {
                    error!("previous optimizer run for {} panicked: {e}", service.name);
                }
            }
        }

        let cancel = CancellationToken::new();
        let id = Uuid::new_v4();
        let platform = self.platform.clone();
        let cache = self.cache.clone();
        let config = self.config.clone();
        let service_name = service.name.clone();
        let run_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            match crate::optimizer::run_optimizer(&service, &*platform, &*cache, &config, run_cancel)
                .await
            {
                Ok(()) => info!("optimizer run {id} finished for {service_name}"),
                Err(ScaleWaveError::Preempted) => {
                    info!("optimizer run {id} for {service_name} preempted");
                }
                Err(e) => error!("optimizer run {id} for {service_name} failed: {e}"),
            }
        });

        *slot = Some(RunHandle { id, cancel, task });
    }
}
