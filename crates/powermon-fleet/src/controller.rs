//! Fleet controller — fans a power command out to every worker.
//!
//! [`FleetController::set_all`] spawns one detached task per worker and
//! returns immediately. Tasks are never joined; a lost command is only
//! re-sent on the next transition.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use powermon_core::{PowerAction, WorkerEndpoint};

use crate::channel::{CommandChannel, CommandDeliveryError};
use crate::command::Command;

/// Outcome of one awaited delivery (see [`FleetController::send_all`]).
#[derive(Debug)]
pub struct DeliveryReport {
    pub worker: String,
    pub result: Result<(), CommandDeliveryError>,
}

/// Holds the fixed worker roster and the channel used to reach it.
#[derive(Clone)]
pub struct FleetController {
    workers: Arc<[WorkerEndpoint]>,
    channel: Arc<dyn CommandChannel>,
}

impl FleetController {
    pub fn new(workers: Vec<WorkerEndpoint>, channel: Arc<dyn CommandChannel>) -> Self {
        Self {
            workers: workers.into(),
            channel,
        }
    }

    pub fn workers(&self) -> &[WorkerEndpoint] {
        &self.workers
    }

    /// Dispatch `action` to every worker without waiting for any of them.
    ///
    /// Must be called from within a Tokio runtime. Returns the number of
    /// dispatches started. Delivery failures are logged per worker and
    /// otherwise dropped; nothing is retried.
    pub fn set_all(&self, action: PowerAction) -> usize {
        info!(
            target_state = %action,
            workers = self.workers.len(),
            "***** all workers -> {action} *****"
        );

        for worker in self.workers.iter() {
            let command = Command {
                target: worker.clone(),
                action,
            };
            let channel = Arc::clone(&self.channel);
            info!(worker = %worker.name, target_state = %action, "dispatching");
            tokio::spawn(dispatch(channel, command));
        }

        self.workers.len()
    }

    /// Dispatch `action` to every worker and wait for all outcomes.
    ///
    /// Reports come back in roster order. Meant for one-shot operator
    /// commands; the control loop uses [`FleetController::set_all`].
    pub async fn send_all(&self, action: PowerAction) -> Vec<DeliveryReport> {
        let mut tasks = JoinSet::new();
        for (index, worker) in self.workers.iter().enumerate() {
            let channel = Arc::clone(&self.channel);
            let worker = worker.clone();
            tasks.spawn(async move {
                let result = channel.send(&worker, action).await;
                (index, DeliveryReport {
                    worker: worker.name,
                    result,
                })
            });
        }

        let mut slots: Vec<Option<DeliveryReport>> =
            std::iter::repeat_with(|| None).take(self.workers.len()).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => warn!(error = %e, "dispatch task failed"),
            }
        }
        slots.into_iter().flatten().collect()
    }
}

async fn dispatch(channel: Arc<dyn CommandChannel>, command: Command) {
    match channel.send(&command.target, command.action).await {
        Ok(()) => debug!(
            worker = %command.target.name,
            target_state = %command.action,
            "command delivered"
        ),
        Err(e) => warn!(
            worker = %command.target.name,
            address = %command.target.address(),
            target_state = %command.action,
            error = %e,
            "command delivery failed"
        ),
    }
}
