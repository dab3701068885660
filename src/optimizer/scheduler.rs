use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::optimizer::service::YieldOptimizer;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub background_optimization_interval: Duration,
    pub feedback_batch_interval: Duration,
    pub coordination_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            background_optimization_interval: Duration::from_secs(300),
            feedback_batch_interval: Duration::from_secs(600),
            coordination_interval: Duration::from_secs(900),
        }
    }
}

/// Periodic unit of work driven by the [`Scheduler`]
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    fn name(&self) -> &'static str;

    fn period(&self) -> Duration;

    async fn run(&self, optimizer: &YieldOptimizer);
}

/// Drains the priority queue one entry per tick.
///
/// When a state has been submitted for the target vault the search is re-run
/// on it; otherwise the request is only logged.
pub struct BackgroundOptimizationTask {
    pub period: Duration,
}

#[async_trait]
impl ScheduledTask for BackgroundOptimizationTask {
    fn name(&self) -> &'static str {
        "background_optimization"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run(&self, optimizer: &YieldOptimizer) {
        let Some(next) = optimizer.next_priority_optimization() else {
            debug!("Priority queue empty");
            return;
        };

        info!(
            "Processing {:?} priority action {} for vault {} (priority {}, deadline {})",
            next.urgency, next.id, next.target_vault, next.priority, next.deadline
        );

        let Some(state) = optimizer.latest_vault_state(&next.target_vault) else {
            info!("No state recorded for vault {}, skipping search", next.target_vault);
            return;
        };

        if let Err(e) = optimizer.optimize_vault_yield(&next.target_vault, state).await {
            error!("Background optimization for {} failed: {}", next.target_vault, e);
        }
    }
}

pub struct FeedbackBatchTask {
    pub period: Duration,
}

#[async_trait]
impl ScheduledTask for FeedbackBatchTask {
    fn name(&self) -> &'static str {
        "feedback_batch"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run(&self, optimizer: &YieldOptimizer) {
        optimizer.process_feedback_batch().await;
    }
}

pub struct CoordinationTask {
    pub period: Duration,
}

#[async_trait]
impl ScheduledTask for CoordinationTask {
    fn name(&self) -> &'static str {
        "agent_coordination"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run(&self, optimizer: &YieldOptimizer) {
        optimizer.coordinate_hierarchical_agents().await;
    }
}

/// Owns the periodic loops; all of them start and stop together
pub struct Scheduler {
    optimizer: Arc<YieldOptimizer>,
    tasks: Vec<Arc<dyn ScheduledTask>>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    is_running: Arc<RwLock<bool>>,
}

impl Scheduler {
    pub fn new(optimizer: Arc<YieldOptimizer>, tasks: Vec<Arc<dyn ScheduledTask>>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            optimizer,
            tasks,
            shutdown,
            handles: Mutex::new(Vec::new()),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// Background optimization, feedback batch and coordination loops
    pub fn with_default_tasks(optimizer: Arc<YieldOptimizer>, config: &SchedulerConfig) -> Self {
        let tasks: Vec<Arc<dyn ScheduledTask>> = vec![
            Arc::new(BackgroundOptimizationTask {
                period: config.background_optimization_interval,
            }),
            Arc::new(FeedbackBatchTask {
                period: config.feedback_batch_interval,
            }),
            Arc::new(CoordinationTask {
                period: config.coordination_interval,
            }),
        ];
        Self::new(optimizer, tasks)
    }

    pub async fn start(&self) {
        {
            let mut is_running = self.is_running.write().await;
            if *is_running {
                return;
            }
            *is_running = true;
        }

        self.shutdown.send_replace(false);
        let mut handles = self.handles.lock().await;
        for task in &self.tasks {
            let task = Arc::clone(task);
            let optimizer = Arc::clone(&self.optimizer);
            let shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(run_task(task, optimizer, shutdown)));
        }

        info!("Scheduler started with {} tasks", self.tasks.len());
    }

    /// Signal every loop to exit and wait for them
    pub async fn stop(&self) {
        {
            let mut is_running = self.is_running.write().await;
            if !*is_running {
                return;
            }
            *is_running = false;
        }

        self.shutdown.send_replace(true);
        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Scheduled task ended abnormally: {}", e);
            }
        }

        info!("Scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }
}

async fn run_task(
    task: Arc<dyn ScheduledTask>,
    optimizer: Arc<YieldOptimizer>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut timer = interval(task.period());
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    timer.tick().await;

    debug!("{} loop running every {:?}", task.name(), task.period());

    loop {
        tokio::select! {
            _ = timer.tick() => {
                task.run(&optimizer).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!("{} loop stopped", task.name());
}
