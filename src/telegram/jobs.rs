//! Recurring jobs run next to the dispatcher

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use teloxide::Bot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::routing::HandlerError;

/// What a job gets on every run
#[derive(Clone, Debug)]
pub struct JobContext {
    pub bot: Bot,
    pub name: Arc<str>,
}

type JobFn = dyn Fn(JobContext) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync;

/// A named callback invoked after `first` and then every `interval`
#[derive(Clone)]
pub struct Job {
    name: Arc<str>,
    func: Arc<JobFn>,
    first: Duration,
    interval: Duration,
}

impl Job {
    pub fn new<F, Fut>(name: impl AsRef<str>, first: Duration, interval: Duration, f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Self {
            name: Arc::from(name.as_ref()),
            func: Arc::new(move |ctx| f(ctx).boxed()),
            first,
            interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first(&self) -> Duration {
        self.first
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run_once(&self, bot: Bot) -> Result<(), HandlerError> {
        (self.func)(JobContext {
            bot,
            name: Arc::clone(&self.name),
        })
        .await
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("first", &self.first)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Spawns every job on its own task. The tasks stop when `shutdown` fires;
/// a failing run is logged and the schedule continues.
pub fn spawn_jobs(jobs: &[Job], bot: Bot, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
    jobs.iter()
        .cloned()
        .map(|job| {
            let bot = bot.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + job.first, job.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                log::info!(
                    "Job '{}' scheduled (first run in {:?}, every {:?})",
                    job.name,
                    job.first,
                    job.interval
                );
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(e) = job.run_once(bot.clone()).await {
                                log::error!("Job '{}' failed: {}", job.name, e);
                            }
                        }
                    }
                }
                log::info!("Job '{}' stopped", job.name);
            })
        })
        .collect()
}
