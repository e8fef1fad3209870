//! Periodic schedule expressed as data
//!
//! Each entry maps an interval to a named task factory; the queue's beat
//! spawns one ticker per entry and enqueues a fresh task instance on every
//! tick.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Factory producing one task instance per tick
pub type TaskFactory = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// One periodic task: name, cadence, and factory
#[derive(Clone)]
pub struct ScheduleEntry {
    pub name: String,
    pub interval: Duration,
    pub task: TaskFactory,
}

impl ScheduleEntry {
    pub fn new<F, Fut>(name: impl Into<String>, interval: Duration, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            interval,
            task: Arc::new(move || Box::pin(factory())),
        }
    }
}

impl fmt::Debug for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleEntry")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish()
    }
}
