use std::time::Duration;

use clusterbus_error::{BusResult, GenericError, StatusCode};
use tokio::runtime::Handle;

/// Отложенная задача.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Планировщик отложенных задач.
pub trait Scheduler: Send + Sync {
    /// Выполняет `task` один раз не раньше, чем через `delay`.
    fn schedule(
        &self,
        delay: Duration,
        task: Task,
    );
}

/// Планировщик на задачах tokio.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Планировщик на текущем рантайме. Ошибка, если рантайма нет.
    pub fn try_current() -> BusResult<Self> {
        Handle::try_current().map(Self::new).map_err(|e| {
            GenericError::new(
                StatusCode::Unsupported,
                format!("No tokio runtime for scheduler: {e}"),
            )
            .into()
        })
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(
        &self,
        delay: Duration,
        task: Task,
    ) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}
