use std::time::Duration;

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::time::Instant;

use super::{CorrelationId, ResponseHandler};

/// Запрос, ожидающий ответа.
pub struct PendingRequest {
    handler: Box<dyn ResponseHandler>,
    created_at: Instant,
}

impl PendingRequest {
    pub fn new(handler: Box<dyn ResponseHandler>) -> Self {
        Self {
            handler,
            created_at: Instant::now(),
        }
    }

    /// Сколько запрос уже ждёт.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn resolve(
        self,
        channel: &str,
        payload: String,
    ) {
        self.handler.on_success(channel, payload)
    }

    pub fn fail(
        self,
        channel: &str,
    ) {
        self.handler.on_failure(channel)
    }
}

/// Таблица запросов, ожидающих ответа.
///
/// Запись покидает таблицу только через [`take`](Self::take). Ответ и
/// таймаут оба вызывают `take`, поэтому обработчик получает ровно один
/// из двух исходов.
#[derive(Default)]
pub struct PendingRequests {
    entries: DashMap<CorrelationId, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет запись, если идентификатор свободен. Иначе возвращает
    /// запрос обратно.
    pub fn insert(
        &self,
        id: CorrelationId,
        request: PendingRequest,
    ) -> Result<(), PendingRequest> {
        match self.entries.entry(id) {
            Entry::Occupied(_) => Err(request),
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(())
            }
        }
    }

    /// Атомарно извлекает запись.
    pub fn take(
        &self,
        id: &CorrelationId,
    ) -> Option<PendingRequest> {
        self.entries.remove(id).map(|(_, request)| request)
    }

    pub fn contains(
        &self,
        id: &CorrelationId,
    ) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
