use std::sync::Arc;

use clusterbus_error::ConnectionError;
use tokio::sync::broadcast;

use super::Message;

/// Подписка на конкретный канал по имени.
///
/// Предоставляет async интерфейс для получения сообщений без обращения к
/// внутреннему `broadcast::Receiver`. Отписка происходит автоматически при
/// `Drop`.
pub struct Subscription {
    /// Название канала, на который подписаны.
    pub channel: Arc<str>,
    /// Внутренний приёмник для входящих сообщений.
    pub(crate) inner: broadcast::Receiver<Message>,
}

impl Subscription {
    /// Асинхронно ожидает следующее сообщение из канала.
    ///
    /// # Возвращает
    /// - `Ok(Message)` при успешном получении сообщения
    /// - `Err(ConnectionError::SubscriptionClosed)` если брокер разорвал
    ///   подписку
    /// - `Err(ConnectionError::Lagged)` если приёмник отстал; подписка при
    ///   этом остаётся рабочей
    pub async fn recv(&mut self) -> Result<Message, ConnectionError> {
        self.inner
            .recv()
            .await
            .map_err(|e| ConnectionError::from_recv(&self.channel, e))
    }

    /// Явно отписаться от канала. Аналогично `drop(self)`.
    pub fn unsubscribe(self) {
        // При drop Receiver отписывается сам
    }

    /// Возвращает имя канала, на который подписались.
    pub fn channel_name(&self) -> &Arc<str> {
        &self.channel
    }

    /// Возвращает количество сообщений в очереди на получение.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Проверяет, пуста ли очередь сообщений.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
