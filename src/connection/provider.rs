use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use clusterbus_error::BusResult;

use crate::{pubsub::Subscription, storage::KeyTtl};

/// Источник соединений с брокером.
///
/// Реализация обязана быть потокобезопасной: мессенджер и хранилище берут
/// соединения из разных задач одновременно.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Выдаёт соединение. Соединение возвращается в пул при `Drop`.
    async fn acquire(&self) -> BusResult<Box<dyn Connection>>;

    /// `true`, если пул закрыт окончательно и соединений больше не будет.
    fn is_closed(&self) -> bool;

    /// Префикс кластера, например `"lobby:"`.
    fn cluster(&self) -> &str;
}

/// Одно соединение с брокером: pub/sub и строковые команды над ключами.
#[async_trait]
pub trait Connection: Send {
    /// Публикует payload в канал. Возвращает число получателей.
    async fn publish(
        &mut self,
        channel: &str,
        payload: Bytes,
    ) -> BusResult<usize>;

    /// Подписывается на канал.
    async fn subscribe(
        &mut self,
        channel: &str,
    ) -> BusResult<Subscription>;

    /// Отписывает это соединение от канала.
    async fn unsubscribe(
        &mut self,
        channel: &str,
    ) -> BusResult<()>;

    /// `SET` / `SETEX`.
    async fn set(
        &mut self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> BusResult<()>;

    async fn get(
        &mut self,
        key: &str,
    ) -> BusResult<Option<String>>;

    async fn exists(
        &mut self,
        key: &str,
    ) -> BusResult<bool>;

    async fn del(
        &mut self,
        key: &str,
    ) -> BusResult<bool>;

    async fn expire(
        &mut self,
        key: &str,
        ttl: Duration,
    ) -> BusResult<bool>;

    async fn persist(
        &mut self,
        key: &str,
    ) -> BusResult<bool>;

    async fn ttl(
        &mut self,
        key: &str,
    ) -> BusResult<KeyTtl>;

    /// Ключи, подходящие под glob-шаблон.
    async fn scan(
        &mut self,
        pattern: &str,
    ) -> BusResult<Vec<String>>;
}
