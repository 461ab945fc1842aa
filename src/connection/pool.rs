use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use clusterbus_error::{BusResult, ConnectionError};
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    time::timeout,
};
use tracing::{debug, info, warn};

use super::{Connection, ConnectionProvider};
use crate::{
    pubsub::{Broker, Subscription},
    storage::{InMemoryStore, KeyTtl},
};

/// Конфигурация пула соединений.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Максимальное кол-во одновременно выданных соединений
    pub max_connections: usize,
    /// Сколько ждать свободное соединение
    pub acquire_timeout: Duration,
    /// Ёмкость буфера каждого канала брокера
    pub channel_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            acquire_timeout: Duration::from_secs(5),
            channel_capacity: 1024,
        }
    }
}

/// Пул соединений к брокеру, живущему в этом процессе.
///
/// Число одновременно выданных соединений ограничено семафором. Подписка
/// держит своё соединение всё время жизни, остальные операции берут
/// соединение на одну команду.
///
/// `set_online(false)` имитирует недоступность брокера: действующие
/// подписки рвутся, а команды возвращают `ConnectionFailed` до
/// `set_online(true)`. `close()` закрывает пул окончательно.
pub struct InMemoryPool {
    cluster: String,
    config: PoolConfig,
    broker: Arc<Broker>,
    store: Arc<InMemoryStore>,
    permits: Arc<Semaphore>,
    online: Arc<AtomicBool>,
    closed: AtomicBool,
    /// Общий счётчик выданных соединений
    acquired_total: AtomicUsize,
}

impl InMemoryPool {
    pub fn new(
        cluster: impl Into<String>,
        config: PoolConfig,
    ) -> Self {
        let max_connections = config.max_connections.max(1);
        Self {
            cluster: cluster.into(),
            broker: Arc::new(Broker::new(config.channel_capacity)),
            store: Arc::new(InMemoryStore::new()),
            permits: Arc::new(Semaphore::new(max_connections)),
            online: Arc::new(AtomicBool::new(true)),
            closed: AtomicBool::new(false),
            acquired_total: AtomicUsize::new(0),
            config: PoolConfig {
                max_connections,
                ..config
            },
        }
    }

    /// Закрывает пул. Подписки разрываются, новые соединения не выдаются.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.permits.close();
        self.broker.disconnect_all();
        info!(cluster = %self.cluster, "Connection pool closed");
    }

    /// Переключает доступность брокера.
    pub fn set_online(
        &self,
        online: bool,
    ) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online && !online {
            self.broker.disconnect_all();
            warn!(cluster = %self.cluster, "Broker went offline");
        } else if !was_online && online {
            info!(cluster = %self.cluster, "Broker is back online");
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Сколько соединений можно выдать прямо сейчас.
    pub fn available_connections(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn acquired_total(&self) -> usize {
        self.acquired_total.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }
}

#[async_trait]
impl ConnectionProvider for InMemoryPool {
    async fn acquire(&self) -> BusResult<Box<dyn Connection>> {
        if self.is_closed() {
            return Err(ConnectionError::PoolClosed.into());
        }
        if !self.is_online() {
            return Err(ConnectionError::ConnectionFailed {
                reason: "broker is offline".to_string(),
            }
            .into());
        }

        let permit = match timeout(
            self.config.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ConnectionError::PoolClosed.into()),
            Err(_) => {
                warn!(
                    max_connections = self.config.max_connections,
                    "Connection pool exhausted"
                );
                return Err(ConnectionError::PoolExhausted {
                    max_connections: self.config.max_connections,
                    waited_ms: self.config.acquire_timeout.as_millis() as u64,
                }
                .into());
            }
        };

        self.acquired_total.fetch_add(1, Ordering::Relaxed);
        debug!(
            available = self.permits.available_permits(),
            "Connection acquired"
        );
        Ok(Box::new(PooledConnection {
            broker: Arc::clone(&self.broker),
            store: Arc::clone(&self.store),
            online: Arc::clone(&self.online),
            subscriptions: HashSet::new(),
            _permit: permit,
        }))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn cluster(&self) -> &str {
        &self.cluster
    }
}

/// Соединение, выданное [`InMemoryPool`]. Возвращает разрешение семафора
/// при `Drop`.
pub struct PooledConnection {
    broker: Arc<Broker>,
    store: Arc<InMemoryStore>,
    online: Arc<AtomicBool>,
    /// Каналы, на которые подписывались через это соединение
    subscriptions: HashSet<String>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn ensure_online(&self) -> BusResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConnectionError::ConnectionFailed {
                reason: "broker is offline".to_string(),
            }
            .into())
        }
    }
}

#[async_trait]
impl Connection for PooledConnection {
    async fn publish(
        &mut self,
        channel: &str,
        payload: Bytes,
    ) -> BusResult<usize> {
        self.ensure_online()?;
        Ok(self.broker.publish(channel, payload))
    }

    async fn subscribe(
        &mut self,
        channel: &str,
    ) -> BusResult<Subscription> {
        self.ensure_online()?;
        self.subscriptions.insert(channel.to_string());
        Ok(self.broker.subscribe(channel))
    }

    /// Подписки других соединений на тот же канал не затрагиваются:
    /// приёмник отключается, когда владелец отпускает `Subscription`.
    async fn unsubscribe(
        &mut self,
        channel: &str,
    ) -> BusResult<()> {
        self.ensure_online()?;
        if self.subscriptions.remove(channel) {
            debug!(channel, "Unsubscribed");
        }
        Ok(())
    }

    async fn set(
        &mut self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> BusResult<()> {
        self.ensure_online()?;
        self.store.set(key, value, ttl)
    }

    async fn get(
        &mut self,
        key: &str,
    ) -> BusResult<Option<String>> {
        self.ensure_online()?;
        Ok(self.store.get(key))
    }

    async fn exists(
        &mut self,
        key: &str,
    ) -> BusResult<bool> {
        self.ensure_online()?;
        Ok(self.store.exists(key))
    }

    async fn del(
        &mut self,
        key: &str,
    ) -> BusResult<bool> {
        self.ensure_online()?;
        Ok(self.store.del(key))
    }

    async fn expire(
        &mut self,
        key: &str,
        ttl: Duration,
    ) -> BusResult<bool> {
        self.ensure_online()?;
        self.store.expire(key, ttl)
    }

    async fn persist(
        &mut self,
        key: &str,
    ) -> BusResult<bool> {
        self.ensure_online()?;
        Ok(self.store.persist(key))
    }

    async fn ttl(
        &mut self,
        key: &str,
    ) -> BusResult<KeyTtl> {
        self.ensure_online()?;
        Ok(self.store.ttl(key))
    }

    async fn scan(
        &mut self,
        pattern: &str,
    ) -> BusResult<Vec<String>> {
        self.ensure_online()?;
        self.store.scan(pattern)
    }
}
