use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use clusterbus_error::{
    bail, BusResult, MessengerError, ResultExt, StackError, StatusCode,
};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::{
    CorrelationId, Dispatcher, Envelope, JsonSerializer, MessageConsumer, PendingRequest,
    PendingRequests, Reply, ReplySlot, ResponseHandler, Scheduler, Serializer,
    SubscriptionHandle, SubscriptionLoop, TokioScheduler,
};
use crate::connection::ConnectionProvider;

/// Суффикс, который добавляется к префиксу кластера для имени канала.
pub const CHANNEL_SUFFIX: &str = "messenger:";

/// Пауза перед повторной подпиской по умолчанию.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Обмен сообщениями между узлами кластера через один общий канал.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Публикует `NORMAL` сообщение.
    async fn send(
        &self,
        payload: &str,
    ) -> BusResult<()>;

    /// Публикует `REQUEST` и ждёт ответа в фоне.
    ///
    /// `handler` вызывается ровно один раз: `on_success` при ответе или
    /// `on_failure`, если за `timeout` ответ не пришёл. Если публикация
    /// не удалась, ошибка возвращается, а обработчик не вызывается.
    async fn send_request(
        &self,
        payload: &str,
        handler: Box<dyn ResponseHandler>,
        timeout: Duration,
    ) -> BusResult<CorrelationId>;

    /// Публикует `RESPONSE` на запрос с идентификатором `correlation_id`.
    async fn send_response(
        &self,
        payload: &str,
        correlation_id: CorrelationId,
    ) -> BusResult<()>;

    /// Разбирает входящий конверт.
    fn dispatch(
        &self,
        envelope: Envelope,
    );

    /// Вычисляет канал и запускает фоновую подписку.
    ///
    /// Повторный вызов запускает второй цикл подписки.
    fn register(&self) -> BusResult<SubscriptionHandle>;

    /// Просит фоновую подписку остановиться.
    fn unregister(&self);
}

/// Счётчики мессенджера.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessengerStats {
    /// Опубликованные конверты всех типов
    pub published: u64,
    /// Запросы, получившие ответ
    pub resolved: u64,
    /// Запросы, завершённые по таймауту
    pub timed_out: u64,
    /// Ответы, для которых не нашлось ожидающего запроса
    pub stale_responses: u64,
    /// Входящие сообщения, которые не удалось разобрать
    pub undecodable: u64,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    resolved: AtomicU64,
    timed_out: AtomicU64,
    stale_responses: AtomicU64,
    undecodable: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> MessengerStats {
        MessengerStats {
            published: self.published.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            stale_responses: self.stale_responses.load(Ordering::Relaxed),
            undecodable: self.undecodable.load(Ordering::Relaxed),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Ядро мессенджера
////////////////////////////////////////////////////////////////////////////////

/// Общее состояние мессенджера. Разделяется между фасадом, циклом подписки
/// и отложенными задачами таймаутов.
struct MessengerCore {
    provider: Arc<dyn ConnectionProvider>,
    serializer: Arc<dyn Serializer>,
    consumer: Arc<dyn MessageConsumer>,
    scheduler: Arc<dyn Scheduler>,
    channel: OnceLock<Arc<str>>,
    pending: PendingRequests,
    counters: Counters,
}

impl MessengerCore {
    fn channel_name(&self) -> Arc<str> {
        self.channel
            .get_or_init(|| Arc::from(format!("{}{}", self.provider.cluster(), CHANNEL_SUFFIX)))
            .clone()
    }

    fn registered_channel(&self) -> BusResult<Arc<str>> {
        match self.channel.get() {
            Some(channel) => Ok(channel.clone()),
            None => Err(MessengerError::NotRegistered.into()),
        }
    }

    async fn publish(
        &self,
        envelope: &Envelope,
    ) -> BusResult<()> {
        let channel = self.registered_channel()?;
        let raw = self.serializer.serialize(envelope)?;

        let mut conn = self
            .provider
            .acquire()
            .await
            .context("Acquire connection for publish")?;
        let receivers = conn
            .publish(&channel, Bytes::from(raw))
            .await
            .with_context(|| format!("Publish {:?} to '{channel}'", envelope.kind()))?;

        self.counters.published.fetch_add(1, Ordering::Relaxed);
        debug!(
            channel = %channel,
            kind = ?envelope.kind(),
            correlation_id = ?envelope.correlation_id(),
            receivers,
            "Envelope published"
        );
        Ok(())
    }

    /// Срабатывание таймаута запроса.
    fn expire(
        &self,
        id: CorrelationId,
    ) {
        let Some(request) = self.pending.take(&id) else {
            trace!(correlation_id = %id, "Timeout after response, nothing to do");
            return;
        };
        let channel = self.channel_name();
        self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
        warn!(
            channel = %channel,
            correlation_id = %id,
            waited_ms = request.age().as_millis() as u64,
            "Request timed out"
        );
        request.fail(&channel);
    }
}

impl Dispatcher for MessengerCore {
    fn dispatch(
        &self,
        envelope: Envelope,
    ) {
        match envelope {
            Envelope::Response {
                identifier,
                payload,
            } => match self.pending.take(&identifier) {
                Some(request) => {
                    self.counters.resolved.fetch_add(1, Ordering::Relaxed);
                    debug!(correlation_id = %identifier, "Response matched");
                    request.resolve(&self.channel_name(), payload);
                }
                None => {
                    self.counters.stale_responses.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        correlation_id = %identifier,
                        "Dropping response without pending request"
                    );
                }
            },
            Envelope::Request {
                identifier,
                payload,
            } => self.consumer.consume(payload, Some(identifier)),
            Envelope::Normal { payload } => self.consumer.consume(payload, None),
        }
    }

    fn on_undecodable(
        &self,
        _error: &StackError,
    ) {
        self.counters.undecodable.fetch_add(1, Ordering::Relaxed);
    }
}

////////////////////////////////////////////////////////////////////////////////
// PubSubMessenger
////////////////////////////////////////////////////////////////////////////////

/// [`Messenger`] поверх pub/sub канала `cluster + "messenger:"`.
///
/// Все узлы кластера слушают один канал и видят в том числе собственные
/// сообщения.
pub struct PubSubMessenger {
    core: Arc<MessengerCore>,
    stop: watch::Sender<bool>,
    reconnect_backoff: Duration,
}

impl PubSubMessenger {
    pub fn builder(
        provider: Arc<dyn ConnectionProvider>,
        consumer: Arc<dyn MessageConsumer>,
    ) -> MessengerBuilder {
        MessengerBuilder {
            provider,
            consumer,
            serializer: None,
            scheduler: None,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }

    /// Канал мессенджера, если `register()` уже вызывался.
    pub fn channel(&self) -> Option<&str> {
        self.core.channel.get().map(|channel| &**channel)
    }

    /// Сколько запросов сейчас ждут ответа.
    pub fn pending_requests(&self) -> usize {
        self.core.pending.len()
    }

    pub fn stats(&self) -> MessengerStats {
        self.core.counters.snapshot()
    }

    /// Отправляет запрос и ждёт ответ.
    ///
    /// Возвращает payload ответа или `MessengerError::RequestTimeout`.
    pub async fn request(
        &self,
        payload: &str,
        timeout: Duration,
    ) -> BusResult<String> {
        let (slot, rx) = ReplySlot::new();
        let id = self.send_request(payload, Box::new(slot), timeout).await?;
        match rx.await {
            Ok(Reply::Payload(payload)) => Ok(payload),
            Ok(Reply::TimedOut { channel }) => Err(MessengerError::RequestTimeout {
                channel,
                correlation_id: id.to_string(),
            }
            .into()),
            Err(_) => bail!(
                StatusCode::Unexpected,
                "Request {} was dropped before completion",
                id
            ),
        }
    }
}

#[async_trait]
impl Messenger for PubSubMessenger {
    async fn send(
        &self,
        payload: &str,
    ) -> BusResult<()> {
        self.core.publish(&Envelope::normal(payload)).await
    }

    async fn send_request(
        &self,
        payload: &str,
        handler: Box<dyn ResponseHandler>,
        timeout: Duration,
    ) -> BusResult<CorrelationId> {
        self.core.registered_channel()?;

        let id = Uuid::new_v4();
        if self.core.pending.insert(id, PendingRequest::new(handler)).is_err() {
            bail!(MessengerError::DuplicateCorrelationId {
                correlation_id: id.to_string(),
            });
        }

        // Запись уже в таблице: ответ, пришедший раньше возврата из publish,
        // не потеряется.
        if let Err(err) = self.core.publish(&Envelope::request(id, payload)).await {
            self.core.pending.take(&id);
            return Err(err);
        }

        let core = Arc::clone(&self.core);
        self.core
            .scheduler
            .schedule(timeout, Box::new(move || core.expire(id)));
        Ok(id)
    }

    async fn send_response(
        &self,
        payload: &str,
        correlation_id: CorrelationId,
    ) -> BusResult<()> {
        self.core
            .publish(&Envelope::response(correlation_id, payload))
            .await
    }

    fn dispatch(
        &self,
        envelope: Envelope,
    ) {
        Dispatcher::dispatch(&*self.core, envelope)
    }

    fn register(&self) -> BusResult<SubscriptionHandle> {
        if tokio::runtime::Handle::try_current().is_err() {
            bail!(
                StatusCode::Unsupported,
                "Messenger must be registered inside a tokio runtime"
            );
        }
        let channel = self.core.channel_name();

        let handle = SubscriptionLoop::new(
            Arc::clone(&self.core.provider),
            Arc::clone(&self.core.serializer),
            Arc::clone(&self.core) as Arc<dyn Dispatcher>,
            channel.clone(),
            self.reconnect_backoff,
            self.stop.subscribe(),
        )
        .spawn();
        info!(channel = %channel, "Messenger registered");
        Ok(handle)
    }

    fn unregister(&self) {
        self.stop.send_replace(true);
        info!(channel = ?self.channel(), "Messenger unregistered");
    }
}

/// Сборщик [`PubSubMessenger`].
pub struct MessengerBuilder {
    provider: Arc<dyn ConnectionProvider>,
    consumer: Arc<dyn MessageConsumer>,
    serializer: Option<Arc<dyn Serializer>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    reconnect_backoff: Duration,
}

impl MessengerBuilder {
    /// Кодек конвертов. По умолчанию [`JsonSerializer`].
    pub fn serializer(
        mut self,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Планировщик таймаутов. По умолчанию [`TokioScheduler`] текущего
    /// рантайма.
    pub fn scheduler(
        mut self,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn reconnect_backoff(
        mut self,
        backoff: Duration,
    ) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn build(self) -> BusResult<PubSubMessenger> {
        let scheduler = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioScheduler::try_current()?),
        };
        let (stop, _) = watch::channel(false);

        Ok(PubSubMessenger {
            core: Arc::new(MessengerCore {
                provider: self.provider,
                serializer: self.serializer.unwrap_or_else(|| Arc::new(JsonSerializer)),
                consumer: self.consumer,
                scheduler,
                channel: OnceLock::new(),
                pending: PendingRequests::new(),
                counters: Counters::default(),
            }),
            stop,
            reconnect_backoff: self.reconnect_backoff,
        })
    }
}
