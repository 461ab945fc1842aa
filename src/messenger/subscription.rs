use std::{sync::Arc, time::Duration};

use clusterbus_error::{BusResult, ConnectionError, GenericError, StackError, StatusCode};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};

use super::{Envelope, Serializer};
use crate::{
    connection::{Connection, ConnectionProvider},
    pubsub::Message,
};

/// Состояние фоновой подписки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Цикл ещё не запускался
    Unregistered,
    /// Берём соединение и подписываемся
    Connecting,
    /// Подписка активна
    Subscribed,
    /// Соединение потеряно, ждём перед повтором
    ReconnectWait,
    /// Цикл завершён, повторов не будет
    Stopped,
}

/// Получатель разобранных конвертов.
pub trait Dispatcher: Send + Sync {
    fn dispatch(
        &self,
        envelope: Envelope,
    );

    /// Вызывается для сообщений, которые не удалось разобрать.
    fn on_undecodable(
        &self,
        _error: &StackError,
    ) {
    }
}

/// Хэндл запущенного цикла подписки.
pub struct SubscriptionHandle {
    state: watch::Receiver<SubscriptionState>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Ждёт, пока цикл не окажется в состоянии `target`.
    ///
    /// Возвращает `false`, если цикл завершился, так и не дойдя до него.
    /// Проходные состояния (`Connecting`) можно пропустить.
    pub async fn wait_for(
        &mut self,
        target: SubscriptionState,
    ) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }

    /// Подписка на изменения состояния.
    pub fn watch(&self) -> watch::Receiver<SubscriptionState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ждёт завершения цикла.
    pub async fn join(self) -> BusResult<()> {
        self.task.await.map_err(|e| {
            GenericError::new(
                StatusCode::Internal,
                format!("Subscription task failed: {e}"),
            )
            .into()
        })
    }

    /// Прерывает задачу, не дожидаясь флага остановки.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Неизменяемая часть цикла: куда подписываться и кому отдавать конверты.
struct LoopContext {
    provider: Arc<dyn ConnectionProvider>,
    serializer: Arc<dyn Serializer>,
    dispatcher: Arc<dyn Dispatcher>,
    channel: Arc<str>,
    backoff: Duration,
    state: watch::Sender<SubscriptionState>,
}

enum Attempt {
    Stopped,
    Failed(StackError),
}

/// Долгоживущая подписка на канал мессенджера.
///
/// Любой сбой брокера переводит цикл в `ReconnectWait`, после паузы он
/// подписывается заново. Выход только по флагу остановки или после
/// закрытия пула.
pub(crate) struct SubscriptionLoop {
    ctx: LoopContext,
    stop: watch::Receiver<bool>,
}

impl SubscriptionLoop {
    pub(crate) fn new(
        provider: Arc<dyn ConnectionProvider>,
        serializer: Arc<dyn Serializer>,
        dispatcher: Arc<dyn Dispatcher>,
        channel: Arc<str>,
        backoff: Duration,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Unregistered);
        Self {
            ctx: LoopContext {
                provider,
                serializer,
                dispatcher,
                channel,
                backoff,
                state,
            },
            stop,
        }
    }

    /// Запускает цикл фоновой задачей на текущем рантайме.
    pub(crate) fn spawn(self) -> SubscriptionHandle {
        let state = self.ctx.state.subscribe();
        let task = tokio::spawn(self.run());
        SubscriptionHandle { state, task }
    }

    async fn run(mut self) {
        let mut subscribed_before = false;

        while !self.should_stop() {
            self.ctx.set_state(SubscriptionState::Connecting);
            let failure = match self.attempt(&mut subscribed_before).await {
                Attempt::Stopped => break,
                Attempt::Failed(err) => err,
            };
            if self.should_stop() {
                break;
            }

            warn!(
                channel = %self.ctx.channel,
                error = %failure,
                backoff_ms = self.ctx.backoff.as_millis() as u64,
                "Lost connection to broker, retrying"
            );
            self.ctx.set_state(SubscriptionState::ReconnectWait);
            tokio::select! {
                _ = sleep(self.ctx.backoff) => {}
                _ = self.stop.changed() => {}
            }
        }

        self.ctx.set_state(SubscriptionState::Stopped);
        info!(channel = %self.ctx.channel, "Subscription stopped");
    }

    /// Одна попытка: взять соединение, подписаться и читать до сбоя или
    /// остановки. Соединение освобождается при выходе.
    async fn attempt(
        &mut self,
        subscribed_before: &mut bool,
    ) -> Attempt {
        let mut conn = match self.ctx.provider.acquire().await {
            Ok(conn) => conn,
            Err(err) => return Attempt::Failed(err),
        };

        let mut subscription = match conn.subscribe(&self.ctx.channel).await {
            Ok(subscription) => subscription,
            Err(err) => return Attempt::Failed(err),
        };

        self.ctx.set_state(SubscriptionState::Subscribed);
        if *subscribed_before {
            info!(channel = %self.ctx.channel, "Reconnected");
        } else {
            info!(channel = %self.ctx.channel, "Subscribed");
            *subscribed_before = true;
        }

        let failure: StackError = loop {
            tokio::select! {
                _ = self.stop.changed() => return Attempt::Stopped,
                received = subscription.recv() => match received {
                    Ok(message) => self.ctx.deliver(message),
                    Err(ConnectionError::Lagged { skipped, .. }) => {
                        warn!(channel = %self.ctx.channel, skipped, "Subscriber lagged, messages dropped");
                    }
                    Err(err) => break err.into(),
                },
            }
        };

        drop(subscription);
        release(conn.as_mut(), &self.ctx.channel).await;
        Attempt::Failed(failure)
    }

    fn should_stop(&self) -> bool {
        *self.stop.borrow() || self.stop.has_changed().is_err() || self.ctx.provider.is_closed()
    }
}

impl LoopContext {
    fn set_state(
        &self,
        state: SubscriptionState,
    ) {
        self.state.send_replace(state);
    }

    fn deliver(
        &self,
        message: Message,
    ) {
        if *message.channel != *self.channel {
            debug!(channel = %message.channel, "Ignoring message from foreign channel");
            return;
        }

        let decoded = match message.payload_str() {
            Ok(raw) => self.serializer.deserialize(raw),
            Err(e) => Err(GenericError::new(
                StatusCode::DeserializationFailed,
                format!("Payload is not UTF-8: {e}"),
            )
            .into()),
        };

        match decoded {
            Ok(envelope) => self.dispatcher.dispatch(envelope),
            Err(err) => {
                warn!(channel = %self.channel, error = %err, "Skipping undecodable message");
                self.dispatcher.on_undecodable(&err);
            }
        }
    }
}

/// Отписка перед повтором. Ошибка только логируется.
async fn release(
    conn: &mut dyn Connection,
    channel: &str,
) {
    if let Err(err) = conn.unsubscribe(channel).await {
        warn!(channel, error = %err, "Unsubscribe failed");
    }
}
