use tokio::sync::oneshot;

use super::CorrelationId;

/// Получатель входящих `NORMAL` и `REQUEST` сообщений.
///
/// Для `REQUEST` передаётся идентификатор, с которым нужно вызвать
/// `send_response`. Вызывается из задачи подписки, поэтому не должен
/// блокироваться надолго.
pub trait MessageConsumer: Send + Sync {
    fn consume(
        &self,
        payload: String,
        correlation_id: Option<CorrelationId>,
    );
}

impl<F> MessageConsumer for F
where
    F: Fn(String, Option<CorrelationId>) + Send + Sync,
{
    fn consume(
        &self,
        payload: String,
        correlation_id: Option<CorrelationId>,
    ) {
        self(payload, correlation_id)
    }
}

/// Обработчик ответа на запрос.
///
/// Оба метода принимают `Box<Self>`: обработчик вызывается не более
/// одного раза.
pub trait ResponseHandler: Send + Sync {
    /// Пришёл ответ.
    fn on_success(
        self: Box<Self>,
        channel: &str,
        payload: String,
    );

    /// Ответ не пришёл за отведённое время.
    fn on_failure(
        self: Box<Self>,
        channel: &str,
    );
}

/// [`ResponseHandler`] из пары замыканий.
pub struct ResponseCallbacks<S, F> {
    on_success: S,
    on_failure: F,
}

impl<S, F> ResponseCallbacks<S, F>
where
    S: FnOnce(&str, String) + Send + Sync,
    F: FnOnce(&str) + Send + Sync,
{
    pub fn new(
        on_success: S,
        on_failure: F,
    ) -> Self {
        Self {
            on_success,
            on_failure,
        }
    }

    pub fn boxed(
        on_success: S,
        on_failure: F,
    ) -> Box<dyn ResponseHandler>
    where
        S: 'static,
        F: 'static,
    {
        Box::new(Self::new(on_success, on_failure))
    }
}

impl<S, F> ResponseHandler for ResponseCallbacks<S, F>
where
    S: FnOnce(&str, String) + Send + Sync,
    F: FnOnce(&str) + Send + Sync,
{
    fn on_success(
        self: Box<Self>,
        channel: &str,
        payload: String,
    ) {
        (self.on_success)(channel, payload)
    }

    fn on_failure(
        self: Box<Self>,
        channel: &str,
    ) {
        (self.on_failure)(channel)
    }
}

/// Исход запроса, доставленный через [`ReplySlot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Ответ с полезной нагрузкой
    Payload(String),
    /// Таймаут на канале
    TimedOut { channel: String },
}

/// [`ResponseHandler`], который пересылает исход в `oneshot`-канал.
pub struct ReplySlot {
    tx: oneshot::Sender<Reply>,
}

impl ReplySlot {
    pub fn new() -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }
}

impl ResponseHandler for ReplySlot {
    fn on_success(
        self: Box<Self>,
        _channel: &str,
        payload: String,
    ) {
        // Получатель мог уже уйти.
        let _ = self.tx.send(Reply::Payload(payload));
    }

    fn on_failure(
        self: Box<Self>,
        channel: &str,
    ) {
        let _ = self.tx.send(Reply::TimedOut {
            channel: channel.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Тест проверяет, что замыкание работает как `MessageConsumer`.
    #[test]
    fn test_closure_consumer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let consumer = move |payload: String, id: Option<CorrelationId>| {
            sink.lock().unwrap().push((payload, id.is_some()));
        };

        consumer.consume("a".to_string(), None);
        consumer.consume("b".to_string(), Some(CorrelationId::new_v4()));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("a".to_string(), false), ("b".to_string(), true)]
        );
    }

    /// Тест проверяет, что пара замыканий вызывает только нужную ветку.
    #[test]
    fn test_callbacks_dispatch() {
        let outcome = Arc::new(Mutex::new(None));
        let ok = outcome.clone();
        let fail = outcome.clone();
        let handler = ResponseCallbacks::boxed(
            move |channel: &str, payload: String| {
                *ok.lock().unwrap() = Some(format!("{channel}:{payload}"));
            },
            move |channel: &str| {
                *fail.lock().unwrap() = Some(format!("timeout:{channel}"));
            },
        );

        handler.on_success("chan", "pong".to_string());
        assert_eq!(outcome.lock().unwrap().as_deref(), Some("chan:pong"));
    }

    /// Тест проверяет, что `ReplySlot` доставляет таймаут получателю.
    #[tokio::test]
    async fn test_reply_slot_failure() {
        let (slot, rx) = ReplySlot::new();
        Box::new(slot).on_failure("lobby:messenger:");
        assert_eq!(
            rx.await.unwrap(),
            Reply::TimedOut {
                channel: "lobby:messenger:".to_string()
            }
        );
    }
}
