use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::{Message, Subscription};

type ChannelKey = Arc<str>;

/// Брокер Pub/Sub сообщений.
///
/// Поддерживает:
/// - Подписки по точному имени канала
/// - Автоматическое удаление каналов без слушателей
/// - Принудительный разрыв подписок (имитация обрыва соединения)
/// - Статистику публикаций и ошибок отправки
///
/// Порядок доставки внутри одного канала совпадает с порядком `publish`.
pub struct Broker {
    /// Каналы → `Sender`
    channels: Arc<DashMap<ChannelKey, broadcast::Sender<Message>>>,
    /// Ёмкость буфера каждого `broadcast::channel`
    default_capacity: usize,
    /// Общее количество вызовов `publish`
    pub publish_count: AtomicUsize,
    /// Количество неудачных `send` (нет подписчиков)
    pub send_error_count: AtomicUsize,
}

impl Broker {
    /// Создаёт новый `Broker` с заданной буферной ёмкостью.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            default_capacity: default_capacity.max(1),
            publish_count: AtomicUsize::new(0),
            send_error_count: AtomicUsize::new(0),
        }
    }

    /// Подписка на канал (точное совпадение).
    ///
    /// Создаёт `Arc<str>` ключ при первой подписке.
    pub fn subscribe(
        &self,
        channel: &str,
    ) -> Subscription {
        let key: Arc<str> = Arc::from(channel);
        // Приёмник создаётся, пока удерживается запись канала.
        let inner = self
            .channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.default_capacity).0)
            .subscribe();
        debug!(channel, "Subscriber attached");
        Subscription {
            channel: key,
            inner,
        }
    }

    /// Публикация сообщения в канал.
    ///
    /// Возвращает число подписчиков, получивших сообщение. Если слушателей
    /// не осталось, увеличивает `send_error_count` и удаляет канал.
    pub fn publish(
        &self,
        channel: &str,
        payload: Bytes,
    ) -> usize {
        self.publish_count.fetch_add(1, Ordering::Relaxed);

        let Some(entry) = self.channels.get(channel) else {
            trace!(channel, "Publish to channel without subscribers");
            return 0;
        };

        let tx = entry.value().clone();
        let msg = Message::new(entry.key().clone(), payload);
        let delivered = match tx.send(msg) {
            Ok(receivers) => receivers,
            Err(_) => {
                self.send_error_count.fetch_add(1, Ordering::Relaxed);
                0
            }
        };

        if tx.receiver_count() == 0 {
            let key = entry.key().clone();
            drop(entry);
            // Канал удаляется, только если пуст и под блокировкой записи.
            self.channels
                .remove_if(&*key, |_, tx| tx.receiver_count() == 0);
        }

        delivered
    }

    /// Удаляет канал вместе с его `Sender`.
    ///
    /// Все подписчики канала получают `Closed` после того, как дочитают
    /// уже доставленные сообщения.
    pub fn unsubscribe_all(
        &self,
        channel: &str,
    ) {
        if self.channels.remove(channel).is_some() {
            debug!(channel, "All subscribers detached");
        }
    }

    /// Разрывает подписки на всех каналах.
    pub fn disconnect_all(&self) {
        let dropped = self.channels.len();
        self.channels.clear();
        debug!(channels = dropped, "All channels disconnected");
    }

    /// Количество активных подписчиков канала.
    pub fn subscriber_count(
        &self,
        channel: &str,
    ) -> usize {
        self.channels
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(1024)
    }
}
