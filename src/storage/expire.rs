use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    time::Duration,
};

use clusterbus_error::StorageError;
use tokio::time::Instant;

/// Таблица сроков жизни ключей.
///
/// Хранит точный дедлайн каждого ключа в `HashMap` и очередь дедлайнов в
/// min-куче для быстрого `purge`. Время берётся из `tokio::time`, поэтому
/// в тестах с приостановленными часами ключи истекают после
/// `tokio::time::advance`.
#[derive(Debug)]
pub struct ExpireMap {
    deadlines: HashMap<String, Instant>,
    queue: BinaryHeap<Reverse<(Instant, String)>>,
}

impl ExpireMap {
    pub fn new() -> Self {
        Self {
            deadlines: HashMap::new(),
            queue: BinaryHeap::new(),
        }
    }

    /// Назначает (или переназначает) ключу срок жизни `ttl` от текущего
    /// момента.
    ///
    /// Если дедлайн не представим в `Instant`, возвращает `InvalidTtl` и
    /// ничего не меняет.
    pub fn set(
        &mut self,
        key: &str,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let deadline = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| StorageError::InvalidTtl {
                key: key.to_string(),
                reason: format!("ttl of {}s is out of range", ttl.as_secs()),
            })?;
        self.deadlines.insert(key.to_string(), deadline);
        self.queue.push(Reverse((deadline, key.to_string())));
        Ok(())
    }

    /// Оставшееся время жизни ключа, если у него есть дедлайн.
    ///
    /// Уже истёкший, но ещё не вычищенный ключ даёт `Duration::ZERO`.
    pub fn remaining(
        &self,
        key: &str,
    ) -> Option<Duration> {
        self.deadlines
            .get(key)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Снимает дедлайн с ключа. Возвращает `true`, если дедлайн был.
    pub fn remove(
        &mut self,
        key: &str,
    ) -> bool {
        // Запись в куче остаётся и будет пропущена в `purge`.
        self.deadlines.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Извлекает все ключи, дедлайн которых уже наступил.
    pub fn purge(&mut self) -> Vec<String> {
        let now = Instant::now();
        let mut expired = Vec::new();
        while let Some(Reverse((deadline, _))) = self.queue.peek() {
            if *deadline > now {
                break;
            }
            let Some(Reverse((_, key))) = self.queue.pop() else {
                break;
            };
            // Ключ мог получить новый дедлайн после постановки в очередь.
            if let Some(current) = self.deadlines.get(&key) {
                if *current <= now {
                    self.deadlines.remove(&key);
                    expired.push(key);
                }
            }
        }
        expired
    }
}

impl Default for ExpireMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::advance;

    use super::*;

    /// Тест проверяет, что ключ истекает ровно после своего TTL.
    #[tokio::test(start_paused = true)]
    async fn test_key_expires_after_ttl() {
        let mut map = ExpireMap::new();
        map.set("a", Duration::from_secs(10)).unwrap();

        advance(Duration::from_secs(9)).await;
        assert!(map.purge().is_empty());
        assert_eq!(map.remaining("a"), Some(Duration::from_secs(1)));

        advance(Duration::from_secs(1)).await;
        assert_eq!(map.purge(), vec!["a".to_string()]);
        assert!(map.is_empty());
    }

    /// Тест проверяет, что продлённый TTL не срабатывает по старой записи
    /// в очереди.
    #[tokio::test(start_paused = true)]
    async fn test_extended_ttl_ignores_stale_queue_entry() {
        let mut map = ExpireMap::new();
        map.set("a", Duration::from_secs(1)).unwrap();
        map.set("a", Duration::from_secs(60)).unwrap();

        advance(Duration::from_secs(2)).await;
        assert!(map.purge().is_empty());
        assert_eq!(map.len(), 1);
    }

    /// Тест проверяет, что снятый дедлайн больше не приводит к истечению.
    #[tokio::test(start_paused = true)]
    async fn test_removed_deadline_never_fires() {
        let mut map = ExpireMap::new();
        map.set("a", Duration::from_secs(1)).unwrap();
        assert!(map.remove("a"));
        assert!(!map.remove("a"));

        advance(Duration::from_secs(5)).await;
        assert!(map.purge().is_empty());
        assert_eq!(map.remaining("a"), None);
    }

    /// Тест проверяет, что непредставимый дедлайн отклоняется, а прежний
    /// срок жизни ключа остаётся.
    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_ttl_rejected() {
        let mut map = ExpireMap::new();
        map.set("a", Duration::from_secs(5)).unwrap();

        let err = map.set("a", Duration::from_secs(u64::MAX)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidTtl { .. }));
        assert_eq!(map.remaining("a"), Some(Duration::from_secs(5)));
        assert_eq!(map.len(), 1);
    }
}
