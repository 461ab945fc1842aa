use std::time::Duration;

use clusterbus_error::{BusResult, StorageError};
use dashmap::DashMap;
use globset::GlobBuilder;
use parking_lot::Mutex;
use tracing::trace;

use super::ExpireMap;

/// Состояние срока жизни ключа.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Ключа нет
    Missing,
    /// Ключ есть, срока жизни нет
    Persistent,
    /// Ключ истечёт через указанное время
    Expires(Duration),
}

impl KeyTtl {
    /// Представление в секундах в духе `TTL`: `-2` для отсутствующего
    /// ключа, `-1` для ключа без срока жизни.
    pub fn as_secs(&self) -> i64 {
        match self {
            Self::Missing => -2,
            Self::Persistent => -1,
            Self::Expires(left) => i64::try_from(left.as_secs()).unwrap_or(i64::MAX),
        }
    }
}

/// Строковое хранилище ключ–значение с TTL.
///
/// Значения лежат в `DashMap`, дедлайны в [`ExpireMap`] под мьютексом.
/// Истёкшие ключи вычищаются лениво в начале каждой операции. Мьютекс
/// удерживается на время всей операции, так что вычистка и изменение
/// ключа не перемежаются.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: DashMap<String, String>,
    expires: Mutex<ExpireMap>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Записывает значение. `ttl = None` снимает прежний срок жизни.
    ///
    /// При недопустимом `ttl` ключ не меняется.
    pub fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> BusResult<()> {
        let mut expires = self.expires.lock();
        self.evict(&mut expires);
        match ttl {
            Some(ttl) => expires.set(key, ttl)?,
            None => {
                expires.remove(key);
            }
        }
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<String> {
        let mut expires = self.expires.lock();
        self.evict(&mut expires);
        self.data.get(key).map(|entry| entry.value().clone())
    }

    pub fn exists(
        &self,
        key: &str,
    ) -> bool {
        let mut expires = self.expires.lock();
        self.evict(&mut expires);
        self.data.contains_key(key)
    }

    /// Удаляет ключ. Возвращает `true`, если ключ существовал.
    pub fn del(
        &self,
        key: &str,
    ) -> bool {
        let mut expires = self.expires.lock();
        self.evict(&mut expires);
        expires.remove(key);
        self.data.remove(key).is_some()
    }

    /// Назначает срок жизни существующему ключу. `false`, если ключа нет.
    pub fn expire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> BusResult<bool> {
        let mut expires = self.expires.lock();
        self.evict(&mut expires);
        if !self.data.contains_key(key) {
            return Ok(false);
        }
        expires.set(key, ttl)?;
        Ok(true)
    }

    /// Снимает срок жизни. Возвращает `true`, если он был.
    pub fn persist(
        &self,
        key: &str,
    ) -> bool {
        let mut expires = self.expires.lock();
        self.evict(&mut expires);
        self.data.contains_key(key) && expires.remove(key)
    }

    pub fn ttl(
        &self,
        key: &str,
    ) -> KeyTtl {
        let mut expires = self.expires.lock();
        self.evict(&mut expires);
        if !self.data.contains_key(key) {
            return KeyTtl::Missing;
        }
        match expires.remaining(key) {
            Some(left) => KeyTtl::Expires(left),
            None => KeyTtl::Persistent,
        }
    }

    /// Возвращает все живые ключи, подходящие под glob-шаблон.
    ///
    /// Обратный слэш экранирует метасимволы (см. [`escape_glob`]).
    pub fn scan(
        &self,
        pattern: &str,
    ) -> BusResult<Vec<String>> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|e| StorageError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.kind().to_string(),
            })?
            .compile_matcher();

        let mut expires = self.expires.lock();
        self.evict(&mut expires);
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|entry| matcher.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }

    pub fn len(&self) -> usize {
        let mut expires = self.expires.lock();
        self.evict(&mut expires);
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(
        &self,
        expires: &mut ExpireMap,
    ) {
        for key in expires.purge() {
            trace!(key = %key, "Key expired");
            self.data.remove(&key);
        }
    }
}

/// Экранирует метасимволы glob, чтобы строка совпадала только с собой.
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '{' | '}' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
