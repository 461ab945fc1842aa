use std::{sync::Arc, time::Duration};

use clusterbus_error::{BusResult, ResultExt, StorageError};
use tracing::debug;

use super::{escape_glob, KeyTtl};
use crate::connection::ConnectionProvider;

/// Хранилище ключ–значение с пространством имён.
///
/// Все ключи хранятся под префиксом `cluster + namespace + ":"`, поэтому
/// разные кластеры и разные пространства имён не пересекаются на одном
/// брокере. Каждая операция берёт отдельное соединение из пула.
#[derive(Clone)]
pub struct NamespacedStorage {
    provider: Arc<dyn ConnectionProvider>,
    prefix: String,
}

impl NamespacedStorage {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        namespace: &str,
    ) -> Self {
        let prefix = format!("{}{}:", provider.cluster(), namespace);
        Self { provider, prefix }
    }

    /// Полный префикс ключей, например `"lobby:sessions:"`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Записывает значение без срока жизни.
    pub async fn create(
        &self,
        key: &str,
        value: &str,
    ) -> BusResult<()> {
        self.write(key, value, None).await
    }

    /// Записывает значение со сроком жизни.
    pub async fn create_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> BusResult<()> {
        self.validate_ttl(key, ttl)?;
        self.write(key, value, Some(ttl)).await
    }

    /// То же, что [`create`](Self::create): запись перезаписывает значение
    /// и снимает прежний срок жизни.
    pub async fn update(
        &self,
        key: &str,
        value: &str,
    ) -> BusResult<()> {
        self.write(key, value, None).await
    }

    pub async fn update_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> BusResult<()> {
        self.validate_ttl(key, ttl)?;
        self.write(key, value, Some(ttl)).await
    }

    pub async fn contains(
        &self,
        key: &str,
    ) -> BusResult<bool> {
        let mut conn = self.provider.acquire().await?;
        conn.exists(&self.full_key(key)).await
    }

    pub async fn get(
        &self,
        key: &str,
    ) -> BusResult<Option<String>> {
        let mut conn = self.provider.acquire().await?;
        conn.get(&self.full_key(key)).await
    }

    /// Удаляет ключ. Возвращает `true`, если ключ существовал.
    pub async fn delete(
        &self,
        key: &str,
    ) -> BusResult<bool> {
        let mut conn = self.provider.acquire().await?;
        conn.del(&self.full_key(key)).await
    }

    /// Значения всех ключей пространства имён.
    ///
    /// Ключ, истёкший между сканированием и чтением, пропускается.
    pub async fn get_all_values(&self) -> BusResult<Vec<String>> {
        let mut conn = self.provider.acquire().await?;
        let pattern = format!("{}*", escape_glob(&self.prefix));
        let keys = conn
            .scan(&pattern)
            .await
            .with_context(|| format!("Scan keys under '{}'", self.prefix))?;

        let mut values = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(value) = conn.get(key).await? {
                values.push(value);
            }
        }
        debug!(prefix = %self.prefix, count = values.len(), "Collected namespace values");
        Ok(values)
    }

    /// Назначает срок жизни существующему ключу. `false`, если ключа нет.
    pub async fn set_ttl(
        &self,
        key: &str,
        ttl: Duration,
    ) -> BusResult<bool> {
        self.validate_ttl(key, ttl)?;
        let mut conn = self.provider.acquire().await?;
        conn.expire(&self.full_key(key), ttl).await
    }

    /// Снимает срок жизни. `true`, только если он был.
    pub async fn remove_ttl(
        &self,
        key: &str,
    ) -> BusResult<bool> {
        let mut conn = self.provider.acquire().await?;
        conn.persist(&self.full_key(key)).await
    }

    /// `true`, если ключ существует и у него есть срок жизни.
    ///
    /// В отличие от проверки `TTL != -1`, для отсутствующего ключа (`-2`)
    /// возвращает `false`.
    pub async fn has_ttl(
        &self,
        key: &str,
    ) -> BusResult<bool> {
        Ok(matches!(self.get_ttl(key).await?, KeyTtl::Expires(_)))
    }

    pub async fn get_ttl(
        &self,
        key: &str,
    ) -> BusResult<KeyTtl> {
        let mut conn = self.provider.acquire().await?;
        conn.ttl(&self.full_key(key)).await
    }

    async fn write(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> BusResult<()> {
        let mut conn = self.provider.acquire().await?;
        conn.set(&self.full_key(key), value, ttl).await
    }

    fn full_key(
        &self,
        key: &str,
    ) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn validate_ttl(
        &self,
        key: &str,
        ttl: Duration,
    ) -> BusResult<()> {
        if ttl.is_zero() {
            return Err(StorageError::InvalidTtl {
                key: self.full_key(key),
                reason: "ttl must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
