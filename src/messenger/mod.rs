//! Мессенджер кластера.
//!
//! Три типа сообщений (`NORMAL`, `REQUEST`, `RESPONSE`) идут по одному
//! pub/sub каналу `cluster + "messenger:"`:
//!
//! - `envelope`: конверт и его JSON-представление.
//! - `serializer`: кодек конвертов.
//! - `handler`: потребитель входящих сообщений и обработчики ответов.
//! - `pending`: таблица запросов, ожидающих ответа.
//! - `scheduler`: отложенные задачи для таймаутов.
//! - `subscription`: фоновая подписка с переподключением.
//! - `messenger`: фасад [`PubSubMessenger`].

pub mod envelope;
pub mod handler;
#[allow(clippy::module_inception)]
pub mod messenger;
pub mod pending;
pub mod scheduler;
pub mod serializer;
pub mod subscription;

pub use envelope::*;
pub use handler::*;
pub use messenger::*;
pub use pending::*;
pub use scheduler::*;
pub use serializer::*;
pub use subscription::*;
