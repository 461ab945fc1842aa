//! Хранилище ключ–значение.
//!
//! - `expire`: дедлайны ключей.
//! - `memory`: строковое хранилище с TTL, на котором работает брокер.
//! - `namespaced`: ключи с префиксом кластера и пространства имён поверх
//!   [`ConnectionProvider`](crate::connection::ConnectionProvider).

pub mod expire;
pub mod memory;
pub mod namespaced;

pub use expire::*;
pub use memory::*;
pub use namespaced::*;
