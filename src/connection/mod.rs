//! Соединения с брокером.
//!
//! - `provider`: трейты [`ConnectionProvider`] и [`Connection`], через которые
//!   мессенджер и хранилище общаются с брокером.
//! - `pool`: ограниченный пул соединений к внутрипроцессному брокеру.

pub mod pool;
pub mod provider;

pub use pool::*;
pub use provider::*;
