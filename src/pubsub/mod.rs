//! Подсистема Publish–Subscribe (pub/sub).
//!
//! Внутрипроцессный брокер, которым пользуется пул соединений:
//!
//! - `broker`: регистрация каналов, публикация и принудительный разрыв
//!   подписок.
//! - `message`: сообщение, доставляемое подписчикам канала.
//! - `subscriber`: подписка на один канал.
//!
//! Подписки по шаблонам не поддерживаются.

pub mod broker;
pub mod message;
pub mod subscriber;

// Публичный экспорт типов из вложенных модулей, чтобы упростить доступ к ним
// из внешнего кода.
pub use broker::*;
pub use message::*;
pub use subscriber::*;
