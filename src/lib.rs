/// Layered settings: defaults, TOML file, `CLUSTERBUS__*` environment.
pub mod config;
/// Connection provider traits and the bounded in-process pool.
pub mod connection;
/// `tracing` subscriber setup (filters, formats, sinks).
pub mod logging;
/// Cluster messenger: envelopes, pending requests, resilient subscription.
pub mod messenger;
/// Pub/Sub: Broker, Subscription, Message.
pub mod pubsub;
/// Key/value storage with expirations and namespaces.
pub mod storage;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Error stack shared by every module.
pub use clusterbus_error::{BusResult, StackError, StatusCode};
/// Settings.
pub use config::{MessengerSettings, PoolSettings, Settings, SettingsError};
/// Connections.
pub use connection::{Connection, ConnectionProvider, InMemoryPool, PoolConfig};
/// Logging.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Messenger API.
pub use messenger::{
    CorrelationId, Envelope, JsonSerializer, MessageConsumer, MessageKind, Messenger,
    MessengerStats, PubSubMessenger, ResponseCallbacks, ResponseHandler, Scheduler, Serializer,
    SubscriptionHandle, SubscriptionState, TokioScheduler,
};
/// Pub/Sub API.
pub use pubsub::{Broker, Message, Subscription};
/// Storage API.
pub use storage::{InMemoryStore, KeyTtl, NamespacedStorage};
