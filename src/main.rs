//! Демонстрационный узел clusterbus.
//!
//! Поднимает два мессенджера на одном внутрипроцессном пуле и прогоняет
//! запрос/ответ, широковещательное сообщение или операции хранилища.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clusterbus::{
    init_logging, CorrelationId, InMemoryPool, KeyTtl, Messenger, NamespacedStorage,
    PubSubMessenger, Settings, StackError, SubscriptionHandle, SubscriptionState,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Аргументы командной строки.
#[derive(Parser)]
#[command(name = "clusterbus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cluster pub/sub messenger demo", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Путь к TOML-файлу настроек
    #[arg(long, global = true, env = "CLUSTERBUS_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Запрос с одного узла, ответ с другого
    Ping {
        #[arg(long, default_value = "ping")]
        payload: String,
        /// Таймаут ответа; по умолчанию из настроек
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// NORMAL сообщение, которое видит второй узел
    Broadcast {
        #[arg(long)]
        payload: String,
    },
    /// Запись и чтение через хранилище с пространством имён
    Store {
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let logging = init_logging(settings.logging.clone()).context("Failed to init logging")?;

    let pool = Arc::new(InMemoryPool::new(
        settings.cluster.clone(),
        settings.pool.to_pool_config(),
    ));
    let result = match cli.command {
        Commands::Ping {
            payload,
            timeout_ms,
        } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| settings.messenger.request_timeout());
            ping(&pool, &settings, &payload, timeout).await
        }
        Commands::Broadcast { payload } => broadcast(&pool, &settings, &payload).await,
        Commands::Store {
            key,
            value,
            ttl_secs,
        } => store(&pool, &key, &value, ttl_secs.map(Duration::from_secs)).await,
    };

    pool.close();
    logging.shutdown();
    if let Some(err) = result.as_ref().err().and_then(|e| e.downcast_ref::<StackError>()) {
        eprintln!("[{}] {}", err.status_code().code(), err.client_message());
    }
    result
}

type Inbox = mpsc::UnboundedReceiver<(String, Option<CorrelationId>)>;

/// Узел, чей потребитель пересылает входящие сообщения в канал.
fn node(
    pool: &Arc<InMemoryPool>,
    settings: &Settings,
) -> Result<(Arc<PubSubMessenger>, SubscriptionHandle, Inbox)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let consumer = move |payload: String, id: Option<CorrelationId>| {
        let _ = tx.send((payload, id));
    };
    let messenger = PubSubMessenger::builder(pool.clone(), Arc::new(consumer))
        .reconnect_backoff(settings.messenger.reconnect_backoff())
        .build()?;
    let handle = messenger.register()?;
    Ok((Arc::new(messenger), handle, rx))
}

async fn wait_subscribed(handle: &mut SubscriptionHandle) -> Result<()> {
    if handle.wait_for(SubscriptionState::Subscribed).await {
        Ok(())
    } else {
        anyhow::bail!("subscription stopped before it was established")
    }
}

async fn ping(
    pool: &Arc<InMemoryPool>,
    settings: &Settings,
    payload: &str,
    timeout: Duration,
) -> Result<()> {
    let (responder, mut responder_sub, mut inbox) = node(pool, settings)?;
    let (requester, mut requester_sub, _requester_inbox) = node(pool, settings)?;
    wait_subscribed(&mut responder_sub).await?;
    wait_subscribed(&mut requester_sub).await?;

    let replier = responder.clone();
    tokio::spawn(async move {
        while let Some((payload, id)) = inbox.recv().await {
            let Some(id) = id else { continue };
            if let Err(err) = replier.send_response(&format!("pong: {payload}"), id).await {
                warn!(error = %err, "Failed to answer request");
            }
        }
    });

    let reply = requester.request(payload, timeout).await?;
    println!("{reply}");
    info!(stats = ?requester.stats(), "Ping finished");

    responder.unregister();
    requester.unregister();
    Ok(())
}

async fn broadcast(
    pool: &Arc<InMemoryPool>,
    settings: &Settings,
    payload: &str,
) -> Result<()> {
    let (listener, mut listener_sub, mut inbox) = node(pool, settings)?;
    let (sender, mut sender_sub, _sender_inbox) = node(pool, settings)?;
    wait_subscribed(&mut listener_sub).await?;
    wait_subscribed(&mut sender_sub).await?;

    sender.send(payload).await?;
    let received = tokio::time::timeout(settings.messenger.request_timeout(), inbox.recv())
        .await
        .context("Peer did not observe the broadcast")?;
    if let Some((message, _)) = received {
        println!("{message}");
    }

    listener.unregister();
    sender.unregister();
    Ok(())
}

async fn store(
    pool: &Arc<InMemoryPool>,
    key: &str,
    value: &str,
    ttl: Option<Duration>,
) -> Result<()> {
    let storage = NamespacedStorage::new(pool.clone(), "demo");
    match ttl {
        Some(ttl) => storage.create_with_ttl(key, value, ttl).await?,
        None => storage.create(key, value).await?,
    }

    let stored = storage.get(key).await?.unwrap_or_default();
    let ttl = match storage.get_ttl(key).await? {
        KeyTtl::Expires(left) => format!("{}s", left.as_secs()),
        KeyTtl::Persistent => "none".to_string(),
        KeyTtl::Missing => "missing".to_string(),
    };
    println!("{}{key} = {stored} (ttl: {ttl})", storage.prefix());
    Ok(())
}
