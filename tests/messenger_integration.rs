use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use clusterbus::{
    messenger::{Reply, ReplySlot},
    CorrelationId, InMemoryPool, Messenger, PoolConfig, PubSubMessenger, StatusCode,
    SubscriptionHandle, SubscriptionState,
};
use clusterbus_error::MessengerError;
use tokio::{sync::mpsc, time::Instant};

type Inbox = mpsc::UnboundedReceiver<(String, Option<CorrelationId>)>;

fn pool() -> Arc<InMemoryPool> {
    Arc::new(InMemoryPool::new(
        "lobby:",
        PoolConfig {
            max_connections: 8,
            acquire_timeout: Duration::from_millis(100),
            channel_capacity: 64,
        },
    ))
}

/// Узел кластера: мессенджер с потребителем, который пересылает всё в канал.
async fn node(pool: &Arc<InMemoryPool>) -> (Arc<PubSubMessenger>, SubscriptionHandle, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let consumer = move |payload: String, id: Option<CorrelationId>| {
        let _ = tx.send((payload, id));
    };
    let messenger = PubSubMessenger::builder(pool.clone(), Arc::new(consumer))
        .build()
        .unwrap();
    let mut handle = messenger.register().unwrap();
    assert!(handle.wait_for(SubscriptionState::Subscribed).await);
    (Arc::new(messenger), handle, rx)
}

/// Отвечает на каждый запрос из `inbox` строкой `reply(payload)`.
fn spawn_responder(
    messenger: Arc<PubSubMessenger>,
    mut inbox: Inbox,
    reply: fn(&str) -> String,
) {
    tokio::spawn(async move {
        while let Some((payload, id)) = inbox.recv().await {
            if let Some(id) = id {
                let _ = messenger.send_response(&reply(&payload), id).await;
            }
        }
    });
}

/// Тест проверяет, что NORMAL доходит до всех узлов, включая отправителя.
#[tokio::test]
async fn test_broadcast_reaches_every_node() {
    let pool = pool();
    let (a, _ha, mut inbox_a) = node(&pool).await;
    let (_b, _hb, mut inbox_b) = node(&pool).await;

    a.send("hello cluster").await.unwrap();

    assert_eq!(
        inbox_b.recv().await.unwrap(),
        ("hello cluster".to_string(), None)
    );
    assert_eq!(
        inbox_a.recv().await.unwrap(),
        ("hello cluster".to_string(), None)
    );
    assert_eq!(a.pending_requests(), 0);
    assert_eq!(a.stats().published, 1);
}

/// Тест проверяет полный цикл запрос/ответ между двумя узлами.
#[tokio::test]
async fn test_request_response_roundtrip() {
    let pool = pool();
    let (responder, _hr, inbox) = node(&pool).await;
    let (requester, _hq, _requester_inbox) = node(&pool).await;
    spawn_responder(responder.clone(), inbox, |p| format!("pong:{p}"));

    let reply = requester
        .request("ping", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply, "pong:ping");
    assert_eq!(requester.pending_requests(), 0);
    assert_eq!(requester.stats().resolved, 1);
}

/// Тест проверяет, что без ответа обработчик получает отказ ровно через
/// таймаут, и запись удаляется из таблицы.
#[tokio::test(start_paused = true)]
async fn test_request_times_out() {
    let pool = pool();
    let (requester, _h, _inbox) = node(&pool).await;

    let started = Instant::now();
    let err = requester
        .request("anyone?", Duration::from_millis(1500))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::RequestTimeout);
    assert!(matches!(
        err.downcast_ref::<MessengerError>(),
        Some(MessengerError::RequestTimeout { channel, .. }) if channel == "lobby:messenger:"
    ));
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert_eq!(requester.pending_requests(), 0);
    assert_eq!(requester.stats().timed_out, 1);
}

/// Тест проверяет, что поздний ответ после таймаута игнорируется.
#[tokio::test(start_paused = true)]
async fn test_late_response_is_dropped() {
    let pool = pool();
    let (requester, _h, mut inbox) = node(&pool).await;

    let (slot, rx) = ReplySlot::new();
    let id = requester
        .send_request("slow", Box::new(slot), Duration::from_millis(200))
        .await
        .unwrap();
    // Запрос возвращается самому отправителю.
    assert_eq!(inbox.recv().await.unwrap(), ("slow".to_string(), Some(id)));

    assert!(matches!(rx.await.unwrap(), Reply::TimedOut { .. }));
    requester.send_response("too late", id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let stats = requester.stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.resolved, 0);
    assert_eq!(stats.stale_responses, 1);
}

/// Тест проверяет, что дубликаты ответа вызывают обработчик один раз.
#[tokio::test]
async fn test_duplicate_responses_resolve_once() {
    let pool = pool();
    let (requester, _h, _inbox) = node(&pool).await;
    let (other, _ho, _other_inbox) = node(&pool).await;

    let calls = Arc::new(Mutex::new(Vec::new()));
    let ok = calls.clone();
    let fail = calls.clone();
    let handler = clusterbus::ResponseCallbacks::boxed(
        move |_: &str, payload: String| ok.lock().unwrap().push(payload),
        move |_: &str| fail.lock().unwrap().push("timeout".to_string()),
    );
    let id = requester
        .send_request("q", handler, Duration::from_secs(30))
        .await
        .unwrap();

    other.send_response("first", id).await.unwrap();
    other.send_response("second", id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*calls.lock().unwrap(), vec!["first".to_string()]);
    assert_eq!(requester.stats().stale_responses, 1);
}

/// Тест проверяет, что параллельные запросы не путают ответы.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_not_cross_wired() {
    let pool = pool();
    let (responder, _hr, inbox) = node(&pool).await;
    let (requester, _hq, _requester_inbox) = node(&pool).await;
    spawn_responder(responder.clone(), inbox, |p| format!("echo:{p}"));

    let tasks = (0..20)
        .map(|i| {
            let requester = requester.clone();
            tokio::spawn(async move {
                let payload = format!("req-{i}");
                let reply = requester
                    .request(&payload, Duration::from_secs(5))
                    .await
                    .unwrap();
                (payload, reply)
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        let (payload, reply) = task.await.unwrap();
        assert_eq!(reply, format!("echo:{payload}"));
    }
    assert_eq!(requester.pending_requests(), 0);
}

/// Тест проверяет, что мусор в канале не мешает обмену.
#[tokio::test]
async fn test_undecodable_message_is_skipped() {
    let pool = pool();
    let (a, _h, mut inbox) = node(&pool).await;

    pool.broker()
        .publish("lobby:messenger:", Bytes::from_static(b"{not json"));
    a.send("after garbage").await.unwrap();

    assert_eq!(inbox.recv().await.unwrap().0, "after garbage");
    assert_eq!(a.stats().undecodable, 1);
}

/// Тест проверяет восстановление подписки после недоступности брокера.
#[tokio::test(start_paused = true)]
async fn test_subscription_recovers_after_outage() {
    let pool = pool();
    let (a, mut handle, mut inbox) = node(&pool).await;

    pool.set_online(false);
    assert!(handle.wait_for(SubscriptionState::ReconnectWait).await);
    let err = a.send("lost").await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::ConnectionFailed);

    pool.set_online(true);
    assert!(handle.wait_for(SubscriptionState::Subscribed).await);
    a.send("back").await.unwrap();
    assert_eq!(inbox.recv().await.unwrap().0, "back");
}

/// Тест проверяет, что `unregister` останавливает подписку и новые
/// сообщения больше не приходят.
#[tokio::test]
async fn test_unregister_stops_delivery() {
    let pool = pool();
    let (a, mut handle, mut inbox) = node(&pool).await;
    let (b, _hb, _b_inbox) = node(&pool).await;

    a.unregister();
    assert!(handle.wait_for(SubscriptionState::Stopped).await);
    handle.join().await.unwrap();

    b.send("nobody home").await.unwrap();
    let nothing = tokio::time::timeout(Duration::from_millis(50), inbox.recv()).await;
    assert!(!matches!(nothing, Ok(Some(_))));
}

/// Тест проверяет, что операции до `register` отклоняются.
#[tokio::test]
async fn test_operations_require_registration() {
    let pool = pool();
    let consumer = |_: String, _: Option<CorrelationId>| {};
    let messenger = PubSubMessenger::builder(pool.clone(), Arc::new(consumer))
        .build()
        .unwrap();

    let (slot, _rx) = ReplySlot::new();
    let err = messenger
        .send_request("q", Box::new(slot), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NotRegistered);
    assert_eq!(pool.acquired_total(), 0);
}

/// Тест проверяет, что закрытие пула останавливает подписку навсегда.
#[tokio::test(start_paused = true)]
async fn test_pool_close_is_terminal() {
    let pool = pool();
    let (a, mut handle, _inbox) = node(&pool).await;

    pool.close();
    assert!(handle.wait_for(SubscriptionState::Stopped).await);
    assert_eq!(
        a.send("x").await.unwrap_err().status_code(),
        StatusCode::PoolClosed
    );
}
