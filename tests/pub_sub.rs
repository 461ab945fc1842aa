use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use bytes::Bytes;
use clusterbus::{Broker, StatusCode};

/// Тест проверяет реальный сценарий: несколько подписчиков одного канала
/// в отдельных задачах получают все сообщения в порядке публикации.
#[tokio::test]
async fn test_ordered_fan_out_to_tasks() -> Result<(), Box<dyn std::error::Error>> {
    let broker = Arc::new(Broker::new(100));

    let tasks = (0..3)
        .map(|_| {
            let mut sub = broker.subscribe("lobby:messenger:");
            tokio::spawn(async move {
                let mut received = Vec::new();
                for _ in 0..3 {
                    match sub.recv().await {
                        Ok(msg) => received.push(String::from_utf8_lossy(&msg.payload).to_string()),
                        Err(_) => break,
                    }
                }
                received
            })
        })
        .collect::<Vec<_>>();

    for payload in ["one", "two", "three"] {
        broker.publish("lobby:messenger:", Bytes::from(payload));
    }

    for task in tasks {
        assert_eq!(task.await?, vec!["one", "two", "three"]);
    }
    assert_eq!(broker.publish_count.load(Ordering::Relaxed), 3);
    Ok(())
}

/// Тест проверяет, что каналы изолированы друг от друга.
#[tokio::test]
async fn test_channels_are_isolated() {
    let broker = Broker::new(10);
    let mut lobby = broker.subscribe("lobby:messenger:");
    let mut game = broker.subscribe("game:messenger:");

    broker.publish("game:messenger:", Bytes::from_static(b"for game"));
    let msg = game.recv().await.unwrap();
    assert_eq!(msg.payload_str().unwrap(), "for game");

    let nothing = tokio::time::timeout(Duration::from_millis(20), lobby.recv()).await;
    assert!(nothing.is_err());
}

/// Тест проверяет, что разрыв подписки выглядит как закрытие соединения.
#[tokio::test]
async fn test_disconnect_reports_connection_closed() {
    let broker = Broker::new(10);
    let mut sub = broker.subscribe("lobby:messenger:");
    broker.disconnect_all();

    let err = sub.recv().await.unwrap_err();
    let err = clusterbus::StackError::from(err);
    assert_eq!(err.status_code(), StatusCode::ConnectionClosed);
    assert!(err.is_retryable());
}

/// Тест проверяет счётчики брокера при публикации без слушателей.
#[tokio::test]
async fn test_statistics_without_listeners() {
    let broker = Broker::default();
    let sub = broker.subscribe("short-lived");
    assert_eq!(broker.subscriber_count("short-lived"), 1);
    sub.unsubscribe();

    assert_eq!(broker.publish("short-lived", Bytes::from_static(b"x")), 0);
    assert_eq!(broker.send_error_count.load(Ordering::Relaxed), 1);
    assert_eq!(broker.subscriber_count("short-lived"), 0);
}
