//! WebSocket sessions against a served router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use poll_tally::broadcast::ServerMessage;
use poll_tally::config::Config;
use poll_tally::routes::router;
use poll_tally::startup::AppState;
use poll_tally::store::{MemoryStore, TallyStore};
use poll_tally::tally::{Snapshot, TallyService};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct Server {
    addr: SocketAddr,
    service: TallyService,
    shutdown: CancellationToken,
}

async fn serve(store: MemoryStore) -> Server {
    let config = Config {
        options: vec!["A".to_string(), "B".to_string()],
        ..Config::default()
    };
    let shutdown = CancellationToken::new();
    let (state, _) = AppState::with_store(
        Arc::new(store) as Arc<dyn TallyStore>,
        &config,
        shutdown.clone(),
    )
    .await
    .expect("startup");
    let service = state.service.clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    Server {
        addr,
        service,
        shutdown,
    }
}

async fn connect(server: &Server) -> Client {
    let (client, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .expect("websocket handshake");
    client
}

/// Next text frame decoded as tallies.
async fn next_snapshot(client: &mut Client) -> Snapshot {
    loop {
        let frame = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("frame within timeout")
            .expect("stream still open")
            .expect("valid frame");
        match frame {
            Message::Text(text) => match serde_json::from_str::<ServerMessage>(&text).unwrap() {
                ServerMessage::ResultsUpdate(snapshot) => return snapshot,
            },
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn wait_for_subscribers(service: &TallyService, expected: usize) {
    tokio::time::timeout(WAIT, async {
        while service.subscribers() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected {expected} subscribers, still {}",
            service.subscribers()
        )
    });
}

#[tokio::test]
async fn first_frame_is_current_snapshot() {
    let server = serve(MemoryStore::with_counts([("A", 3), ("B", 1)])).await;
    let mut client = connect(&server).await;

    let first = next_snapshot(&mut client).await;
    assert_eq!(first, server.service.current_results());
    assert_eq!(first.get("A"), Some(3));
    assert_eq!(first.get("B"), Some(1));
}

#[tokio::test]
async fn one_frame_arrives_per_vote_in_order() {
    let server = serve(MemoryStore::new()).await;
    let mut client = connect(&server).await;
    next_snapshot(&mut client).await;

    let mut expected = Vec::new();
    for option in ["A", "B", "A", "A"] {
        expected.push(server.service.cast_vote(option).unwrap());
    }

    let mut received = Vec::new();
    for _ in 0..expected.len() {
        received.push(next_snapshot(&mut client).await);
    }
    assert_eq!(received, expected);
    assert_eq!(received.last().unwrap().get("A"), Some(3));
}

#[tokio::test]
async fn dropped_client_is_unsubscribed() {
    let server = serve(MemoryStore::new()).await;
    let mut client = connect(&server).await;
    next_snapshot(&mut client).await;
    assert_eq!(server.service.subscribers(), 1);

    drop(client);

    wait_for_subscribers(&server.service, 0).await;
    // Votes after the disconnect go nowhere and do not fail.
    server.service.cast_vote("A").unwrap();
}

#[tokio::test]
async fn close_frame_unsubscribes() {
    let server = serve(MemoryStore::new()).await;
    let mut client = connect(&server).await;
    next_snapshot(&mut client).await;

    client.close(None).await.unwrap();

    wait_for_subscribers(&server.service, 0).await;
}

#[tokio::test]
async fn shutdown_closes_sessions() {
    let server = serve(MemoryStore::new()).await;
    let mut client = connect(&server).await;
    next_snapshot(&mut client).await;

    server.shutdown.cancel();

    let ended = tokio::time::timeout(WAIT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "session must end after shutdown");
    wait_for_subscribers(&server.service, 0).await;
}

#[tokio::test]
async fn many_clients_each_get_every_vote() {
    let server = serve(MemoryStore::new()).await;
    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut client = connect(&server).await;
        next_snapshot(&mut client).await;
        clients.push(client);
    }
    assert_eq!(server.service.subscribers(), 3);

    let last = (0..10)
        .map(|_| server.service.cast_vote("B").unwrap())
        .last()
        .unwrap();

    for client in &mut clients {
        let mut seen = None;
        for _ in 0..10 {
            seen = Some(next_snapshot(client).await);
        }
        assert_eq!(seen.as_ref(), Some(&last));
    }
}
