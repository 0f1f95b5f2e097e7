//! Cross-node integration tests over real TCP sockets.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use troupe_actor::{producer, ActorEvent, Context, Engine, EngineConfig, Receiver};
use troupe_remote::{register_type, Remote, RemoteConfig};

fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        register_type::<String>();
    });
}

/// Each test gets its own ports so they can run in parallel
fn next_addr() -> String {
    static PORT: AtomicU16 = AtomicU16::new(42100);
    format!("127.0.0.1:{}", PORT.fetch_add(1, Ordering::SeqCst))
}

async fn remote_engine(addr: &str) -> Engine {
    init();
    let remote = Remote::new(addr, RemoteConfig::default());
    Engine::new(EngineConfig::new().with_remote(remote))
        .await
        .expect("engine with remote")
}

struct Echo;

#[async_trait]
impl Receiver for Echo {
    async fn receive(&mut self, ctx: &Context) {
        if let Some(msg) = ctx.message().downcast_ref::<String>() {
            ctx.respond(msg.clone());
        }
    }
}

struct Recorder {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Receiver for Recorder {
    async fn receive(&mut self, ctx: &Context) {
        if let Some(msg) = ctx.message().downcast_ref::<String>() {
            let _ = self.tx.send(msg.clone());
        }
    }
}

#[tokio::test]
async fn test_cross_node_request() {
    let addr_a = next_addr();
    let addr_b = next_addr();
    let engine_a = remote_engine(&addr_a).await;
    let engine_b = remote_engine(&addr_b).await;

    let echo = engine_a.spawn_with(
        producer(|| Echo),
        "echo",
        troupe_actor::Opts::default().with_id("1"),
    );
    assert_eq!(echo.address, addr_a);
    assert_eq!(echo.id, "echo/1");

    let resp = engine_b
        .request(&echo, "hello".to_string(), Duration::from_secs(1))
        .result()
        .await
        .expect("cross-node echo");
    assert_eq!(resp.downcast_ref::<String>(), Some(&"hello".to_string()));
}

#[tokio::test]
async fn test_cross_node_fire_and_forget_preserves_order() {
    let addr_a = next_addr();
    let addr_b = next_addr();
    let engine_a = remote_engine(&addr_a).await;
    let engine_b = remote_engine(&addr_b).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let recorder = engine_a.spawn(producer(move || Recorder { tx: tx.clone() }), "recorder");

    for i in 0..200 {
        engine_b.send(&recorder, format!("m{i}"));
    }
    for i in 0..200 {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("cross-node delivery")
            .expect("recorder alive");
        assert_eq!(msg, format!("m{i}"));
    }
}

#[tokio::test]
async fn test_unreachable_peer_publishes_event() {
    let addr = next_addr();
    let engine = remote_engine(&addr).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let probe = engine.spawn(
        producer(move || EventRecorder { tx: tx.clone() }),
        "probe",
    );
    engine.subscribe(&probe);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Nothing listens on port 1; all dial attempts fail.
    let dead = troupe_actor::Pid::new("127.0.0.1:1", "echo/1");
    engine.send(&dead, "anyone?".to_string());

    let listen_addr = tokio::time::timeout(Duration::from_secs(8), rx.recv())
        .await
        .expect("unreachable event within dial budget")
        .expect("probe alive");
    assert_eq!(listen_addr, "127.0.0.1:1");
}

struct EventRecorder {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Receiver for EventRecorder {
    async fn receive(&mut self, ctx: &Context) {
        if let Some(ActorEvent::RemoteUnreachable { listen_addr }) =
            ctx.message().downcast_ref::<ActorEvent>()
        {
            let _ = self.tx.send(listen_addr.clone());
        }
    }
}

#[tokio::test]
async fn test_writer_reconnects_after_peer_restart() {
    init();
    let addr_a = next_addr();
    let addr_b = next_addr();
    let engine_a = remote_engine(&addr_a).await;

    // First incarnation of the peer.
    let remote_b = Remote::new(&addr_b, RemoteConfig::default());
    let engine_b = Engine::new(EngineConfig::new().with_remote(remote_b.clone()))
        .await
        .expect("first peer engine");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let recorder = engine_b.spawn_with(
        producer(move || Recorder { tx: tx.clone() }),
        "recorder",
        troupe_actor::Opts::default().with_id("1"),
    );
    engine_a.send(&recorder, "one".to_string());
    let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first delivery")
        .expect("recorder alive");
    assert_eq!(msg, "one");

    // Stopping the remote closes the listener and every inbound stream, so
    // the writer on A notices, publishes RemoteUnreachable, and the router
    // evicts the dead stream. A later send spawns a fresh writer.
    use troupe_actor::Remoter;
    remote_b.stop().await;
    drop(rx);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let engine_b2 = remote_engine(&addr_b).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let recorder = engine_b2.spawn_with(
        producer(move || Recorder { tx: tx.clone() }),
        "recorder",
        troupe_actor::Opts::default().with_id("1"),
    );

    // Retry until the reconnect lands; buffered messages from the dead
    // stream are allowed to be lost.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        engine_a.send(&recorder, "two".to_string());
        match tokio::time::timeout(Duration::from_millis(250), rx.recv()).await {
            Ok(Some(msg)) => {
                assert_eq!(msg, "two");
                break;
            }
            _ if tokio::time::Instant::now() > deadline => panic!("no redelivery after restart"),
            _ => {}
        }
    }
}
