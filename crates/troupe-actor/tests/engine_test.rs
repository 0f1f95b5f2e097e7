//! Engine integration tests: spawning, routing, supervision, lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use troupe_actor::{
    producer, ActorError, ActorEvent, Context, Engine, EngineConfig, InternalFailure, Middleware,
    Next, Opts, Pid, Receiver,
};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

async fn local_engine() -> Engine {
    init_tracing();
    Engine::new(EngineConfig::new()).await.expect("engine")
}

/// Receiver that replies to every string with the same string
struct Echo;

#[async_trait]
impl Receiver for Echo {
    async fn receive(&mut self, ctx: &Context) {
        if let Some(msg) = ctx.message().downcast_ref::<String>() {
            ctx.respond(msg.clone());
        }
    }
}

/// Receiver that copies every string it sees into a channel
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

fn recorder_producer(tx: mpsc::UnboundedSender<String>) -> troupe_actor::Producer {
    producer(move || Recorder { tx: tx.clone() })
}

/// Receiver that copies every engine event into a channel
struct EventProbe {
    tx: mpsc::UnboundedSender<ActorEvent>,
}

#[async_trait]
impl Receiver for EventProbe {
    async fn receive(&mut self, ctx: &Context) {
        if let Some(event) = ctx.message().downcast_ref::<ActorEvent>() {
            let _ = self.tx.send(event.clone());
        }
    }
}

fn subscribe_probe(engine: &Engine) -> mpsc::UnboundedReceiver<ActorEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    let pid = engine.spawn(producer(move || EventProbe { tx: tx.clone() }), "probe");
    engine.subscribe(&pid);
    rx
}

async fn recv_timeout<T>(rx: &mut mpsc::UnboundedReceiver<T>, what: &str) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap_or_else(|| panic!("channel closed waiting for {what}"))
}

#[tokio::test]
async fn test_local_request_echo() {
    let engine = local_engine().await;
    let echo = engine.spawn(producer(|| Echo), "echo");

    let resp = engine
        .request(&echo, "ping".to_string(), Duration::from_millis(100))
        .result()
        .await
        .expect("echo reply");
    assert_eq!(resp.downcast_ref::<String>(), Some(&"ping".to_string()));
}

#[tokio::test]
async fn test_request_timeout() {
    let engine = local_engine().await;
    // A receiver that never responds.
    let silent = engine.spawn_fn(|_ctx| {}, "silent");

    let err = engine
        .request(&silent, "anyone?".to_string(), Duration::from_millis(50))
        .result()
        .await
        .expect_err("no reply expected");
    assert!(matches!(err, ActorError::RequestTimeout { timeout_ms: 50 }));
}

#[tokio::test]
async fn test_dead_letter_on_unknown_pid() {
    let engine = local_engine().await;
    let mut events = subscribe_probe(&engine);
    // Give the subscription time to land before producing the event.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let missing = Pid::new(engine.address(), "missing");
    engine.send(&missing, 42i32);

    loop {
        let event = recv_timeout(&mut events, "dead letter").await;
        if let ActorEvent::DeadLetter {
            target, message, ..
        } = event
        {
            assert_eq!(target, missing);
            assert_eq!(message.downcast_ref::<i32>(), Some(&42));
            return;
        }
    }
}

#[tokio::test]
async fn test_single_sender_fifo_order() {
    let engine = local_engine().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pid = engine.spawn(recorder_producer(tx), "recorder");

    for i in 0..500 {
        engine.send(&pid, format!("m{i}"));
    }
    for i in 0..500 {
        assert_eq!(recv_timeout(&mut rx, "ordered message").await, format!("m{i}"));
    }
}

#[tokio::test]
async fn test_restart_replays_unprocessed_tail() {
    let engine = local_engine().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx = Arc::new(tx);

    let pid = engine.spawn_with(
        producer({
            let tx = Arc::clone(&tx);
            move || Recorder2 { tx: (*tx).clone() }
        }),
        "crasher",
        Opts::default()
            .with_max_restarts(3)
            .with_restart_delay(Duration::ZERO),
    );

    engine.send(&pid, "a".to_string());
    engine.send(&pid, "crash".to_string());
    engine.send(&pid, "b".to_string());

    assert_eq!(recv_timeout(&mut rx, "a").await, "a");
    // "b" arrives after the restart; the crashing message is not retried.
    assert_eq!(recv_timeout(&mut rx, "b").await, "b");
}

/// Recorder that panics on "crash"
struct Recorder2 {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Receiver for Recorder2 {
    async fn receive(&mut self, ctx: &Context) {
        if let Some(msg) = ctx.message().downcast_ref::<String>() {
            if msg == "crash" {
                panic!("crash requested");
            }
            let _ = self.tx.send(msg.clone());
        }
    }
}

#[tokio::test]
async fn test_max_restarts_terminates_process() {
    let engine = local_engine().await;
    let mut events = subscribe_probe(&engine);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let pid = engine.spawn_with(
        producer(|| AlwaysPanics),
        "doomed",
        Opts::default()
            .with_max_restarts(1)
            .with_restart_delay(Duration::ZERO),
    );
    engine.send(&pid, "go".to_string());

    let mut saw_restart = false;
    loop {
        match recv_timeout(&mut events, "supervision events").await {
            ActorEvent::ActorRestarted { restarts, .. } => {
                assert_eq!(restarts, 1);
                saw_restart = true;
            }
            ActorEvent::ActorMaxRestartsExceeded { pid: dead } => {
                assert_eq!(dead, pid);
                assert!(saw_restart);
                break;
            }
            _ => {}
        }
    }
    // Terminal cleanup removed the process; further sends dead-letter.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(engine.registry().get_pid("doomed", &pid.id["doomed/".len()..]).is_none());
}

struct AlwaysPanics;

#[async_trait]
impl Receiver for AlwaysPanics {
    async fn receive(&mut self, ctx: &Context) {
        if ctx.message().is::<String>() {
            panic!("unconditional");
        }
    }
}

#[tokio::test]
async fn test_internal_failure_keeps_restart_credit() {
    let engine = local_engine().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let attempts = Arc::new(AtomicUsize::new(0));

    // max_restarts = 0: a regular fault would be terminal. The internal
    // failure path must restart anyway without consuming a credit.
    let pid = engine.spawn_with(
        producer({
            let tx = tx.clone();
            let attempts = Arc::clone(&attempts);
            move || DialFlake {
                tx: tx.clone(),
                attempts: Arc::clone(&attempts),
            }
        }),
        "flaky",
        Opts::default()
            .with_max_restarts(0)
            .with_restart_delay(Duration::ZERO),
    );

    engine.send(&pid, "dial".to_string());
    engine.send(&pid, "ok".to_string());
    assert_eq!(recv_timeout(&mut rx, "post-restart message").await, "ok");
    assert!(attempts.load(Ordering::SeqCst) >= 1);
}

struct DialFlake {
    tx: mpsc::UnboundedSender<String>,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Receiver for DialFlake {
    async fn receive(&mut self, ctx: &Context) {
        if let Some(msg) = ctx.message().downcast_ref::<String>() {
            if msg == "dial" {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                std::panic::panic_any(InternalFailure::new("dial", "connection refused"));
            }
            let _ = self.tx.send(msg.clone());
        }
    }
}

#[tokio::test]
async fn test_poison_removes_process_and_children() {
    let engine = local_engine().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let parent = engine.spawn(
        producer({
            let tx = tx.clone();
            move || Supervisor { tx: tx.clone() }
        }),
        "supervisor",
    );

    // The supervisor reports its child pid once started.
    let child_id = recv_timeout(&mut rx, "child pid").await;

    engine.poison(&parent).done().await;

    let registry = engine.registry();
    assert!(registry.get_pid("supervisor", &parent.id["supervisor/".len()..]).is_none());
    assert!(registry
        .get_pid(&child_id[..child_id.rfind('/').unwrap()], &child_id[child_id.rfind('/').unwrap() + 1..])
        .is_none());
}

/// Spawns one child on start and reports its id
struct Supervisor {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Receiver for Supervisor {
    async fn receive(&mut self, ctx: &Context) {
        if ctx.message().is::<troupe_actor::Started>() {
            let child = ctx.spawn_child_fn(|_| {}, "worker");
            let _ = self.tx.send(child.id);
        }
    }
}

#[tokio::test]
async fn test_graceful_poison_drains_pending_messages() {
    let engine = local_engine().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pid = engine.spawn(recorder_producer(tx), "drainer");

    for i in 0..50 {
        engine.send(&pid, format!("m{i}"));
    }
    engine.poison(&pid).done().await;

    let mut seen = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        seen.push(msg);
    }
    assert_eq!(seen.len(), 50);
}

#[tokio::test]
async fn test_duplicate_id_keeps_incumbent() {
    let engine = local_engine().await;
    let mut events = subscribe_probe(&engine);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let opts = Opts::default().with_id("one");
    let first = engine.spawn_with(producer(|| Echo), "echo", opts.clone());
    let second = engine.spawn_with(producer(|| Echo), "echo", opts);
    assert_eq!(first, second);

    loop {
        if let ActorEvent::ActorDuplicateId { pid } =
            recv_timeout(&mut events, "duplicate id event").await
        {
            assert_eq!(pid, first);
            break;
        }
    }

    // The incumbent still answers.
    let resp = engine
        .request(&first, "still here".to_string(), Duration::from_millis(100))
        .result()
        .await
        .expect("incumbent reply");
    assert_eq!(resp.downcast_ref::<String>(), Some(&"still here".to_string()));
}

#[tokio::test]
async fn test_event_stream_unsubscribe() {
    let engine = local_engine().await;
    let (tx, rx) = mpsc::unbounded_channel();
    let probe = engine.spawn(
        producer(move || CountingProbe { tx: tx.clone() }),
        "probe",
    );
    engine.subscribe(&probe);
    tokio::time::sleep(Duration::from_millis(20)).await;

    engine.broadcast_event("first".to_string());
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.unsubscribe(&probe);
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.broadcast_event("second".to_string());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut rx = rx;
    assert_eq!(rx.try_recv().ok(), Some("first".to_string()));
    assert!(rx.try_recv().is_err());
}

struct CountingProbe {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Receiver for CountingProbe {
    async fn receive(&mut self, ctx: &Context) {
        if let Some(msg) = ctx.message().downcast_ref::<String>() {
            let _ = self.tx.send(msg.clone());
        }
    }
}

#[tokio::test]
async fn test_middleware_runs_outermost_first() {
    let engine = local_engine().await;
    let order = Arc::new(Mutex::new(Vec::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();

    struct Tag {
        name: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, ctx: &Context, next: Next<'_>) {
            if ctx.message().is::<String>() {
                self.order.lock().unwrap().push(self.name);
            }
            next.run(ctx).await;
        }
    }

    let opts = Opts::default()
        .with_middleware(Arc::new(Tag {
            name: "outer",
            order: Arc::clone(&order),
        }))
        .with_middleware(Arc::new(Tag {
            name: "inner",
            order: Arc::clone(&order),
        }));

    let pid = engine.spawn_with(recorder_producer(tx), "layered", opts);
    engine.send(&pid, "hello".to_string());
    assert_eq!(recv_timeout(&mut rx, "middleware-wrapped message").await, "hello");
    assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
}

#[tokio::test]
async fn test_send_repeat_delivers_until_stopped() {
    let engine = local_engine().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pid = engine.spawn(recorder_producer(tx), "ticker");

    let repeater = engine.send_repeat(&pid, "tick".to_string(), Duration::from_millis(10));
    assert_eq!(recv_timeout(&mut rx, "first tick").await, "tick");
    assert_eq!(recv_timeout(&mut rx, "second tick").await, "tick");
    repeater.stop();

    tokio::time::sleep(Duration::from_millis(50)).await;
    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err(), "no ticks after stop");
}

#[tokio::test]
async fn test_stop_handle_resolves_for_unknown_pid() {
    let engine = local_engine().await;
    let missing = Pid::new(engine.address(), "ghost/1");
    // Must not hang: the handle resolves immediately with a dead letter.
    tokio::time::timeout(Duration::from_millis(100), engine.poison(&missing).done())
        .await
        .expect("immediate resolution");
}
