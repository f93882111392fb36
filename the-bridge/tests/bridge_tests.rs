use std::{
  sync::Arc,
  time::Duration,
};

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde_json::json;
use the_bridge::{
  Bridge,
  BridgeConfig,
  BridgeError,
  CallbackRegistry,
  ChannelTransport,
  Envelope,
  EXECUTE_CALLBACK_ACTION,
};
use tokio::sync::mpsc::UnboundedReceiver;

fn bridge_with_timeout(timeout: Duration) -> (Bridge, UnboundedReceiver<String>) {
  let (transport, rx) = ChannelTransport::new();
  let config = BridgeConfig {
    request_timeout: timeout,
    ..BridgeConfig::default()
  };
  (Bridge::new(Arc::new(transport), config), rx)
}

fn bridge() -> (Bridge, UnboundedReceiver<String>) {
  bridge_with_timeout(Duration::from_secs(5))
}

/// Answer the first `batch` requests read from `rx` with
/// `{ echo: <payload> }`, optionally in reverse order.
fn spawn_echo_peer(bridge: Bridge, mut rx: UnboundedReceiver<String>, batch: usize, reverse: bool) {
  tokio::spawn(async move {
    let mut requests = Vec::new();
    while requests.len() < batch {
      let Some(raw) = rx.recv().await else {
        return;
      };
      requests.push(Envelope::decode(&raw).unwrap());
    }
    if reverse {
      requests.reverse();
    }
    for request in requests {
      let response = Envelope::response_to(
        &request,
        request.action.clone(),
        Some(json!({ "echo": request.payload })),
      );
      bridge.receive_message(&response.encode().unwrap()).await;
    }
  });
}

#[tokio::test]
async fn inbound_messages_are_handled_in_arrival_order() {
  let (bridge, _rx) = bridge();
  let log = Arc::new(Mutex::new(Vec::new()));

  let sink = log.clone();
  let _registration = bridge.register_handler("record", move |envelope| {
    let sink = sink.clone();
    async move {
      // Give other receive calls a chance to interleave.
      tokio::task::yield_now().await;
      sink.lock().push(envelope.payload.unwrap()["n"].as_u64().unwrap());
      Ok(())
    }
  });

  let messages: Vec<String> = (0..20)
    .map(|n| {
      Envelope::request(format!("peer-{n}"), "record", Some(json!({ "n": n })))
        .encode()
        .unwrap()
    })
    .collect();
  join_all(messages.iter().map(|raw| bridge.receive_message(raw))).await;

  assert_eq!(*log.lock(), (0..20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn failing_handler_does_not_stop_fan_out() {
  let (bridge, _rx) = bridge();
  let hits = Arc::new(Mutex::new(Vec::new()));

  let _failing =
    bridge.register_handler("x", |_| async { Err(anyhow::anyhow!("first handler broke")) });
  let _panicking = bridge.register_handler("x", |envelope: Envelope| async move {
    assert!(envelope.id.is_empty(), "second handler panicked");
    Ok(())
  });
  let sink = hits.clone();
  let _healthy = bridge.register_handler("x", move |envelope| {
    let sink = sink.clone();
    async move {
      sink.lock().push(envelope.id);
      Ok(())
    }
  });

  bridge
    .receive_message(&Envelope::notification("n-1", "x", None).encode().unwrap())
    .await;
  bridge
    .receive_message(&Envelope::notification("n-2", "x", None).encode().unwrap())
    .await;

  assert_eq!(*hits.lock(), vec!["n-1".to_string(), "n-2".to_string()]);
}

#[tokio::test]
async fn malformed_input_is_dropped_and_queue_keeps_working() {
  let (bridge, _rx) = bridge();
  let hits = Arc::new(Mutex::new(0));
  let counter = hits.clone();
  let _registration = bridge.register_handler("x", move |_| {
    let counter = counter.clone();
    async move {
      *counter.lock() += 1;
      Ok(())
    }
  });

  bridge.receive_message("{definitely not json").await;
  bridge.receive_message(r#"{"id":1}"#).await;
  bridge
    .receive_message(&Envelope::notification("ok", "x", None).encode().unwrap())
    .await;

  assert_eq!(*hits.lock(), 1);
}

#[tokio::test]
async fn responses_resolve_their_own_requests() {
  let (bridge, rx) = bridge();
  spawn_echo_peer(bridge.clone(), rx, 2, true);

  let (first, second) = tokio::join!(
    bridge.request("lookup", Some(json!("first"))),
    bridge.request("lookup", Some(json!("second"))),
  );

  assert_eq!(first.unwrap().payload, Some(json!({ "echo": "first" })));
  assert_eq!(second.unwrap().payload, Some(json!({ "echo": "second" })));
  assert_eq!(bridge.pending_requests(), 0);
}

#[tokio::test]
async fn send_message_returns_response_for_requests() {
  let (bridge, rx) = bridge();
  spawn_echo_peer(bridge.clone(), rx, 1, false);

  let response = bridge
    .send_message(Envelope::request("req-1", "lookup", Some(json!(3))))
    .await
    .unwrap()
    .unwrap();
  assert!(response.is_response());
  assert_eq!(response.correlation_key(), "req-1");
}

#[tokio::test(start_paused = true)]
async fn timed_out_request_is_removed_from_pending_table() {
  let (bridge, _rx) = bridge_with_timeout(Duration::from_millis(50));

  let err = bridge.request("never-answered", None).await.unwrap_err();
  assert!(matches!(err, BridgeError::Timeout { ref action, .. } if action == "never-answered"));
  assert_eq!(bridge.pending_requests(), 0);
}

#[tokio::test]
async fn transport_failure_clears_pending_entry() {
  let (bridge, rx) = bridge();
  drop(rx);

  let err = bridge.request("lookup", None).await.unwrap_err();
  assert!(matches!(err, BridgeError::PeerCall(_)));
  assert_eq!(bridge.pending_requests(), 0);
}

#[tokio::test]
async fn dispose_wakes_outstanding_requests() {
  let (bridge, _rx) = bridge();
  let waiter = {
    let bridge = bridge.clone();
    tokio::spawn(async move { bridge.request("lookup", None).await })
  };
  while bridge.pending_requests() == 0 {
    tokio::task::yield_now().await;
  }

  bridge.dispose();
  let err = waiter.await.unwrap().unwrap_err();
  assert!(err.is_disposed());
}

#[tokio::test]
async fn unmatched_response_goes_to_action_handlers_only() {
  let (bridge, _rx) = bridge();
  let seen = Arc::new(Mutex::new(Vec::new()));

  let sink = seen.clone();
  let _pong = bridge.register_handler("pong", move |envelope| {
    let sink = sink.clone();
    async move {
      sink.lock().push(("pong", envelope.id));
      Ok(())
    }
  });
  let sink = seen.clone();
  let _other = bridge.register_handler("other", move |envelope| {
    let sink = sink.clone();
    async move {
      sink.lock().push(("other", envelope.id));
      Ok(())
    }
  });

  let stray = Envelope::response_to(&Envelope::request("gone", "ping", None), "pong", None);
  bridge.receive_message(&stray.encode().unwrap()).await;

  assert_eq!(*seen.lock(), vec![("pong", "gone".to_string())]);
}

#[tokio::test]
async fn execute_callback_runs_registered_function_once() {
  let (bridge, _rx) = bridge();
  let registry = Arc::new(CallbackRegistry::new());
  let _registration = registry.attach(&bridge);

  let calls = Arc::new(Mutex::new(Vec::new()));
  let sink = calls.clone();
  let token = registry.register(move |args| sink.lock().push(args));

  let message = Envelope::notification(
    "peer-9",
    EXECUTE_CALLBACK_ACTION,
    Some(json!({ "callbackId": token.as_str(), "args": ["arg1"] })),
  );
  bridge.receive_message(&message.encode().unwrap()).await;

  let unknown = Envelope::notification(
    "peer-10",
    EXECUTE_CALLBACK_ACTION,
    Some(json!({ "callbackId": "cb-missing", "args": [] })),
  );
  bridge.receive_message(&unknown.encode().unwrap()).await;

  assert_eq!(*calls.lock(), vec![vec![json!("arg1")]]);
}

#[tokio::test]
async fn cancelled_drain_hands_queued_messages_to_a_new_drain() {
  let (bridge, _rx) = bridge();
  let started = Arc::new(Mutex::new(false));
  let seen = Arc::new(Mutex::new(Vec::new()));

  let flag = started.clone();
  let _stall = bridge.register_handler("stall", move |_| {
    let flag = flag.clone();
    async move {
      *flag.lock() = true;
      std::future::pending::<()>().await;
      Ok(())
    }
  });
  let sink = seen.clone();
  let _record = bridge.register_handler("record", move |envelope| {
    let sink = sink.clone();
    async move {
      sink.lock().push(envelope.id);
      Ok(())
    }
  });

  let stalled = {
    let bridge = bridge.clone();
    tokio::spawn(async move {
      let raw = Envelope::notification("s-1", "stall", None).encode().unwrap();
      bridge.receive_message(&raw).await;
    })
  };
  while !*started.lock() {
    tokio::task::yield_now().await;
  }

  // Queued behind the stalled drain.
  bridge
    .receive_message(&Envelope::notification("n-1", "record", None).encode().unwrap())
    .await;
  assert!(seen.lock().is_empty());

  stalled.abort();
  assert!(stalled.await.unwrap_err().is_cancelled());
  for _ in 0..100 {
    if !seen.lock().is_empty() {
      break;
    }
    tokio::task::yield_now().await;
  }
  assert_eq!(*seen.lock(), vec!["n-1".to_string()]);

  bridge
    .receive_message(&Envelope::notification("n-2", "record", None).encode().unwrap())
    .await;
  assert_eq!(*seen.lock(), vec!["n-1".to_string(), "n-2".to_string()]);
}
