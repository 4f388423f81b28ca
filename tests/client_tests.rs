//! Client tests for the AcornDB Rust SDK.
//!
//! Transport-independent behavior is exercised through the in-process
//! connector with a recording handler standing in for the server.

use acorndb::protocol::*;
use acorndb::{App, Config, ConnectorKind, Error, OpHandlers, PipelineRequest, Result};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory backend that logs every request it serves.
#[derive(Default)]
struct RecordingHandlers {
  log: Mutex<Vec<(String, Value)>>,
}

impl RecordingHandlers {
  fn record(&self, op: &str, req: &impl serde::Serialize) {
    self
      .log
      .lock()
      .unwrap()
      .push((op.to_string(), serde_json::to_value(req).unwrap()));
  }

  fn calls(&self) -> Vec<(String, Value)> {
    self.log.lock().unwrap().clone()
  }
}

impl OpHandlers for RecordingHandlers {
  fn size(&self, req: &CollectionRequest) -> Result<Value> {
    self.record("size", req);
    Ok(json!(2))
  }
  fn map(&self, req: &MapRequest) -> Result<Value> {
    self.record("map", req);
    Ok(json!(["Alice", "Bob"]))
  }
  fn filter(&self, req: &PipelineRequest) -> Result<Value> {
    self.record("filter", req);
    Ok(json!([]))
  }
  fn slice(&self, req: &SliceRequest) -> Result<Value> {
    self.record("slice", req);
    Ok(json!([{"id": "a"}]))
  }
  fn find(&self, req: &FindRequest) -> Result<Value> {
    self.record("find", req);
    Ok(json!({"id": "a", "age": 30}))
  }
  fn push(&self, req: &PushRequest) -> Result<Value> {
    self.record("push", req);
    Ok(json!("assigned-id"))
  }
  fn delete(&self, req: &KeyedRequest) -> Result<Value> {
    self.record("delete", req);
    Ok(json!(true))
  }
  fn set(&self, req: &SetRequest) -> Result<Value> {
    self.record("set", req);
    Ok(json!(true))
  }
  fn clear(&self, req: &CollectionRequest) -> Result<Value> {
    self.record("clear", req);
    Ok(json!(true))
  }
  fn get(&self, req: &KeyedRequest) -> Result<Value> {
    self.record("get", req);
    Ok(json!({"name": "Alice"}))
  }
  fn has(&self, req: &KeyedRequest) -> Result<Value> {
    self.record("has", req);
    Ok(json!(true))
  }
  fn keys(&self, req: &CollectionRequest) -> Result<Value> {
    self.record("keys", req);
    Ok(json!(["a", "b"]))
  }
  fn get_all(&self, req: &CollectionRequest) -> Result<Value> {
    self.record("get_all", req);
    Ok(json!([{"id": "a", "n": 1}, {"id": "b", "n": 2}]))
  }
}

fn local_app() -> (App, Arc<RecordingHandlers>) {
  let handlers = Arc::new(RecordingHandlers::default());
  let ops: Arc<dyn OpHandlers> = handlers.clone();
  let app = App::init(Config::local(ops)).unwrap();
  (app, handlers)
}

#[tokio::test]
async fn deep_set_issues_one_request_with_the_full_address() {
  let (app, handlers) = local_app();

  let ok = app
    .db()
    .collection("users")
    .doc("alice")
    .field("a")
    .field("b")
    .set(json!(5))
    .await
    .unwrap();
  assert!(ok);

  let calls = handlers.calls();
  assert_eq!(calls.len(), 1);
  assert_eq!(calls[0].0, "set");
  assert_eq!(
    calls[0].1,
    json!({"collection": "users", "id": "alice", "path": ["a", "b"], "value": 5})
  );
}

#[tokio::test]
async fn location_get_resolves_through_the_connector() {
  let (app, handlers) = local_app();

  let value = app
    .db()
    .collection("users")
    .doc("alice")
    .field("name")
    .get()
    .await
    .unwrap();
  assert_eq!(value, json!({"name": "Alice"}));

  let calls = handlers.calls();
  assert_eq!(calls[0].0, "get");
  assert_eq!(
    calls[0].1,
    json!({"collection": "users", "id": "alice", "path": ["name"]})
  );
}

#[tokio::test]
async fn location_delete_carries_its_path() {
  let (app, handlers) = local_app();

  let removed = app
    .db()
    .collection("users")
    .doc("alice")
    .field("temp")
    .delete()
    .await
    .unwrap();
  assert!(removed);

  let calls = handlers.calls();
  assert_eq!(calls[0].0, "delete");
  assert_eq!(
    calls[0].1,
    json!({"collection": "users", "id": "alice", "path": ["temp"]})
  );
}

#[tokio::test]
async fn collection_operations_round_trip() {
  let (app, handlers) = local_app();
  let users = app.db().collection("users");

  assert_eq!(users.size().await.unwrap(), 2);
  assert_eq!(users.keys().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
  assert!(users.has("a").await.unwrap());
  assert_eq!(users.push(json!({"n": 3})).await.unwrap(), "assigned-id");
  assert!(users.clear().await.unwrap());

  let ops: Vec<String> = handlers.calls().into_iter().map(|(op, _)| op).collect();
  assert_eq!(ops, ["size", "keys", "has", "push", "clear"]);
}

#[tokio::test]
async fn find_ships_the_predicate_not_code() {
  let (app, handlers) = local_app();

  let found = app
    .db()
    .collection("users")
    .find(acorndb::field("age").gte(18.0))
    .await
    .unwrap();
  assert_eq!(found["id"], "a");

  let calls = handlers.calls();
  assert_eq!(
    calls[0].1,
    json!({"collection": "users", "query": {"age": {"$gte": 18.0}}})
  );
}

#[tokio::test]
async fn for_each_visits_every_document() {
  let (app, _) = local_app();

  let mut seen = Vec::new();
  app
    .db()
    .collection("users")
    .for_each(|item| seen.push(item["id"].as_str().unwrap().to_string()))
    .await
    .unwrap();
  assert_eq!(seen, ["a", "b"]);
}

#[tokio::test]
async fn entries_pair_ids_with_documents() {
  let (app, _) = local_app();

  let entries = app.db().collection("users").entries().await.unwrap();
  assert_eq!(entries.len(), 2);
  assert_eq!(entries[0].0, "a");
  assert_eq!(entries[0].1["n"], 1);

  let values = app.db().collection("users").values().await.unwrap();
  assert_eq!(values.len(), 2);
}

#[tokio::test]
async fn ws_push_times_out_without_a_reply() {
  // Socket connector with no server: the subscribe frame queues forever and
  // the one-shot push must fail with the timeout error.
  let app = App::init(
    Config::new(ConnectorKind::Ws).with_push_timeout(Duration::from_millis(50)),
  )
  .unwrap();

  let result = app.db().collection("tests").push(json!({"n": 1})).await;
  match result {
    Err(Error::Timeout) => {}
    other => panic!("expected timeout, got {other:?}"),
  }
}

#[tokio::test]
async fn auth_failures_normalize_to_the_credential_error() {
  // Nothing listens here; the transport failure must surface as the one
  // generic credential error.
  let app = App::init(
    Config::new(ConnectorKind::Http).with_server_url("http://127.0.0.1:59999"),
  )
  .unwrap();

  let result = app
    .auth()
    .sign_in(&Credentials {
      email: "alice@example.com".to_string(),
      password: "hunter2".to_string(),
    })
    .await;
  match result {
    Err(Error::Credentials) => {}
    other => panic!("expected credential error, got {other:?}"),
  }
  assert!(!app.auth().session().is_signed_in());
}

#[test]
fn sign_out_clears_the_session() {
  let (app, _) = local_app();
  app.auth().sign_out();
  let session = app.auth().session();
  assert!(session.token.is_none());
  assert!(session.user_id.is_none());
}

#[test]
fn session_subscription_replays_the_current_value() {
  let (app, _) = local_app();
  let receiver = app.auth().subscribe();
  assert!(!receiver.borrow().is_signed_in());
}

#[test]
fn test_error_display() {
  let err = Error::Transport("connection refused".to_string());
  assert_eq!(format!("{}", err), "Transport error: connection refused");

  let err = Error::Credentials;
  assert_eq!(format!("{}", err), "Error logging in, verify email and password");

  let err = Error::Timeout;
  assert_eq!(format!("{}", err), "Push timed out");

  let err = Error::Protocol("bad frame".to_string());
  assert_eq!(format!("{}", err), "Protocol error: bad frame");

  let err = Error::ChannelClosed;
  assert_eq!(format!("{}", err), "Channel closed");
}

#[test]
fn test_error_from_json() {
  let json_err = serde_json::from_str::<Value>("invalid").unwrap_err();
  let err: Error = json_err.into();
  match err {
    Error::Serialization(_) => {}
    _ => panic!("Expected Serialization error"),
  }
}
