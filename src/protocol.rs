//! Wire shapes for the AcornDB HTTP and WebSocket protocol.
//!
//! Every database operation is a JSON `POST` to a fixed path under the
//! configured base URL; the request bodies here mirror those paths one to one.
//! The realtime socket speaks flat JSON frames: outbound [`WsRequest`],
//! inbound [`WsEvent`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Window for a one-shot socket push before it fails with a timeout.
pub const PUSH_TIMEOUT_MS: u64 = 5000;

/// Settle delay between the socket opening and the outbound queue flush.
pub const FLUSH_SETTLE_MS: u64 = 100;

/// Address of one field of one document: `(collection, id, path)`.
///
/// `path` is only meaningful once `id` is set; a bare collection request
/// leaves both empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedRequest {
  pub collection: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub path: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRequest {
  pub collection: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub path: Option<Vec<String>>,
  pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
  pub collection: String,
  pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceRequest {
  pub collection: String,
  pub start: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end: Option<usize>,
}

/// Collection-scoped request with no further address: size, keys, getAll,
/// forEach, clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
  pub collection: String,
}

/// Server-evaluated predicate lookup, the redesigned `find`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindRequest {
  pub collection: String,
  pub query: Value,
}

/// Server-side field projection, the redesigned `map`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapRequest {
  pub collection: String,
  pub projection: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
  pub email: String,
  pub password: String,
}

/// Outbound socket frame. The request payload is flattened into the frame so
/// the server sees `{operation, eventName, collection, .., authorization}`.
#[derive(Debug, Clone, Serialize)]
pub struct WsRequest {
  pub operation: String,
  #[serde(rename = "eventName")]
  pub event_name: String,
  #[serde(flatten)]
  pub payload: Value,
  pub authorization: String,
}

/// Operations a server-sent socket frame can carry.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WsOp {
  Get,
  Filter,
  Push,
}

/// Sub-kind of an incremental `filter` update. Kinds this client does not
/// know are ignored rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterContent {
  Reset,
  Add,
  Edit,
  Delete,
  Drop,
  #[serde(other)]
  Unknown,
}

/// Inbound socket frame. `get` events address by `fullPath`, `filter` and
/// `push` events by `eventName`.
#[derive(Debug, Clone, Deserialize)]
pub struct WsEvent {
  pub operation: WsOp,
  #[serde(rename = "fullPath")]
  pub full_path: Option<String>,
  #[serde(rename = "eventName")]
  pub event_name: Option<String>,
  #[serde(default)]
  pub value: Value,
  pub content: Option<FilterContent>,
}
