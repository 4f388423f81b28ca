//! The transport layer: three interchangeable connectors behind one
//! 14-operation contract.
//!
//! `HTTP` maps every operation to one `POST` under the configured base URL.
//! `WS` reuses the HTTP path for request/response operations and resolves
//! `push` through a one-shot realtime subscription. `LOCAL` hands every
//! operation to a caller-supplied [`OpHandlers`] implementation.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::codec;
use crate::error::{Error, Result};
use crate::protocol::{
    CollectionRequest, FindRequest, KeyedRequest, MapRequest, PushRequest, SetRequest,
    SliceRequest,
};
use crate::query::PipelineRequest;
use crate::realtime::Multiplexer;
use crate::session::Session;

/// Caller-supplied backend for the in-process connector.
///
/// The contract mirrors the wire operations one to one; implementations may
/// compute results synchronously. Request and response shapes match what the
/// HTTP connector would have sent and unwrapped.
pub trait OpHandlers: Send + Sync {
    fn size(&self, req: &CollectionRequest) -> Result<Value>;
    fn map(&self, req: &MapRequest) -> Result<Value>;
    fn filter(&self, req: &PipelineRequest) -> Result<Value>;
    fn slice(&self, req: &SliceRequest) -> Result<Value>;
    fn find(&self, req: &FindRequest) -> Result<Value>;
    fn push(&self, req: &PushRequest) -> Result<Value>;
    fn delete(&self, req: &KeyedRequest) -> Result<Value>;
    fn set(&self, req: &SetRequest) -> Result<Value>;
    fn clear(&self, req: &CollectionRequest) -> Result<Value>;
    fn get(&self, req: &KeyedRequest) -> Result<Value>;
    fn has(&self, req: &KeyedRequest) -> Result<Value>;
    fn keys(&self, req: &CollectionRequest) -> Result<Value>;
    fn get_all(&self, req: &CollectionRequest) -> Result<Value>;

    /// Iteration source; by default the full collection.
    fn for_each(&self, req: &CollectionRequest) -> Result<Value> {
        self.get_all(req)
    }
}

/// Request/response transport over HTTP.
pub struct HttpConnector {
    http: reqwest::Client,
    base_url: parking_lot::RwLock<String>,
    api_key: parking_lot::RwLock<Option<String>>,
    session: watch::Receiver<Session>,
}

impl HttpConnector {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        session: watch::Receiver<Session>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: parking_lot::RwLock::new(base_url),
            api_key: parking_lot::RwLock::new(api_key),
            session,
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().clone()
    }

    pub fn set_base_url(&self, base_url: String) {
        *self.base_url.write() = base_url;
    }

    pub fn set_api_key(&self, api_key: Option<String>) {
        *self.api_key.write() = api_key;
    }

    /// One JSON `POST`. The body is codec-encoded on the way out and the
    /// response decoded on the way in; an empty-body response (`{}`, i.e.
    /// `Content-Length: 2`) is a no-value success.
    pub async fn request(&self, path: &str, body: &Value) -> Result<Value> {
        let mut body = body.clone();
        codec::encode(&mut body);

        let url = format!("{}{}", self.base_url.read(), path);
        let token = self.session.borrow().token.clone();
        let authorization = token.map(|t| format!("Bearer {t}")).unwrap_or_default();

        let mut request = self
            .http
            .post(&url)
            .header("Authorization", authorization)
            .json(&body);
        if let Some(api_key) = self.api_key.read().clone() {
            request = request.header("X-API-Key", api_key);
        }

        debug!("POST {path}");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("{path} returned {status}")));
        }
        if response.content_length() == Some(2) {
            return Ok(Value::Object(Map::new()));
        }

        let mut value: Value = response.json().await?;
        codec::decode(&mut value);
        Ok(value)
    }

    async fn db_request<T: serde::Serialize>(&self, op: &str, req: &T) -> Result<Value> {
        self.request(&format!("/db/{op}"), &serde_json::to_value(req)?)
            .await
    }

    /// Invoke a named server-side function.
    pub async fn call_function(&self, name: &str, payload: &Value) -> Result<Value> {
        self.request(&format!("/functions/{name}"), payload).await
    }
}

/// The active transport. `Db`, `Collection`, `Location` and `Pipeline` go
/// through this enum and stay agnostic to which variant is configured.
pub enum Connector {
    Http(Arc<HttpConnector>),
    Ws {
        http: Arc<HttpConnector>,
        realtime: Multiplexer,
        push_timeout: Duration,
    },
    Local(Arc<dyn OpHandlers>),
}

impl Connector {
    pub async fn get(&self, req: &KeyedRequest) -> Result<Value> {
        match self {
            Connector::Local(handlers) => handlers.get(req),
            Connector::Http(http) | Connector::Ws { http, .. } => {
                Ok(unwrap_value(http.db_request("get", req).await?))
            }
        }
    }

    pub async fn set(&self, req: &SetRequest) -> Result<bool> {
        match self {
            Connector::Local(handlers) => Ok(handlers.set(req)?.as_bool().unwrap_or(true)),
            Connector::Http(http) | Connector::Ws { http, .. } => {
                let result = http.db_request("set", req).await?;
                Ok(result.get("value").and_then(Value::as_bool).unwrap_or(true))
            }
        }
    }

    pub async fn delete(&self, req: &KeyedRequest) -> Result<bool> {
        match self {
            Connector::Local(handlers) => Ok(handlers.delete(req)?.as_bool().unwrap_or(false)),
            Connector::Http(http) | Connector::Ws { http, .. } => {
                let result = http.db_request("delete", req).await?;
                Ok(result.get("value").and_then(Value::as_bool).unwrap_or(false))
            }
        }
    }

    pub async fn has(&self, req: &KeyedRequest) -> Result<bool> {
        match self {
            Connector::Local(handlers) => Ok(handlers.has(req)?.as_bool().unwrap_or(false)),
            Connector::Http(http) | Connector::Ws { http, .. } => {
                let result = http.db_request("has", req).await?;
                Ok(result.get("value").and_then(Value::as_bool).unwrap_or(false))
            }
        }
    }

    pub async fn size(&self, req: &CollectionRequest) -> Result<u64> {
        let result = match self {
            Connector::Local(handlers) => handlers.size(req)?,
            // The wire calls this operation `length`.
            Connector::Http(http) | Connector::Ws { http, .. } => {
                http.db_request("length", req).await?
            }
        };
        let count = match &result {
            Value::Number(n) => n.as_u64(),
            other => other.get("value").and_then(Value::as_u64),
        };
        count.ok_or_else(|| Error::Protocol("length response without a numeric value".to_string()))
    }

    pub async fn keys(&self, req: &CollectionRequest) -> Result<Vec<String>> {
        let result = match self {
            Connector::Local(handlers) => handlers.keys(req)?,
            Connector::Http(http) | Connector::Ws { http, .. } => {
                http.db_request("keys", req).await?
            }
        };
        Ok(serde_json::from_value(result)?)
    }

    pub async fn get_all(&self, req: &CollectionRequest) -> Result<Vec<Value>> {
        let result = match self {
            Connector::Local(handlers) => handlers.get_all(req)?,
            Connector::Http(http) | Connector::Ws { http, .. } => {
                http.db_request("getAll", req).await?
            }
        };
        Ok(serde_json::from_value(result)?)
    }

    pub async fn for_each(&self, req: &CollectionRequest) -> Result<Vec<Value>> {
        let result = match self {
            Connector::Local(handlers) => handlers.for_each(req)?,
            Connector::Http(http) | Connector::Ws { http, .. } => {
                http.db_request("forEach", req).await?
            }
        };
        Ok(serde_json::from_value(result)?)
    }

    pub async fn slice(&self, req: &SliceRequest) -> Result<Vec<Value>> {
        let result = match self {
            Connector::Local(handlers) => handlers.slice(req)?,
            Connector::Http(http) | Connector::Ws { http, .. } => {
                http.db_request("slice", req).await?
            }
        };
        Ok(serde_json::from_value(result)?)
    }

    pub async fn map(&self, req: &MapRequest) -> Result<Vec<Value>> {
        let result = match self {
            Connector::Local(handlers) => handlers.map(req)?,
            Connector::Http(http) | Connector::Ws { http, .. } => {
                http.db_request("map", req).await?
            }
        };
        Ok(serde_json::from_value(result)?)
    }

    pub async fn find(&self, req: &FindRequest) -> Result<Value> {
        match self {
            Connector::Local(handlers) => handlers.find(req),
            Connector::Http(http) | Connector::Ws { http, .. } => {
                Ok(unwrap_value(http.db_request("find", req).await?))
            }
        }
    }

    /// Submit a whole pipeline in one call; the result is whatever the final
    /// operation produces (an array, or a count after `length`).
    pub async fn filter(&self, req: &PipelineRequest) -> Result<Value> {
        match self {
            Connector::Local(handlers) => handlers.filter(req),
            Connector::Http(http) | Connector::Ws { http, .. } => {
                Ok(unwrap_value(http.db_request("filter", req).await?))
            }
        }
    }

    pub async fn clear(&self, req: &CollectionRequest) -> Result<bool> {
        match self {
            Connector::Local(handlers) => Ok(handlers.clear(req)?.as_bool().unwrap_or(true)),
            Connector::Http(http) | Connector::Ws { http, .. } => {
                http.db_request("clear", req).await?;
                Ok(true)
            }
        }
    }

    /// Append a value; resolves to the server-assigned id.
    ///
    /// Over the socket connector this is a one-shot subscription keyed by a
    /// random event name, failing with [`Error::Timeout`] when no reply
    /// arrives inside the window.
    pub async fn push(&self, req: &PushRequest) -> Result<String> {
        match self {
            Connector::Local(handlers) => Ok(value_to_id(handlers.push(req)?)),
            Connector::Http(http) => {
                let result = http.db_request("push", req).await?;
                match result.get("value") {
                    Some(value) => Ok(value_to_id(value.clone())),
                    None => Err(Error::Protocol("push response without a value".to_string())),
                }
            }
            Connector::Ws {
                realtime,
                push_timeout,
                ..
            } => {
                let event_name = Uuid::new_v4().to_string();
                let payload = serde_json::to_value(req)?;
                let mut pending = realtime.subscribe(event_name, payload, "push");
                match tokio::time::timeout(*push_timeout, pending.next()).await {
                    Ok(Some(value)) => Ok(value_to_id(value)),
                    Ok(None) => Err(Error::ChannelClosed),
                    Err(_) => Err(Error::Timeout),
                }
            }
        }
    }
}

/// Unwrap the `{"value": ..}` envelope most responses carry. An envelope
/// without a value (the empty-body success) unwraps to null.
fn unwrap_value(mut result: Value) -> Value {
    if let Value::Object(map) = &mut result {
        return map.remove("value").unwrap_or(Value::Null);
    }
    result
}

fn value_to_id(value: Value) -> String {
    match value {
        Value::String(id) => id,
        other => other.to_string(),
    }
}
