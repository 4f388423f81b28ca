//! Realtime subscription multiplexer.
//!
//! Owns the single persistent WebSocket and every piece of process-wide
//! realtime state: the keyed listener registry with its last-value cache,
//! and the outbound queue that buffers subscribe frames while the socket is
//! down. Subscribing twice to one key sends one wire message; both local
//! subscribers share the stream and late joiners replay the cached value.

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::codec;
use crate::protocol::{FilterContent, WsEvent, WsOp, WsRequest, FLUSH_SETTLE_MS};
use crate::session::Session;

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(100);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

#[derive(Default)]
struct Entry {
    last_value: Option<Value>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<Value>>,
}

impl Entry {
    fn notify(&self, value: &Value) {
        for sender in self.subscribers.values() {
            let _ = sender.send(value.clone());
        }
    }
}

struct Inner {
    listeners: Mutex<HashMap<String, Entry>>,
    /// Wire frames awaiting an open socket, flushed FIFO exactly once per
    /// open transition.
    queue: Mutex<Vec<String>>,
    /// Sender into the live socket task; `None` while disconnected.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    session: watch::Receiver<Session>,
    next_id: AtomicU64,
    generation: AtomicU64,
}

/// Handle to one live subscription. Values arrive through [`next`];
/// dropping the handle (or calling [`unsubscribe`]) detaches it.
///
/// [`next`]: SubscriptionHandle::next
/// [`unsubscribe`]: SubscriptionHandle::unsubscribe
pub struct SubscriptionHandle {
    key: String,
    id: u64,
    receiver: mpsc::UnboundedReceiver<Value>,
    inner: Arc<Inner>,
    detached: bool,
}

impl SubscriptionHandle {
    /// Wait for the next value on this subscription.
    pub async fn next(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    /// Value already delivered and waiting, if any. Never blocks.
    pub fn try_next(&mut self) -> Option<Value> {
        self.receiver.try_recv().ok()
    }

    /// Subscription key this handle is registered under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Detach this subscriber. Idempotent; the entry is torn down when the
    /// last subscriber leaves.
    pub fn unsubscribe(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        let mut listeners = self.inner.listeners.lock();
        if let Some(entry) = listeners.get_mut(&self.key) {
            entry.subscribers.remove(&self.id);
            if entry.subscribers.is_empty() {
                // No server-side unsubscribe exists in the protocol; the
                // entry is only torn down locally.
                listeners.remove(&self.key);
            }
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Keyed registry of live subscriptions over one persistent socket.
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Inner>,
}

impl Multiplexer {
    pub fn new(session: watch::Receiver<Session>) -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: Mutex::new(HashMap::new()),
                queue: Mutex::new(Vec::new()),
                outbound: Mutex::new(None),
                session,
                next_id: AtomicU64::new(1),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Connect the persistent socket, replacing any previous connection.
    /// Runs until a later `start` supersedes it, reconnecting with backoff.
    pub fn start(&self, url: String) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.inner.outbound.lock() = None;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_socket(inner, url, generation).await;
        });
    }

    /// Register a subscriber under `key`.
    ///
    /// The cached last value, if any, is replayed immediately. The first
    /// subscriber for a key causes exactly one wire subscribe frame carrying
    /// the current session token; it is sent now if the socket is open and
    /// queued otherwise.
    pub fn subscribe(
        &self,
        key: impl Into<String>,
        payload: Value,
        operation: &str,
    ) -> SubscriptionHandle {
        let key = key.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        let first = {
            let mut listeners = self.inner.listeners.lock();
            let entry = listeners.entry(key.clone()).or_default();
            if let Some(value) = &entry.last_value {
                let _ = tx.send(value.clone());
            }
            entry.subscribers.insert(id, tx);
            entry.subscribers.len() == 1
        };

        if first {
            self.inner.send_or_enqueue(&key, payload, operation);
        }

        SubscriptionHandle {
            key,
            id,
            receiver: rx,
            inner: Arc::clone(&self.inner),
            detached: false,
        }
    }

    /// Number of live subscription entries. Mostly useful in tests.
    pub fn entry_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn queued_frames(&self) -> Vec<String> {
        self.inner.queue.lock().clone()
    }

    #[cfg(test)]
    pub(crate) fn inject_frame(&self, text: &str) {
        self.inner.handle_frame(text);
    }
}

impl Inner {
    fn send_or_enqueue(&self, key: &str, payload: Value, operation: &str) {
        let token = self.session.borrow().token.clone();
        let frame = WsRequest {
            operation: operation.to_string(),
            event_name: key.to_string(),
            payload,
            authorization: token.map(|t| format!("Bearer {t}")).unwrap_or_default(),
        };
        let frame = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                warn!("dropping unserializable subscribe frame for {key}: {e}");
                return;
            }
        };

        let outbound = self.outbound.lock();
        match outbound.as_ref() {
            Some(tx) if tx.send(frame.clone()).is_ok() => {}
            _ => {
                drop(outbound);
                self.queue.lock().push(frame);
            }
        }
    }

    /// Dispatch one inbound frame. Malformed input is logged and skipped;
    /// the read loop stays alive.
    fn handle_frame(&self, text: &str) {
        let mut event: WsEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("ignoring malformed socket message: {e}");
                return;
            }
        };
        codec::decode(&mut event.value);

        match event.operation {
            WsOp::Get => match event.full_path {
                Some(path) => self.update_value(&path, event.value),
                None => warn!("get event without fullPath"),
            },
            WsOp::Filter => match event.event_name {
                Some(key) => self.apply_filter(
                    &key,
                    event.content.unwrap_or(FilterContent::Unknown),
                    event.value,
                ),
                None => warn!("filter event without eventName"),
            },
            WsOp::Push => match event.event_name {
                // One-shot: delivered, never cached.
                Some(key) => self.emit(&key, event.value),
                None => warn!("push event without eventName"),
            },
        }
    }

    /// Cache and broadcast a fresh value for a `get` subscription.
    fn update_value(&self, key: &str, value: Value) {
        let mut listeners = self.listeners.lock();
        match listeners.get_mut(key) {
            Some(entry) => {
                entry.notify(&value);
                entry.last_value = Some(value);
            }
            None => debug!("value update for inactive key {key}"),
        }
    }

    /// Apply one incremental update to the array kept for a `filter`
    /// subscription, then broadcast the new array.
    fn apply_filter(&self, key: &str, content: FilterContent, value: Value) {
        let mut listeners = self.listeners.lock();
        let Some(entry) = listeners.get_mut(key) else {
            debug!("filter update for inactive key {key}");
            return;
        };

        let mut items = match entry.last_value.take() {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };

        match content {
            FilterContent::Reset => {
                items = match value {
                    Value::Array(replacement) => replacement,
                    other => vec![other],
                };
            }
            FilterContent::Add => items.push(value),
            FilterContent::Edit => {
                if let Some(id) = value.get("id").cloned() {
                    if let Some(slot) = items.iter_mut().find(|item| item.get("id") == Some(&id)) {
                        *slot = value;
                    }
                }
            }
            FilterContent::Delete => {
                if let Some(id) = value.get("id").cloned() {
                    items.retain(|item| item.get("id") != Some(&id));
                }
            }
            FilterContent::Drop => items.clear(),
            FilterContent::Unknown => {
                // Leave the cached array as it was, without notifying.
                entry.last_value = Some(Value::Array(items));
                return;
            }
        }

        let next = Value::Array(items);
        entry.notify(&next);
        entry.last_value = Some(next);
    }

    /// Broadcast without caching.
    fn emit(&self, key: &str, value: Value) {
        let listeners = self.listeners.lock();
        if let Some(entry) = listeners.get(key) {
            entry.notify(&value);
        }
    }
}

/// Socket lifecycle: connect, flush the queue once, pump frames, reconnect
/// with exponential backoff. Exits when a newer generation takes over.
async fn run_socket(inner: Arc<Inner>, url: String, generation: u64) {
    let mut reconnect_delay = INITIAL_RECONNECT_DELAY;

    while inner.generation.load(Ordering::SeqCst) == generation {
        info!("connecting realtime socket to {url}");
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                reconnect_delay = INITIAL_RECONNECT_DELAY;
                let (mut sink, mut stream) = ws.split();
                let (tx, mut rx) = mpsc::unbounded_channel::<String>();
                *inner.outbound.lock() = Some(tx);
                info!("realtime socket open");

                // Let the server finish its side of the handshake before
                // replaying the backlog.
                tokio::time::sleep(Duration::from_millis(FLUSH_SETTLE_MS)).await;
                let backlog: Vec<String> = inner.queue.lock().drain(..).collect();
                let mut send_failed = false;
                for frame in backlog {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        send_failed = true;
                        break;
                    }
                }

                while !send_failed {
                    tokio::select! {
                        frame = rx.recv() => match frame {
                            Some(frame) => {
                                if sink.send(Message::Text(frame)).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                        message = stream.next() => match message {
                            Some(Ok(Message::Text(text))) => inner.handle_frame(&text),
                            Some(Ok(Message::Ping(data))) => {
                                let _ = sink.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("realtime socket error: {e}");
                                break;
                            }
                        },
                    }
                }

                *inner.outbound.lock() = None;
                info!("realtime socket disconnected");
            }
            Err(e) => {
                warn!("realtime socket connect failed: {e}");
            }
        }

        if inner.generation.load(Ordering::SeqCst) != generation {
            break;
        }
        debug!("reconnecting realtime socket in {reconnect_delay:?}");
        tokio::time::sleep(reconnect_delay).await;
        reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
    }
}
