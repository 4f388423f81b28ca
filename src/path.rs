//! Location builder and collection surface.
//!
//! A [`Location`] is the canonical address of one field of one document:
//! `(collection, id, path)`. It is built lazily and immutably — every
//! [`Location::field`] call returns a new value over the extended path — and
//! nothing touches the network until one of the explicit terminals: `get`,
//! `set`, `delete`, or `subscribe`.
//!
//! A [`Collection`] carries the fixed operation contract and doubles as the
//! entry point for address construction via [`Collection::doc`]. The
//! [`Collection::lookup`] two-tier resolver makes the precedence explicit:
//! fixed operations win, unknown member names fall through to a path.

use serde_json::Value;
use std::sync::Arc;

use crate::client::Shared;
use crate::error::Result;
use crate::protocol::{
    CollectionRequest, FindRequest, KeyedRequest, MapRequest, PushRequest, SetRequest,
    SliceRequest,
};
use crate::query::{Op, Pipeline, Predicate};
use crate::realtime::SubscriptionHandle;

/// Entry point to the database: a factory of collections.
#[derive(Clone)]
pub struct Db {
    shared: Arc<Shared>,
}

impl Db {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Each distinct name yields a collection handle over the same
    /// connector; handles are cheap and interchangeable.
    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection {
            name: name.into(),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// The fixed operations a collection exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Get,
    Set,
    Has,
    Delete,
    Keys,
    GetAll,
    ForEach,
    Map,
    Filter,
    Slice,
    Find,
    Push,
    Clear,
    Size,
}

/// Result of the two-tier member lookup on a collection: a fixed operation,
/// or an address falling through to path accumulation.
pub enum Member {
    Op(OpKind),
    Path(Location),
}

/// A named collection bound to the active connector.
#[derive(Clone)]
pub struct Collection {
    name: String,
    shared: Arc<Shared>,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address a document. Further fields accumulate through
    /// [`Location::field`].
    pub fn doc(&self, id: impl Into<String>) -> Location {
        Location {
            collection: self.name.clone(),
            id: id.into(),
            path: Vec::new(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Two-tier member resolution: the fixed operation set first, path
    /// construction second. `length` is an alias of `size`.
    pub fn lookup(&self, member: &str) -> Member {
        let op = match member {
            "get" => Some(OpKind::Get),
            "set" => Some(OpKind::Set),
            "has" => Some(OpKind::Has),
            "delete" => Some(OpKind::Delete),
            "keys" => Some(OpKind::Keys),
            "getAll" => Some(OpKind::GetAll),
            "forEach" => Some(OpKind::ForEach),
            "map" => Some(OpKind::Map),
            "filter" => Some(OpKind::Filter),
            "slice" => Some(OpKind::Slice),
            "find" => Some(OpKind::Find),
            "push" => Some(OpKind::Push),
            "clear" => Some(OpKind::Clear),
            "size" | "length" => Some(OpKind::Size),
            _ => None,
        };
        match op {
            Some(kind) => Member::Op(kind),
            None => Member::Path(self.doc(member)),
        }
    }

    fn request(&self) -> CollectionRequest {
        CollectionRequest {
            collection: self.name.clone(),
        }
    }

    fn keyed(&self, id: &str) -> KeyedRequest {
        KeyedRequest {
            collection: self.name.clone(),
            id: Some(id.to_string()),
            path: None,
        }
    }

    /// Number of documents in the collection.
    pub async fn size(&self) -> Result<u64> {
        self.shared.connector.size(&self.request()).await
    }

    pub async fn get(&self, id: &str) -> Result<Value> {
        self.shared.connector.get(&self.keyed(id)).await
    }

    pub async fn set(&self, id: &str, value: Value) -> Result<bool> {
        self.shared
            .connector
            .set(&SetRequest {
                collection: self.name.clone(),
                id: Some(id.to_string()),
                path: None,
                value,
            })
            .await
    }

    pub async fn has(&self, id: &str) -> Result<bool> {
        self.shared.connector.has(&self.keyed(id)).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.shared.connector.delete(&self.keyed(id)).await
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.shared.connector.keys(&self.request()).await
    }

    pub async fn get_all(&self) -> Result<Vec<Value>> {
        self.shared.connector.get_all(&self.request()).await
    }

    /// `(id, document)` pairs for every document that carries an id.
    pub async fn entries(&self) -> Result<Vec<(String, Value)>> {
        let items = self.shared.connector.for_each(&self.request()).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let id = item.get("id").and_then(Value::as_str)?.to_string();
                Some((id, item))
            })
            .collect())
    }

    pub async fn values(&self) -> Result<Vec<Value>> {
        self.shared.connector.for_each(&self.request()).await
    }

    /// Visit every document in the collection.
    pub async fn for_each(&self, mut callback: impl FnMut(&Value)) -> Result<()> {
        let items = self.shared.connector.for_each(&self.request()).await?;
        for item in &items {
            callback(item);
        }
        Ok(())
    }

    /// Server-side projection of the named fields over every document.
    pub async fn map(&self, projection: Vec<String>) -> Result<Vec<Value>> {
        self.shared
            .connector
            .map(&MapRequest {
                collection: self.name.clone(),
                projection,
            })
            .await
    }

    /// Start a query pipeline with a filter step. Further steps chain on the
    /// returned [`Pipeline`].
    pub fn filter(&self, query: Predicate) -> Pipeline {
        Pipeline::new(
            self.name.clone(),
            vec![Op::Filter {
                query: query.to_value(),
            }],
            Arc::clone(&self.shared),
        )
    }

    pub async fn slice(&self, start: usize, end: Option<usize>) -> Result<Vec<Value>> {
        self.shared
            .connector
            .slice(&SliceRequest {
                collection: self.name.clone(),
                start,
                end,
            })
            .await
    }

    /// First document matching the predicate.
    pub async fn find(&self, query: Predicate) -> Result<Value> {
        self.shared
            .connector
            .find(&FindRequest {
                collection: self.name.clone(),
                query: query.to_value(),
            })
            .await
    }

    /// Append a document; resolves to the server-assigned id.
    pub async fn push(&self, value: Value) -> Result<String> {
        self.shared
            .connector
            .push(&PushRequest {
                collection: self.name.clone(),
                value,
            })
            .await
    }

    pub async fn clear(&self) -> Result<bool> {
        self.shared.connector.clear(&self.request()).await
    }
}

/// Lazily-built address of one field: `(collection, id, path)`.
///
/// Cloning is cheap relative to the operations it addresses; `field` never
/// mutates the receiver, so intermediate locations can be kept and extended
/// in several directions.
#[derive(Clone)]
pub struct Location {
    collection: String,
    id: String,
    path: Vec<String>,
    shared: Arc<Shared>,
}

impl Location {
    /// Extend the path by one segment, returning a new location.
    pub fn field(&self, name: impl Into<String>) -> Location {
        let mut path = self.path.clone();
        path.push(name.into());
        Location {
            collection: self.collection.clone(),
            id: self.id.clone(),
            path,
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Subscription key for this location: every segment joined with `.`.
    pub fn key(&self) -> String {
        let mut segments = Vec::with_capacity(self.path.len() + 2);
        segments.push(self.collection.clone());
        segments.push(self.id.clone());
        segments.extend(self.path.iter().cloned());
        segments.join(".")
    }

    fn request(&self) -> KeyedRequest {
        KeyedRequest {
            collection: self.collection.clone(),
            id: Some(self.id.clone()),
            path: Some(self.path.clone()),
        }
    }

    /// Resolve the addressed value: exactly one `get` through the active
    /// connector.
    pub async fn get(&self) -> Result<Value> {
        self.shared.connector.get(&self.request()).await
    }

    /// Write the addressed field.
    pub async fn set(&self, value: Value) -> Result<bool> {
        self.shared
            .connector
            .set(&SetRequest {
                collection: self.collection.clone(),
                id: Some(self.id.clone()),
                path: Some(self.path.clone()),
                value,
            })
            .await
    }

    /// Remove the addressed field.
    pub async fn delete(&self) -> Result<bool> {
        self.shared.connector.delete(&self.request()).await
    }

    /// Live updates of the addressed value.
    pub fn subscribe(&self) -> Result<SubscriptionHandle> {
        let payload = serde_json::to_value(self.request())?;
        Ok(self.shared.realtime.subscribe(self.key(), payload, "get"))
    }
}
