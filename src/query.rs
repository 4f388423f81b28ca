//! Query pipeline builder for AcornDB.
//!
//! Provides a fluent API for building server-evaluated pipelines:
//! filter/map/slice/orderBy/length. Predicates are a small serializable
//! algebra of field comparisons and boolean combinators; the server never
//! receives executable code.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::client::Shared;
use crate::error::Result;
use crate::realtime::SubscriptionHandle;

/// Sort direction for `orderBy` operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "ASC"),
            SortOrder::Desc => write!(f, "DESC"),
        }
    }
}

/// Filter condition evaluated by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, f64),
    Gte(String, f64),
    Lt(String, f64),
    Lte(String, f64),
    In(String, Vec<Value>),
    NotIn(String, Vec<Value>),
    Contains(String, String),
    StartsWith(String, String),
    EndsWith(String, String),
    Exists(String, bool),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Serialize to the wire form: `{"field": {"$op": value}}`.
    pub fn to_value(&self) -> Value {
        let mut result = Map::new();
        match self {
            Predicate::Eq(field, value) => {
                result.insert(field.clone(), json!({"$eq": value}));
            }
            Predicate::Ne(field, value) => {
                result.insert(field.clone(), json!({"$ne": value}));
            }
            Predicate::Gt(field, value) => {
                result.insert(field.clone(), json!({"$gt": value}));
            }
            Predicate::Gte(field, value) => {
                result.insert(field.clone(), json!({"$gte": value}));
            }
            Predicate::Lt(field, value) => {
                result.insert(field.clone(), json!({"$lt": value}));
            }
            Predicate::Lte(field, value) => {
                result.insert(field.clone(), json!({"$lte": value}));
            }
            Predicate::In(field, values) => {
                result.insert(field.clone(), json!({"$in": values}));
            }
            Predicate::NotIn(field, values) => {
                result.insert(field.clone(), json!({"$nin": values}));
            }
            Predicate::Contains(field, value) => {
                result.insert(field.clone(), json!({"$contains": value}));
            }
            Predicate::StartsWith(field, value) => {
                result.insert(field.clone(), json!({"$startsWith": value}));
            }
            Predicate::EndsWith(field, value) => {
                result.insert(field.clone(), json!({"$endsWith": value}));
            }
            Predicate::Exists(field, value) => {
                result.insert(field.clone(), json!({"$exists": value}));
            }
            Predicate::And(conditions) => {
                let parts: Vec<Value> = conditions.iter().map(|c| c.to_value()).collect();
                result.insert("$and".to_string(), json!(parts));
            }
            Predicate::Or(conditions) => {
                let parts: Vec<Value> = conditions.iter().map(|c| c.to_value()).collect();
                result.insert("$or".to_string(), json!(parts));
            }
            Predicate::Not(condition) => {
                result.insert("$not".to_string(), condition.to_value());
            }
        }
        Value::Object(result)
    }
}

/// Field expression builder for fluent predicate construction.
pub struct Field {
    name: String,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn eq(self, value: impl Into<Value>) -> Predicate {
        Predicate::Eq(self.name, value.into())
    }

    pub fn ne(self, value: impl Into<Value>) -> Predicate {
        Predicate::Ne(self.name, value.into())
    }

    pub fn gt(self, value: f64) -> Predicate {
        Predicate::Gt(self.name, value)
    }

    pub fn gte(self, value: f64) -> Predicate {
        Predicate::Gte(self.name, value)
    }

    pub fn lt(self, value: f64) -> Predicate {
        Predicate::Lt(self.name, value)
    }

    pub fn lte(self, value: f64) -> Predicate {
        Predicate::Lte(self.name, value)
    }

    pub fn is_in(self, values: Vec<Value>) -> Predicate {
        Predicate::In(self.name, values)
    }

    pub fn not_in(self, values: Vec<Value>) -> Predicate {
        Predicate::NotIn(self.name, values)
    }

    pub fn contains(self, value: impl Into<String>) -> Predicate {
        Predicate::Contains(self.name, value.into())
    }

    pub fn starts_with(self, value: impl Into<String>) -> Predicate {
        Predicate::StartsWith(self.name, value.into())
    }

    pub fn ends_with(self, value: impl Into<String>) -> Predicate {
        Predicate::EndsWith(self.name, value.into())
    }

    pub fn exists(self, value: bool) -> Predicate {
        Predicate::Exists(self.name, value)
    }
}

/// Create a field expression.
pub fn field(name: impl Into<String>) -> Field {
    Field::new(name)
}

/// Combine predicates with AND.
pub fn and(predicates: Vec<Predicate>) -> Predicate {
    Predicate::And(predicates)
}

/// Combine predicates with OR.
pub fn or(predicates: Vec<Predicate>) -> Predicate {
    Predicate::Or(predicates)
}

/// Negate a predicate.
pub fn not(predicate: Predicate) -> Predicate {
    Predicate::Not(Box::new(predicate))
}

/// One step of a server-side pipeline, executed in array order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Op {
    Filter {
        query: Value,
    },
    Map {
        projection: Vec<String>,
    },
    Slice {
        start: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        end: Option<usize>,
    },
    OrderBy {
        property: String,
        order: SortOrder,
    },
    Length,
}

/// The whole ordered pipeline, submitted as one `filter` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub collection: String,
    pub operations: Vec<Op>,
}

/// Chainable query pipeline scoped to one collection.
///
/// Each chain call appends one operation; nothing touches the network until
/// [`Pipeline::run`] or [`Pipeline::subscribe`].
///
/// # Example
/// ```no_run
/// # async fn example(users: acorndb::Collection) -> acorndb::Result<()> {
/// use acorndb::{field, SortOrder};
///
/// let adults = users
///     .filter(field("age").gte(18.0))
///     .order_by("name", SortOrder::Asc)
///     .slice(0, Some(10))
///     .run()
///     .await?;
/// # let _ = adults; Ok(())
/// # }
/// ```
pub struct Pipeline {
    collection: String,
    operations: Vec<Op>,
    shared: Arc<Shared>,
}

impl Pipeline {
    pub(crate) fn new(collection: String, operations: Vec<Op>, shared: Arc<Shared>) -> Self {
        Self {
            collection,
            operations,
            shared,
        }
    }

    /// Append a filter step.
    pub fn filter(mut self, query: Predicate) -> Self {
        self.operations.push(Op::Filter {
            query: query.to_value(),
        });
        self
    }

    /// Append a projection step.
    pub fn map(mut self, projection: Vec<String>) -> Self {
        self.operations.push(Op::Map { projection });
        self
    }

    /// Append a slice step.
    pub fn slice(mut self, start: usize, end: Option<usize>) -> Self {
        self.operations.push(Op::Slice { start, end });
        self
    }

    /// Append a sort step.
    pub fn order_by(mut self, property: impl Into<String>, order: SortOrder) -> Self {
        self.operations.push(Op::OrderBy {
            property: property.into(),
            order,
        });
        self
    }

    /// Append a length step, reducing the result to a count.
    pub fn length(mut self) -> Self {
        self.operations.push(Op::Length);
        self
    }

    /// The accumulated operations, in execution order.
    pub fn operations(&self) -> &[Op] {
        &self.operations
    }

    /// Identity of this pipeline for subscription purposes: the collection
    /// name followed by the serialized operation list. Stable across
    /// reconstruction of an equal pipeline, different under reordering.
    pub fn subscription_key(&self) -> String {
        let ops = serde_json::to_string(&self.operations).unwrap_or_else(|_| "[]".to_string());
        format!("{}{}", self.collection, ops)
    }

    fn request(&self) -> PipelineRequest {
        PipelineRequest {
            collection: self.collection.clone(),
            operations: self.operations.clone(),
        }
    }

    /// Submit the whole pipeline in one round trip. Not retried.
    pub async fn run(&self) -> Result<Value> {
        self.shared.connector.filter(&self.request()).await
    }

    /// Subscribe to live results of this pipeline. The server re-evaluates
    /// the operation list and streams incremental updates.
    pub fn subscribe(&self) -> Result<SubscriptionHandle> {
        let payload = serde_json::to_value(self.request())?;
        Ok(self
            .shared
            .realtime
            .subscribe(self.subscription_key(), payload, "filter"))
    }
}
