//! AcornDB Rust Client SDK
//!
//! A client for AcornDB, a realtime schemaless document database reachable
//! over HTTP and WebSocket, with an optional in-process backend.
//!
//! # Example
//!
//! ```no_run
//! use acorndb::{App, Config, ConnectorKind, field, SortOrder};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> acorndb::Result<()> {
//!     let app = App::init(
//!         Config::new(ConnectorKind::Ws).with_server_url("https://db.example.com"),
//!     )?;
//!     let users = app.db().collection("users");
//!
//!     // Append a document; resolves to the server-assigned id.
//!     let id = users.push(json!({ "name": "Alice", "age": 30 })).await?;
//!
//!     // Address a nested field and write it.
//!     users.doc(&id).field("profile").field("bio").set(json!("hello")).await?;
//!
//!     // Query pipeline, one round trip.
//!     let adults = users
//!         .filter(field("age").gte(18.0))
//!         .order_by("name", SortOrder::Asc)
//!         .run()
//!         .await?;
//!     println!("{adults}");
//!
//!     // Live updates of a single field.
//!     let mut bio = users.doc(&id).field("profile").field("bio").subscribe()?;
//!     while let Some(value) = bio.next().await {
//!         println!("bio changed: {value}");
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod codec;
mod connector;
mod error;
mod path;
pub mod protocol;
mod query;
mod realtime;
mod session;

pub use client::{App, Config, ConnectorKind, Functions};
pub use codec::{decode, encode, is_iso_date, parse_iso_date, Blob};
pub use connector::{Connector, HttpConnector, OpHandlers};
pub use error::{Error, Result};
pub use path::{Collection, Db, Location, Member, OpKind};
pub use protocol::{Credentials, FilterContent, WsEvent, WsOp, WsRequest};
pub use query::{and, field, not, or, Field, Op, Pipeline, PipelineRequest, Predicate, SortOrder};
pub use realtime::{Multiplexer, SubscriptionHandle};
pub use session::{Auth, CredentialStore, MemoryCredentials, Session};
