//! Basic example demonstrating AcornDB Rust SDK usage.

use acorndb::{field, App, Config, ConnectorKind, SortOrder};
use serde_json::json;

#[tokio::main]
async fn main() -> acorndb::Result<()> {
  tracing_subscriber::fmt::init();

  // Connect to an AcornDB server over the socket connector.
  let app = App::init(
    Config::new(ConnectorKind::Ws).with_server_url("http://localhost:3000"),
  )?;
  let db = app.db();
  let users = db.collection("users");

  // Append a document; the server assigns the id.
  let id = users
    .push(json!({
        "name": "Alice",
        "email": "alice@example.com",
        "age": 30
    }))
    .await?;
  println!("Inserted document: {id}");

  // Address a nested field and write it.
  users
    .doc(&id)
    .field("profile")
    .field("bio")
    .set(json!("Hello from Rust"))
    .await?;

  // Read it back.
  let bio = users.doc(&id).field("profile").field("bio").get().await?;
  println!("Bio: {bio}");

  // Query pipeline: one round trip, evaluated server-side.
  let adults = users
    .filter(field("age").gte(18.0))
    .order_by("name", SortOrder::Asc)
    .slice(0, Some(10))
    .run()
    .await?;
  println!("Adults: {adults}");

  // Live updates on the same pipeline.
  println!("\nSubscribing to adult users...");
  println!("(Insert/update/delete users from another client to see changes)");
  println!("Press Ctrl+C to exit.\n");

  let mut live = users
    .filter(field("age").gte(18.0))
    .order_by("name", SortOrder::Asc)
    .subscribe()?;

  while let Some(result) = live.next().await {
    println!("Query result now: {result}");
  }

  Ok(())
}
