//! Query builder tests for the AcornDB Rust SDK.

use acorndb::{and, field, not, or, Predicate, SortOrder};
use serde_json::json;

#[test]
fn test_field_eq() {
    let value = field("age").eq(25).to_value();
    assert_eq!(value, json!({"age": {"$eq": 25}}));
}

#[test]
fn test_field_ne() {
    let value = field("status").ne("inactive").to_value();
    assert_eq!(value, json!({"status": {"$ne": "inactive"}}));
}

#[test]
fn test_field_comparisons() {
    assert_eq!(field("price").gt(100.0).to_value(), json!({"price": {"$gt": 100.0}}));
    assert_eq!(field("count").gte(10.0).to_value(), json!({"count": {"$gte": 10.0}}));
    assert_eq!(field("age").lt(18.0).to_value(), json!({"age": {"$lt": 18.0}}));
    assert_eq!(field("rating").lte(5.0).to_value(), json!({"rating": {"$lte": 5.0}}));
}

#[test]
fn test_field_is_in() {
    let value = field("role").is_in(vec![json!("admin"), json!("mod")]).to_value();
    assert_eq!(value, json!({"role": {"$in": ["admin", "mod"]}}));
}

#[test]
fn test_field_not_in() {
    let value = field("status")
        .not_in(vec![json!("banned"), json!("deleted")])
        .to_value();
    assert_eq!(value, json!({"status": {"$nin": ["banned", "deleted"]}}));
}

#[test]
fn test_field_string_operators() {
    assert_eq!(
        field("name").contains("test").to_value(),
        json!({"name": {"$contains": "test"}})
    );
    assert_eq!(
        field("email").starts_with("admin").to_value(),
        json!({"email": {"$startsWith": "admin"}})
    );
    assert_eq!(
        field("email").ends_with(".com").to_value(),
        json!({"email": {"$endsWith": ".com"}})
    );
}

#[test]
fn test_field_exists() {
    assert_eq!(field("avatar").exists(true).to_value(), json!({"avatar": {"$exists": true}}));
    assert_eq!(
        field("deleted_at").exists(false).to_value(),
        json!({"deleted_at": {"$exists": false}})
    );
}

#[test]
fn test_and_combines_conditions() {
    let value = and(vec![field("age").gte(18.0), field("active").eq(true)]).to_value();
    assert_eq!(
        value,
        json!({"$and": [{"age": {"$gte": 18.0}}, {"active": {"$eq": true}}]})
    );
}

#[test]
fn test_or_combines_conditions() {
    let value = or(vec![field("role").eq("admin"), field("role").eq("moderator")]).to_value();
    assert_eq!(
        value,
        json!({"$or": [{"role": {"$eq": "admin"}}, {"role": {"$eq": "moderator"}}]})
    );
}

#[test]
fn test_not_negates_condition() {
    let value = not(field("banned").eq(true)).to_value();
    assert_eq!(value, json!({"$not": {"banned": {"$eq": true}}}));
}

#[test]
fn test_predicates_compare_structurally() {
    assert_eq!(field("a").eq(1), Predicate::Eq("a".to_string(), json!(1)));
    assert_ne!(field("a").eq(1), field("a").eq(2));
}

#[test]
fn test_sort_order_wire_form() {
    assert_eq!(serde_json::to_value(SortOrder::Asc).unwrap(), json!("ASC"));
    assert_eq!(serde_json::to_value(SortOrder::Desc).unwrap(), json!("DESC"));
    assert_eq!(SortOrder::Asc.to_string(), "ASC");
}

mod pipeline {
    use super::*;
    use acorndb::protocol::*;
    use acorndb::{App, Config, OpHandlers, PipelineRequest, Result};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    /// Records every pipeline it is asked to run.
    #[derive(Default)]
    struct RecordingHandlers {
        pipelines: Mutex<Vec<PipelineRequest>>,
    }

    impl OpHandlers for RecordingHandlers {
        fn size(&self, _req: &CollectionRequest) -> Result<Value> {
            Ok(json!(0))
        }
        fn map(&self, _req: &MapRequest) -> Result<Value> {
            Ok(json!([]))
        }
        fn filter(&self, req: &PipelineRequest) -> Result<Value> {
            self.pipelines.lock().unwrap().push(req.clone());
            Ok(json!([{"id": "match"}]))
        }
        fn slice(&self, _req: &SliceRequest) -> Result<Value> {
            Ok(json!([]))
        }
        fn find(&self, _req: &FindRequest) -> Result<Value> {
            Ok(Value::Null)
        }
        fn push(&self, _req: &PushRequest) -> Result<Value> {
            Ok(json!("id"))
        }
        fn delete(&self, _req: &KeyedRequest) -> Result<Value> {
            Ok(json!(true))
        }
        fn set(&self, _req: &SetRequest) -> Result<Value> {
            Ok(json!(true))
        }
        fn clear(&self, _req: &CollectionRequest) -> Result<Value> {
            Ok(json!(true))
        }
        fn get(&self, _req: &KeyedRequest) -> Result<Value> {
            Ok(Value::Null)
        }
        fn has(&self, _req: &KeyedRequest) -> Result<Value> {
            Ok(json!(false))
        }
        fn keys(&self, _req: &CollectionRequest) -> Result<Value> {
            Ok(json!([]))
        }
        fn get_all(&self, _req: &CollectionRequest) -> Result<Value> {
            Ok(json!([]))
        }
    }

    fn app_with(handlers: Arc<RecordingHandlers>) -> App {
        App::init(Config::local(handlers)).unwrap()
    }

    #[test]
    fn subscription_key_is_stable_under_reconstruction() {
        let app = app_with(Arc::new(RecordingHandlers::default()));
        let users = app.db().collection("users");

        let build = || {
            users
                .filter(field("age").gt(21.0))
                .order_by("name", SortOrder::Asc)
        };

        assert_eq!(build().subscription_key(), build().subscription_key());
    }

    #[test]
    fn subscription_key_differs_under_reordering() {
        let app = app_with(Arc::new(RecordingHandlers::default()));
        let users = app.db().collection("users");

        let sort_then_slice = users
            .filter(field("age").gt(21.0))
            .order_by("name", SortOrder::Asc)
            .slice(0, Some(10))
            .subscription_key();
        let slice_then_sort = users
            .filter(field("age").gt(21.0))
            .slice(0, Some(10))
            .order_by("name", SortOrder::Asc)
            .subscription_key();

        assert_ne!(sort_then_slice, slice_then_sort);
    }

    #[test]
    fn subscription_key_starts_with_the_collection() {
        let app = app_with(Arc::new(RecordingHandlers::default()));
        let key = app
            .db()
            .collection("users")
            .filter(field("active").eq(true))
            .subscription_key();
        assert!(key.starts_with("users["));
    }

    #[tokio::test]
    async fn run_submits_the_whole_pipeline_once() {
        let handlers = Arc::new(RecordingHandlers::default());
        let app = app_with(Arc::clone(&handlers));

        let result = app
            .db()
            .collection("users")
            .filter(field("age").gte(18.0))
            .order_by("name", SortOrder::Desc)
            .slice(0, Some(5))
            .length()
            .run()
            .await
            .unwrap();
        assert_eq!(result, json!([{"id": "match"}]));

        let recorded = handlers.pipelines.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        let pipeline = &recorded[0];
        assert_eq!(pipeline.collection, "users");

        let types: Vec<String> = pipeline
            .operations
            .iter()
            .map(|op| serde_json::to_value(op).unwrap()["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(types, ["filter", "orderBy", "slice", "length"]);
    }
}
