#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use concierge_store::{
    CatalogItem, CommerceStore, MemoryStore, OptionChoice, OwnerLocks, SqliteStore,
};
use concierge_tools::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn catalog() -> Vec<CatalogItem> {
    vec![
        CatalogItem {
            id: "margherita".into(),
            name: "Margherita Pizza".into(),
            description: Some("Tomato, mozzarella, basil".into()),
            price_cents: 1200,
            tags: vec!["italian".into(), "vegetarian".into()],
            options: vec![OptionChoice {
                id: "large".into(),
                label: "Large".into(),
                price_adjustment_cents: 300,
            }],
        },
        CatalogItem {
            id: "tiramisu".into(),
            name: "Tiramisu".into(),
            description: None,
            price_cents: 650,
            tags: vec!["dessert".into()],
            options: Vec::new(),
        },
    ]
}

async fn setup(store: Arc<dyn CommerceStore>) -> ToolDispatcher {
    store.seed_catalog(catalog()).await.unwrap();
    let registry = commerce_registry(CommerceDeps {
        store,
        locks: OwnerLocks::new(Duration::from_secs(5)),
    })
    .unwrap();
    ToolDispatcher::new(Arc::new(registry), Arc::new(TracingAuditLogger))
}

async fn call(
    dispatcher: &ToolDispatcher,
    owner: &str,
    tool: &str,
    input: Value,
) -> Result<Value, ToolError> {
    dispatcher
        .dispatch(ExecutionContext::new(owner, format!("{}-call", tool), 5_000), tool, input)
        .await
}

#[tokio::test]
async fn test_default_gating() {
    let dispatcher = setup(Arc::new(MemoryStore::new())).await;
    let registry = dispatcher.registry();

    assert_eq!(registry.count(), 10);
    for gated in ["clear_cart", "submit_cart_order", "purchase", "update_preferences"] {
        assert!(registry.requires_approval(gated).unwrap(), "{} should be gated", gated);
    }
    for open in [
        "search_catalog",
        "get_user_context",
        "add_item_to_cart",
        "view_cart",
        "remove_cart_item",
        "log_feedback",
    ] {
        assert!(!registry.requires_approval(open).unwrap(), "{} should not be gated", open);
    }
}

#[tokio::test]
async fn test_cart_flow() {
    let dispatcher = setup(Arc::new(MemoryStore::new())).await;

    let found = call(&dispatcher, "alice", "search_catalog", json!({"query": "pizza"}))
        .await
        .unwrap();
    assert_eq!(found["count"], 1);
    assert_eq!(found["items"][0]["price"], "$12.00");

    let added = call(
        &dispatcher,
        "alice",
        "add_item_to_cart",
        json!({"itemId": "margherita", "quantity": 2, "optionIds": ["large"]}),
    )
    .await
    .unwrap();
    assert_eq!(added["cart"]["subtotal"], "$30.00");
    assert_eq!(added["cart"]["total"], "$32.99");

    call(&dispatcher, "alice", "add_item_to_cart", json!({"itemId": "tiramisu"}))
        .await
        .unwrap();
    let cart = call(&dispatcher, "alice", "view_cart", json!({})).await.unwrap();
    assert_eq!(cart["itemCount"], 3);
    assert_eq!(cart["subtotal"], "$36.50");

    let line_id = cart["lineItems"][1]["lineItemId"].as_str().unwrap().to_string();
    let after = call(&dispatcher, "alice", "remove_cart_item", json!({"lineItemId": line_id}))
        .await
        .unwrap();
    assert_eq!(after["cart"]["subtotal"], "$30.00");

    let other = call(&dispatcher, "bob", "view_cart", json!({})).await.unwrap();
    assert_eq!(other["itemCount"], 0);
    assert_eq!(other["cartId"], Value::Null);
}

#[tokio::test]
async fn test_invalid_input_rejected_by_contract() {
    let dispatcher = setup(Arc::new(MemoryStore::new())).await;

    let err = call(&dispatcher, "alice", "add_item_to_cart", json!({"quantity": 1}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Validation(_)));

    let err = call(
        &dispatcher,
        "alice",
        "add_item_to_cart",
        json!({"itemId": "margherita", "quantity": 0}),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ToolError::Validation(_)));

    let err = call(&dispatcher, "alice", "log_feedback", json!({"sentiment": "ecstatic"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Validation(_)));
}

#[tokio::test]
async fn test_unknown_catalog_item_is_execution_error() {
    let dispatcher = setup(Arc::new(MemoryStore::new())).await;
    let err = call(&dispatcher, "alice", "add_item_to_cart", json!({"itemId": "calzone"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Execution(msg) if msg.contains("calzone")));
}

#[tokio::test]
async fn test_submit_and_context() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(temp.path().join("tools.db")).unwrap());
    let dispatcher = setup(store).await;

    let err = call(&dispatcher, "alice", "submit_cart_order", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Execution(_)));

    call(&dispatcher, "alice", "add_item_to_cart", json!({"itemId": "tiramisu", "quantity": 2}))
        .await
        .unwrap();
    let confirmed = call(&dispatcher, "alice", "submit_cart_order", json!({}))
        .await
        .unwrap();
    let number = confirmed["order"]["orderNumber"].as_str().unwrap().to_string();
    assert!(number.starts_with("FC-"));
    assert_eq!(confirmed["order"]["total"], "$15.99");

    let context = call(&dispatcher, "alice", "get_user_context", json!({}))
        .await
        .unwrap();
    assert_eq!(context["recentOrders"][0]["orderNumber"], number.as_str());
    assert_eq!(context["activeCartItems"], 0);
    assert_eq!(context["hasPreferences"], false);
}

#[tokio::test]
async fn test_purchase_orders_single_item() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(temp.path().join("tools.db")).unwrap());
    let dispatcher = setup(store).await;

    call(&dispatcher, "alice", "add_item_to_cart", json!({"itemId": "tiramisu", "quantity": 3}))
        .await
        .unwrap();
    let confirmed = call(
        &dispatcher,
        "alice",
        "purchase",
        json!({"itemId": "margherita", "optionIds": ["large"]}),
    )
    .await
    .unwrap();

    let items = confirmed["order"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["itemId"], "margherita");
    assert_eq!(items[0]["options"], json!(["Large"]));
    assert_eq!(confirmed["order"]["subtotal"], "$15.00");
    assert_eq!(confirmed["order"]["total"], "$17.99");

    // The earlier cart is untouched and can still be checked out on its own.
    let cart = call(&dispatcher, "alice", "view_cart", json!({})).await.unwrap();
    assert_eq!(cart["itemCount"], 3);
    assert_eq!(cart["lineItems"][0]["itemId"], "tiramisu");
    assert_eq!(cart["subtotal"], "$19.50");
}

#[tokio::test]
async fn test_failed_purchase_leaves_no_trace() {
    let dispatcher = setup(Arc::new(MemoryStore::new())).await;
    call(&dispatcher, "alice", "add_item_to_cart", json!({"itemId": "tiramisu"}))
        .await
        .unwrap();

    let err = call(&dispatcher, "alice", "purchase", json!({"itemId": "calzone"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Execution(_)));

    let cart = call(&dispatcher, "alice", "view_cart", json!({})).await.unwrap();
    assert_eq!(cart["itemCount"], 1);
    let context = call(&dispatcher, "alice", "get_user_context", json!({}))
        .await
        .unwrap();
    assert_eq!(context["recentOrders"], json!([]));
}

#[tokio::test]
async fn test_every_tool_declares_output_contract() {
    let dispatcher = setup(Arc::new(MemoryStore::new())).await;
    let registry = dispatcher.registry();
    for name in registry.list() {
        let definition = registry.resolve(&name).unwrap();
        let schema = definition.output_schema();
        assert!(
            schema.get("properties").is_some(),
            "{} has no output properties",
            name
        );
    }
    let purchase = registry.resolve("purchase").unwrap();
    assert!(purchase.validate_output(&json!({"message": "ok"})).is_err());
}

#[tokio::test]
async fn test_clear_cart() {
    let dispatcher = setup(Arc::new(MemoryStore::new())).await;
    let empty = call(&dispatcher, "alice", "clear_cart", json!({})).await.unwrap();
    assert_eq!(empty["cleared"], false);

    call(&dispatcher, "alice", "add_item_to_cart", json!({"itemId": "tiramisu"}))
        .await
        .unwrap();
    let cleared = call(&dispatcher, "alice", "clear_cart", json!({})).await.unwrap();
    assert_eq!(cleared["cleared"], true);
    assert_eq!(cleared["removedItems"], 1);
}

#[tokio::test]
async fn test_preferences_patch_merges() {
    let dispatcher = setup(Arc::new(MemoryStore::new())).await;

    call(
        &dispatcher,
        "alice",
        "update_preferences",
        json!({"favoriteCuisines": ["thai"], "spiceLevel": "hot"}),
    )
    .await
    .unwrap();
    let saved = call(&dispatcher, "alice", "update_preferences", json!({"budgetRange": "$$"}))
        .await
        .unwrap();
    assert_eq!(saved["preferences"]["favoriteCuisines"], json!(["thai"]));
    assert_eq!(saved["preferences"]["spiceLevel"], "hot");
    assert_eq!(saved["preferences"]["budgetRange"], "$$");

    let err = call(&dispatcher, "alice", "update_preferences", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Validation(_)));
}

#[tokio::test]
async fn test_concurrent_adds_for_one_owner_all_land() {
    let dispatcher = Arc::new(setup(Arc::new(MemoryStore::new())).await);
    let mut handles = Vec::new();
    for i in 0..8 {
        let dispatcher = Arc::clone(&dispatcher);
        handles.push(tokio::spawn(async move {
            dispatcher
                .dispatch(
                    ExecutionContext::new("alice", format!("call-{}", i), 5_000),
                    "add_item_to_cart",
                    json!({"itemId": "tiramisu"}),
                )
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    let cart = call(&dispatcher, "alice", "view_cart", json!({})).await.unwrap();
    assert_eq!(cart["itemCount"], 8);
    assert_eq!(cart["subtotal"], "$52.00");
}
