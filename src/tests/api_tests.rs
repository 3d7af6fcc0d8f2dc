use super::fakes::{addr, chain};
use crate::api::create_router;
use crate::config::ChainSpec;
use crate::db::{connection, SqliteRegistry};
use crate::state::AppState;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

struct TestServer {
    base: String,
    client: Client,
}

impl TestServer {
    async fn start() -> Self {
        let pool = connection::in_memory().await.unwrap();
        let registry = SqliteRegistry::init(
            pool,
            &[ChainSpec::preset(chain("BSC")), ChainSpec::preset(chain("ETH"))],
        )
        .await
        .unwrap();
        let state = Arc::new(AppState::new(registry, vec![chain("BSC"), chain("ETH")]));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });

        Self {
            base,
            client: Client::new(),
        }
    }

    async fn add(&self, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}/trackings", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        (response.status(), response.json().await.unwrap())
    }

    async fn rename(&self, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .put(format!("{}/trackings/name", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        (response.status(), response.json().await.unwrap())
    }

    async fn list(&self, chain_key: &str, user_id: i64) -> (StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}/trackings", self.base))
            .query(&[("chain_key", chain_key), ("user_id", user_id.to_string().as_str())])
            .send()
            .await
            .unwrap();
        (response.status(), response.json().await.unwrap())
    }

    async fn stop(&self, query: &[(&str, String)]) -> (StatusCode, Value) {
        let response = self
            .client
            .delete(format!("{}/trackings", self.base))
            .query(query)
            .send()
            .await
            .unwrap();
        (response.status(), response.json().await.unwrap())
    }
}

#[tokio::test]
async fn add_then_list_trackings() {
    let server = TestServer::start().await;
    let wallet = "0xABCDEF0000000000000000000000000000000001";

    let (status, body) = server
        .add(json!({"chain_key": "BSC", "user_id": 1, "wallet": wallet, "custom_name": " main "}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["wallet"], wallet.to_lowercase());
    assert_eq!(body["data"]["custom_name"], "main");

    let (status, _) = server
        .add(json!({"chain_key": "BSC", "user_id": 1, "wallet": wallet.to_lowercase()}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = server.list("BSC", 1).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["custom_name"], "main");

    let (_, body) = server.list("ETH", 1).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn taken_name_on_add_leaves_nothing_behind() {
    let server = TestServer::start().await;
    server
        .add(json!({"chain_key": "BSC", "user_id": 1, "wallet": addr("01"), "custom_name": "main"}))
        .await;

    let (status, body) = server
        .add(json!({"chain_key": "ETH", "user_id": 1, "wallet": addr("02"), "custom_name": "main"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("main"));

    let (_, body) = server.list("ETH", 1).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn rename_reports_missing_and_taken() {
    let server = TestServer::start().await;
    for tag in ["01", "02"] {
        server
            .add(json!({"chain_key": "BSC", "user_id": 1, "wallet": addr(tag)}))
            .await;
    }

    let (status, body) = server
        .rename(json!({
            "chain_key": "BSC", "user_id": 1, "wallet": addr("01"), "custom_name": "hot"
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["custom_name"], "hot");

    let (status, _) = server
        .rename(json!({
            "chain_key": "BSC", "user_id": 1, "wallet": addr("02"), "custom_name": "hot"
        }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = server
        .rename(json!({
            "chain_key": "BSC", "user_id": 1, "wallet": addr("03"), "custom_name": "cold"
        }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .rename(json!({
            "chain_key": "BSC", "user_id": 1, "wallet": addr("02"), "custom_name": "   "
        }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_removes_one_wallet_or_all() {
    let server = TestServer::start().await;
    for tag in ["01", "02", "03"] {
        server
            .add(json!({"chain_key": "BSC", "user_id": 1, "wallet": addr(tag)}))
            .await;
    }

    let base = [("chain_key", "BSC".to_string()), ("user_id", "1".to_string())];
    let mut one = base.to_vec();
    one.push(("wallet", addr("02").to_string()));

    let (status, body) = server.stop(&one).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], 1);

    let (_, body) = server.stop(&base).await;
    assert_eq!(body["data"]["removed"], 2);

    let (_, body) = server.list("BSC", 1).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let server = TestServer::start().await;

    let (status, body) = server
        .add(json!({"chain_key": "BSC", "user_id": 1, "wallet": "0x1234"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid EVM address format");

    let (status, _) = server
        .add(json!({"chain_key": "TRON", "user_id": 1, "wallet": addr("01")}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.list("TRON", 1).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
