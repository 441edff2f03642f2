//! HTTP transport for JSON-RPC 1.0 calls.

use crate::error::{RpcError, RpcErrorKind, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Where and how to reach one node's RPC server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl RpcEndpoint {
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// Receives every completed call made through a client it is attached to.
///
/// Used by the scenario journal; implementations must not block.
pub trait RpcObserver: Send + Sync {
    fn on_call(&self, node: &str, method: &str, params: &Value, outcome: &Result<Value>);
}

#[derive(Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

/// Client for a single node. Cloning is cheap and shares the connection pool.
#[derive(Clone)]
pub struct RpcClient {
    label: String,
    endpoint: RpcEndpoint,
    http: reqwest::Client,
    next_id: Arc<AtomicU64>,
    observer: Option<Arc<dyn RpcObserver>>,
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("label", &self.label)
            .field("url", &self.endpoint.url())
            .field("observed", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Creates a client for `endpoint`, labelled `label` in errors and logs.
    pub fn new(label: impl Into<String>, endpoint: RpcEndpoint, timeout: Duration) -> Result<Self> {
        let label = label.into();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                RpcError::new(
                    RpcErrorKind::Fatal,
                    None,
                    format!("failed to build HTTP client: {e}"),
                    "<init>",
                    label.clone(),
                )
            })?;

        Ok(Self {
            label,
            endpoint,
            http,
            next_id: Arc::new(AtomicU64::new(1)),
            observer: None,
        })
    }

    /// Returns a copy that reports every call to `observer`.
    pub fn with_observer(&self, observer: Arc<dyn RpcObserver>) -> Self {
        Self {
            observer: Some(observer),
            ..self.clone()
        }
    }

    /// Returns a copy that reports to nobody. Used for polling.
    pub fn quiet(&self) -> Self {
        Self {
            observer: None,
            ..self.clone()
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    /// Issues one call. `params` should be a JSON array.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let outcome = self.send(method, &params).await;
        if let Some(observer) = &self.observer {
            observer.on_call(&self.label, method, &params, &outcome);
        }
        outcome
    }

    /// Issues one call and deserializes the result.
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| {
            self.error(
                RpcErrorKind::Fatal,
                None,
                format!("unexpected result shape: {e}"),
                method,
            )
        })
    }

    async fn send(&self, method: &str, params: &Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(node = %self.label, method, %params, "rpc call");

        let response = self
            .http
            .post(self.endpoint.url())
            .basic_auth(&self.endpoint.user, Some(&self.endpoint.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(method, &e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(self.error(
                RpcErrorKind::Fatal,
                None,
                format!("authentication rejected (HTTP {status})"),
                method,
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(method, &e))?;

        // Application errors arrive with HTTP 500 and a populated error object,
        // so the body is inspected before the status.
        match serde_json::from_str::<ResponseEnvelope>(&text) {
            Ok(ResponseEnvelope {
                error: Some(err), ..
            }) => Err(RpcError::from_application(
                err.code,
                err.message,
                method,
                self.label.clone(),
            )),
            Ok(ResponseEnvelope { result, error: None }) if status.is_success() => {
                Ok(result.unwrap_or(Value::Null))
            }
            _ if status == StatusCode::SERVICE_UNAVAILABLE => Err(self.error(
                RpcErrorKind::Unavailable,
                None,
                "service unavailable (HTTP 503)",
                method,
            )),
            Ok(_) => Err(self.error(
                RpcErrorKind::Fatal,
                None,
                format!("HTTP {status} without error object"),
                method,
            )),
            Err(e) => Err(self.error(
                RpcErrorKind::Fatal,
                None,
                format!("malformed response (HTTP {status}): {e}"),
                method,
            )),
        }
    }

    fn transport_error(&self, method: &str, err: &reqwest::Error) -> RpcError {
        let kind = if err.is_connect() || err.is_timeout() || err.is_request() {
            RpcErrorKind::Unavailable
        } else {
            RpcErrorKind::Fatal
        };
        self.error(kind, None, format!("transport error: {err}"), method)
    }

    fn error(
        &self,
        kind: RpcErrorKind,
        code: Option<i64>,
        message: impl Into<String>,
        method: &str,
    ) -> RpcError {
        RpcError::new(kind, code, message, method, self.label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    async fn fake_node(headers: HeaderMap, axum::Json(req): axum::Json<Value>) -> impl IntoResponse {
        if !headers.contains_key("authorization") {
            return (AxumStatus::UNAUTHORIZED, String::new());
        }

        let id = req["id"].clone();
        let (status, body) = match req["method"].as_str().unwrap_or_default() {
            "getblockcount" => (AxumStatus::OK, json!({"result": 7, "error": null, "id": id})),
            "echo" => (
                AxumStatus::OK,
                json!({"result": req["params"], "error": null, "id": id}),
            ),
            "getmempoolentry" => (
                AxumStatus::INTERNAL_SERVER_ERROR,
                json!({"result": null, "error": {"code": -5, "message": "Transaction not in mempool"}, "id": id}),
            ),
            "smsgsend" => (
                AxumStatus::INTERNAL_SERVER_ERROR,
                json!({"result": null, "error": {"code": -1, "message": "Secure messaging is disabled."}, "id": id}),
            ),
            "garbage" => return (AxumStatus::OK, "not json".to_string()),
            _ => (
                AxumStatus::NOT_FOUND,
                json!({"result": null, "error": {"code": -32601, "message": "Method not found"}, "id": id}),
            ),
        };
        (status, body.to_string())
    }

    async fn spawn_fake() -> RpcEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = Router::new().route("/", post(fake_node));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        RpcEndpoint {
            host: "127.0.0.1".to_string(),
            port,
            user: "u".to_string(),
            password: "p".to_string(),
        }
    }

    fn client(endpoint: RpcEndpoint) -> RpcClient {
        RpcClient::new("node0", endpoint, Duration::from_secs(5)).unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl RpcObserver for Recorder {
        fn on_call(&self, _node: &str, method: &str, _params: &Value, outcome: &Result<Value>) {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), outcome.is_ok()));
        }
    }

    #[tokio::test]
    async fn test_successful_call() {
        let rpc = client(spawn_fake().await);
        let count: u64 = rpc.call_as("getblockcount", json!([])).await.unwrap();
        assert_eq!(count, 7);

        let echoed = rpc.call("echo", json!(["a", 1])).await.unwrap();
        assert_eq!(echoed, json!(["a", 1]));
    }

    #[tokio::test]
    async fn test_application_errors_are_classified() {
        let rpc = client(spawn_fake().await);

        let err = rpc.call("getmempoolentry", json!(["ab"])).await.unwrap_err();
        assert_eq!(err.kind, RpcErrorKind::NotFound);
        assert_eq!(err.code, Some(-5));

        let err = rpc.call("smsgsend", json!([])).await.unwrap_err();
        assert_eq!(err.kind, RpcErrorKind::FeatureDisabled);
        assert!(err.message.contains("disabled"));

        let err = rpc.call("nosuchmethod", json!([])).await.unwrap_err();
        assert_eq!(err.kind, RpcErrorKind::Fatal);
        assert_eq!(err.code, Some(-32601));
    }

    #[tokio::test]
    async fn test_malformed_body_is_fatal() {
        let rpc = client(spawn_fake().await);
        let err = rpc.call("garbage", json!([])).await.unwrap_err();
        assert_eq!(err.kind, RpcErrorKind::Fatal);
        assert!(err.message.contains("malformed"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let rpc = client(RpcEndpoint {
            host: "127.0.0.1".to_string(),
            port,
            user: "u".to_string(),
            password: "p".to_string(),
        });
        let err = rpc.call("getblockcount", json!([])).await.unwrap_err();
        assert_eq!(err.kind, RpcErrorKind::Unavailable);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_observer_sees_calls_but_quiet_copy_does_not() {
        let recorder = Arc::new(Recorder::default());
        let rpc = client(spawn_fake().await).with_observer(recorder.clone());

        rpc.call("getblockcount", json!([])).await.unwrap();
        rpc.call("smsgsend", json!([])).await.unwrap_err();
        rpc.quiet().call("getblockcount", json!([])).await.unwrap();

        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("getblockcount".to_string(), true),
                ("smsgsend".to_string(), false)
            ]
        );
    }
}
