use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method};
use std::time::Duration;
use url::Url;

/// One request to a token endpoint
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub method: Method,
    pub url: Url,
    /// Basic credentials for the token endpoint (sensitive, redacted in `Debug`)
    pub authorization: HeaderValue,
    /// URL-encoded form body, if any
    pub form: Option<Vec<(&'static str, String)>>,
}

/// HTTP seam used for token exchanges
///
/// A transport returns the raw body of a 2xx response. Anything else
/// (connection failures, timeouts, non-success status) is an error.
#[async_trait]
pub trait TokenTransport: Send + Sync {
    async fn send(&self, request: &TokenRequest) -> Result<Bytes, TransportError>;
}

/// [`TokenTransport`] backed by `reqwest`
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a transport whose requests give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TokenTransport for ReqwestTransport {
    async fn send(&self, request: &TokenRequest) -> Result<Bytes, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .header(AUTHORIZATION, request.authorization.clone());

        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status { status });
        }

        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Seen {
        method: Method,
        authorization: Option<String>,
        content_type: Option<String>,
        query: HashMap<String, String>,
        body: String,
    }

    type Log = Arc<Mutex<Vec<Seen>>>;

    async fn record(
        State(log): State<Log>,
        method: Method,
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
        body: String,
    ) -> Json<serde_json::Value> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        log.lock().unwrap().push(Seen {
            method,
            authorization: header("authorization"),
            content_type: header("content-type"),
            query,
            body,
        });
        Json(serde_json::json!({ "token": "t0k3n" }))
    }

    async fn spawn(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn token_request(method: Method, url: Url, form: Option<Vec<(&'static str, String)>>) -> TokenRequest {
        TokenRequest {
            method,
            url,
            authorization: HeaderValue::from_static("Basic dTpw"),
            form,
        }
    }

    #[tokio::test]
    async fn test_get_sends_query_and_authorization() {
        let log = Log::default();
        let addr = spawn(Router::new().route("/jwt/auth", get(record)).with_state(log.clone())).await;

        let url = Url::parse(&format!("http://{}/jwt/auth?service=reg&scope=repo%3Aapp%3Apull", addr)).unwrap();
        let body = ReqwestTransport::default()
            .send(&token_request(Method::GET, url, None))
            .await
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["token"], "t0k3n");

        let seen = log.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::GET);
        assert_eq!(seen[0].authorization.as_deref(), Some("Basic dTpw"));
        assert_eq!(seen[0].query["service"], "reg");
        assert_eq!(seen[0].query["scope"], "repo:app:pull");
    }

    #[tokio::test]
    async fn test_post_sends_form_body() {
        let log = Log::default();
        let addr = spawn(
            Router::new()
                .route("/token", get(record).post(record))
                .with_state(log.clone()),
        )
        .await;

        let url = Url::parse(&format!("http://{}/token", addr)).unwrap();
        let form = vec![
            ("grant_type", "password".to_string()),
            ("service", "reg".to_string()),
            ("scope", "repository:app:pull".to_string()),
        ];
        ReqwestTransport::default()
            .send(&token_request(Method::POST, url, Some(form)))
            .await
            .unwrap();

        let seen = log.lock().unwrap();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(
            seen[0].content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(
            seen[0].body,
            "grant_type=password&service=reg&scope=repository%3Aapp%3Apull"
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let addr = spawn(Router::new().route("/token", get(|| async { StatusCode::UNAUTHORIZED }))).await;

        let url = Url::parse(&format!("http://{}/token", addr)).unwrap();
        let err = ReqwestTransport::default()
            .send(&token_request(Method::GET, url, None))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::Status { status } if status == reqwest::StatusCode::UNAUTHORIZED
        ));
    }

    #[test]
    fn test_request_debug_hides_credentials() {
        let mut authorization = HeaderValue::from_static("Basic dTpw");
        authorization.set_sensitive(true);
        let request = TokenRequest {
            authorization,
            ..token_request(Method::GET, Url::parse("https://auth.example.com/token").unwrap(), None)
        };
        assert!(!format!("{:?}", request).contains("dTpw"));
    }
}
