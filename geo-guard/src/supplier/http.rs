//! HTTP suppliers: the SPARQL endpoint and the La Poste download service.

use super::{RetryPolicy, Supplier, SupplierError};
use crate::config::SupplierConfig;
use crate::error::{GeoError, Result};
use async_trait::async_trait;
use reqwest::{redirect, Client, RequestBuilder, StatusCode};
use tracing::{debug, info, instrument};

/// One remote service with its own client, timeouts and retry policy.
#[derive(Debug, Clone)]
struct Endpoint {
    client: Client,
    url: String,
    retry: RetryPolicy,
}

impl Endpoint {
    fn new(config: &SupplierConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .redirect(redirect::Policy::none())
            .user_agent(concat!("geo-guard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeoError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.endpoint_url.clone(),
            retry: config.retry_policy(),
        })
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Vec<u8>, SupplierError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SupplierError::Http {
                target: self.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        Ok(body.to_vec())
    }

    async fn post_query(&self, query: &str) -> std::result::Result<Vec<u8>, SupplierError> {
        self.send(
            self.client
                .post(&self.url)
                .form(&[("format", "text/csv"), ("query", query)]),
        )
        .await
    }

    async fn get(&self) -> std::result::Result<Vec<u8>, SupplierError> {
        self.send(self.client.get(&self.url)).await
    }

    fn transport_error(&self, error: reqwest::Error) -> SupplierError {
        if error.is_timeout() {
            SupplierError::Timeout {
                target: self.url.clone(),
                message: error.to_string(),
            }
        } else {
            SupplierError::Connection {
                target: self.url.clone(),
                message: error.to_string(),
            }
        }
    }
}

/// Posts queries to a SPARQL endpoint, asking for CSV results, and
/// downloads the postal code base.
///
/// Redirects are not followed. Timeouts, connection failures and the
/// statuses of [`RETRYABLE_STATUSES`](super::RETRYABLE_STATUSES) are retried
/// with exponential backoff.
#[derive(Debug, Clone)]
pub struct HttpSupplier {
    sparql: Endpoint,
    postal: Endpoint,
}

impl HttpSupplier {
    /// Queries the endpoint of `config`; the postal base comes from the
    /// default La Poste service until [`with_postal`](Self::with_postal).
    pub fn new(config: &SupplierConfig) -> Result<Self> {
        Ok(Self {
            sparql: Endpoint::new(config)?,
            postal: Endpoint::new(&SupplierConfig::postal())?,
        })
    }

    pub fn with_postal(mut self, config: &SupplierConfig) -> Result<Self> {
        self.postal = Endpoint::new(config)?;
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.sparql.url
    }

    pub fn postal_endpoint(&self) -> &str {
        &self.postal.url
    }
}

#[async_trait]
impl Supplier for HttpSupplier {
    #[instrument(skip(self, query), fields(endpoint = %self.sparql.url))]
    async fn fetch(&self, query: &str) -> std::result::Result<Vec<u8>, SupplierError> {
        debug!(query_length = query.len(), "Posting query");
        let endpoint = &self.sparql;
        let body = endpoint.retry.run(&endpoint.url, || endpoint.post_query(query)).await?;
        info!(bytes = body.len(), "Query answered");
        Ok(body)
    }

    #[instrument(skip(self), fields(endpoint = %self.postal.url))]
    async fn fetch_postal(&self) -> std::result::Result<Vec<u8>, SupplierError> {
        let endpoint = &self.postal;
        let body = endpoint.retry.run(&endpoint.url, || endpoint.get()).await?;
        info!(bytes = body.len(), "Postal base downloaded");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves the canned responses in order, one per connection, and keeps
    /// the raw requests.
    async fn serve(responses: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut raw = Vec::new();
                let mut buffer = [0u8; 4096];
                loop {
                    let n = socket.read(&mut buffer).await.unwrap();
                    raw.extend_from_slice(&buffer[..n]);
                    if n == 0 || request_complete(&raw) {
                        break;
                    }
                }
                seen.lock().unwrap().push(String::from_utf8_lossy(&raw).into_owned());
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });
        (format!("http://{address}/sparql"), requests)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(end_of_headers) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..end_of_headers]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= end_of_headers + 4 + length
    }

    fn response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn supplier(endpoint: String) -> HttpSupplier {
        HttpSupplier::new(&SupplierConfig {
            endpoint_url: endpoint,
            backoff_factor: 0.0,
            max_retries: 2,
            ..SupplierConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_posts_form_and_retries_unavailable() {
        let (endpoint, requests) = serve(vec![
            response("503 Service Unavailable", "later"),
            response("200 OK", "uri\nhttp://id.insee.fr/geo/pays/1\n"),
        ])
        .await;

        let body = supplier(endpoint).fetch("SELECT ?s WHERE {}").await.unwrap();
        assert_eq!(body, b"uri\nhttp://id.insee.fr/geo/pays/1\n");

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("POST /sparql"));
        assert!(requests[0]
            .to_ascii_lowercase()
            .contains("content-type: application/x-www-form-urlencoded"));
        assert!(requests[0].contains("format=text%2Fcsv&query=SELECT+%3Fs+WHERE+%7B%7D"));
    }

    #[tokio::test]
    async fn test_client_error_carries_body() {
        let (endpoint, requests) =
            serve(vec![response("400 Bad Request", "syntax error at line 1")]).await;

        let err = supplier(endpoint).fetch("SELECT").await.unwrap_err();
        let SupplierError::Http { status, body, .. } = err else {
            panic!("expected an HTTP error");
        };
        assert_eq!(status, 400);
        assert_eq!(body, "syntax error at line 1");
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_postal_base_is_fetched_with_get() {
        let (endpoint, requests) = serve(vec![
            response("500 Internal Server Error", ""),
            response("200 OK", "#Code_commune_INSEE;Nom_de_la_commune\n"),
        ])
        .await;

        let supplier = supplier("http://127.0.0.1:9/sparql".to_string())
            .with_postal(&SupplierConfig {
                endpoint_url: endpoint.clone(),
                backoff_factor: 0.0,
                ..SupplierConfig::postal()
            })
            .unwrap();
        assert_eq!(supplier.postal_endpoint(), endpoint);

        let body = supplier.fetch_postal().await.unwrap();
        assert_eq!(body, b"#Code_commune_INSEE;Nom_de_la_commune\n");
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].starts_with("GET /sparql"));
    }

    #[tokio::test]
    async fn test_redirects_are_not_followed() {
        let (endpoint, _) = serve(vec!["HTTP/1.1 302 Found\r\nLocation: http://example.invalid/\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()])
        .await;

        let err = supplier(endpoint).fetch("SELECT").await.unwrap_err();
        assert!(matches!(err, SupplierError::Http { status: 302, .. }));
    }
}
