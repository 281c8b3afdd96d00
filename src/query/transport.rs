use crate::config::ServiceConfig;
use crate::error::{PathfinderError, Result};
use crate::query::types::{EvaluateRequest, EvaluationResult, HistogramRequest, HistogramResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const SUBSCRIPTION_KEY_HEADER: &str = "ocp-apim-subscription-key";

/// The two remote operations the path finder needs from the search service.
///
/// One implementation speaks HTTP; tests substitute an in-memory service.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn evaluate(&self, request: &EvaluateRequest) -> Result<EvaluationResult>;

    async fn calc_histogram(&self, request: &HistogramRequest) -> Result<HistogramResult>;
}

/// Error document in the service's nested form
#[derive(Deserialize)]
struct NestedErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Error document in the gateway's flat form
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlatErrorBody {
    status_code: serde_json::Value,
    #[serde(default)]
    message: String,
}

/// Recognise a structured error document in a response body.
pub(crate) fn parse_service_error(body: &str) -> Option<PathfinderError> {
    if let Ok(nested) = serde_json::from_str::<NestedErrorBody>(body) {
        return Some(PathfinderError::RemoteService {
            code: nested.error.code,
            message: nested.error.message,
        });
    }
    if let Ok(flat) = serde_json::from_str::<FlatErrorBody>(body) {
        let code = match flat.status_code {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        return Some(PathfinderError::RemoteService {
            code,
            message: flat.message,
        });
    }
    None
}

/// HTTPS transport for the academic search service
///
/// Authenticates with a subscription key header. Retrying and concurrency
/// limiting live one level up, in the query client.
pub struct HttpTransport {
    client: Client,
    evaluate_url: Url,
    histogram_url: Url,
}

impl HttpTransport {
    /// Build a transport from service settings and the subscription key.
    pub fn new(config: &ServiceConfig, api_key: &str) -> Result<Self> {
        let mut base = config.endpoint.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| PathfinderError::Config(format!("Invalid service endpoint {}: {}", base, e)))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| PathfinderError::Config(format!("Invalid service endpoint: {}", e)))
        };

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| PathfinderError::Config("Subscription key is not a valid header value".to_string()))?;
        key.set_sensitive(true);
        headers.insert(SUBSCRIPTION_KEY_HEADER, key);
        if let Some(referer) = &config.referer {
            let value = HeaderValue::from_str(referer)
                .map_err(|_| PathfinderError::Config(format!("Invalid referer: {}", referer)))?;
            headers.insert(REFERER, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| PathfinderError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            evaluate_url: join("evaluate")?,
            histogram_url: join("calchistogram")?,
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: &Url, params: &[(&str, String)]) -> Result<T> {
        let response = self
            .client
            .get(url.clone())
            .query(params)
            .send()
            .await
            .map_err(|e| PathfinderError::RemoteQuery(format!("Network error: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PathfinderError::RemoteQuery(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            if let Some(err) = parse_service_error(&body) {
                return Err(err);
            }
            return Err(PathfinderError::RemoteQuery(format!(
                "Search service error {}: {}",
                status, body
            )));
        }

        // Some gateways report errors with a 200
        if let Some(err) = parse_service_error(&body) {
            return Err(err);
        }

        serde_json::from_str(&body)
            .map_err(|e| PathfinderError::Parse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl SearchTransport for HttpTransport {
    async fn evaluate(&self, request: &EvaluateRequest) -> Result<EvaluationResult> {
        let mut params = vec![
            ("expr", request.expr.clone()),
            ("count", request.count.to_string()),
            ("offset", request.offset.to_string()),
            ("attributes", request.attributes.clone()),
        ];
        if let Some(order_by) = &request.order_by {
            params.push(("orderby", order_by.clone()));
        }
        let start = std::time::Instant::now();
        let result = self.get(&self.evaluate_url, &params).await;
        log::debug!(
            "evaluate count={} offset={} took {:?}",
            request.count,
            request.offset,
            start.elapsed()
        );
        result
    }

    async fn calc_histogram(&self, request: &HistogramRequest) -> Result<HistogramResult> {
        let params = vec![
            ("expr", request.expr.clone()),
            ("attributes", request.attributes.clone()),
            ("count", request.count.to_string()),
            ("offset", request.offset.to_string()),
        ];
        self.get(&self.histogram_url, &params).await
    }
}
