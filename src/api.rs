use crate::config::AppConfig;
use crate::model::{CardSummary, ScanLogToday, ScanRow};
use crate::nav;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("backend returned HTTP {0}")]
    Http(u16),
    #[error("{0}")]
    Business(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Normalized backend reply: always carries `status`, keeps every raw field.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    /// Legacy bodies with a boolean `success` get a `status` field; bodies
    /// that already have `status`, or neither field, pass through untouched.
    pub fn normalize(raw: Value) -> ApiResult<Self> {
        let Value::Object(mut fields) = raw else {
            return Err(ApiError::Decode("expected a JSON object".into()));
        };
        if !fields.contains_key("status") {
            if let Some(ok) = fields.get("success").and_then(Value::as_bool) {
                let status = if ok { "success" } else { "error" };
                fields.insert("status".into(), Value::String(status.into()));
            }
        }
        Ok(Self(fields))
    }

    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    pub fn is_success(&self) -> bool {
        self.status() == Some("success")
    }

    pub fn message(&self) -> Option<&str> {
        self.0.get("message").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Turns a `status: "error"` envelope into a business error.
    pub fn into_checked(self) -> ApiResult<Self> {
        if self.status() == Some("error") {
            let message = self.message().unwrap_or("unknown error").to_string();
            return Err(ApiError::Business(message));
        }
        Ok(self)
    }

    /// Rows of a `getData` reply. Accepts `data.dashboardData` or a bare `data` array.
    pub fn dashboard_rows(&self) -> ApiResult<Vec<ScanRow>> {
        let rows = match self.get("data") {
            Some(Value::Object(data)) => data.get("dashboardData").cloned().unwrap_or(Value::Array(Vec::new())),
            Some(rows @ Value::Array(_)) => rows.clone(),
            Some(Value::Null) | None => Value::Array(Vec::new()),
            Some(other) => return Err(ApiError::Decode(format!("unexpected data field: {other}"))),
        };
        serde_json::from_value(rows).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

/// Everything the dashboard needs from the production backend.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn call(&self, action: &str, params: &[(&str, String)]) -> ApiResult<Envelope>;

    async fn card_summary(&self, url: &str) -> ApiResult<CardSummary>;

    async fn scan_logs_today(&self, machine_no: &str) -> ApiResult<ScanLogToday>;

    async fn get_data(&self) -> ApiResult<Vec<ScanRow>> {
        let envelope = self.call("getData", &[]).await?.into_checked()?;
        envelope.dashboard_rows()
    }

    async fn scan(&self, lot_no: &str, qty: u32, machine_no: &str) -> ApiResult<Envelope> {
        let params = [
            ("lot_no", lot_no.to_string()),
            ("qty", qty.to_string()),
            ("machine_no", machine_no.to_string()),
        ];
        self.call("scan", &params).await
    }

    async fn login(&self, user: &str, password: &str) -> ApiResult<Envelope> {
        let params = [("user", user.to_string()), ("password", password.to_string())];
        self.call("login", &params).await
    }
}

pub struct HttpBackend {
    client: Client,
    base: String,
}

impl HttpBackend {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.backend_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base: config.backend_url.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::Http(resp.status().as_u16()));
        }
        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn call(&self, action: &str, params: &[(&str, String)]) -> ApiResult<Envelope> {
        let mut form: Vec<(&str, &str)> = vec![("action", action)];
        form.extend(params.iter().map(|(k, v)| (*k, v.as_str())));

        let resp = self
            .client
            .post(format!("{}/api/", self.base))
            .form(&form)
            .send()
            .await?;
        // Error statuses still carry an envelope, so the body decides.
        let body = resp.bytes().await?;
        let raw: Value = serde_json::from_slice(&body).map_err(|err| ApiError::Decode(err.to_string()))?;
        tracing::debug!(action, "backend call completed");
        Envelope::normalize(raw)
    }

    async fn card_summary(&self, url: &str) -> ApiResult<CardSummary> {
        self.get_json(url).await
    }

    async fn scan_logs_today(&self, machine_no: &str) -> ApiResult<ScanLogToday> {
        let url = format!("{}{}", self.base, nav::scan_logs_today_path(machine_no));
        self.get_json(&url).await
    }
}
