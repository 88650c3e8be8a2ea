use crate::error::{FundDashboardError, Result};
use crate::schema::DashboardConfig;
use crate::utils::iso_currency_code;
use futures::future::join_all;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const FX_BASE_URL: &str = "https://open.er-api.com/v6/latest";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FxRate {
    Available { from: String, to: String, rate: f64 },
    Unavailable { from: String, to: String, reason: String },
}

impl FxRate {
    pub fn rate(&self) -> Option<f64> {
        match self {
            FxRate::Available { rate, .. } => Some(*rate),
            FxRate::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, FxRate::Available { .. })
    }

    /// Converts an already aggregated amount; `None` when no rate is known.
    pub fn convert(&self, amount: f64) -> Option<f64> {
        self.rate().map(|rate| amount * rate)
    }
}

/// Live exchange rates for converting single summary figures.
///
/// Every lookup is one request bounded by the client timeout. Failures come
/// back as [`FxRate::Unavailable`] rather than errors.
#[derive(Clone)]
pub struct FxClient {
    client: Client,
    base_url: String,
}

impl FxClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: FX_BASE_URL.to_string(),
        })
    }

    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        Self::new(Duration::from_millis(config.fx_timeout_ms))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn fetch_rate(&self, from: &str, to: &str) -> FxRate {
        let from = iso_currency_code(from).to_string();
        let to = iso_currency_code(to).to_string();

        if from == to {
            return FxRate::Available {
                from,
                to,
                rate: 1.0,
            };
        }

        match self.request_rate(&from, &to).await {
            Ok(rate) => {
                debug!("FX rate {} -> {}: {}", from, to, rate);
                FxRate::Available { from, to, rate }
            }
            Err(err) => {
                warn!("FX rate {} -> {} unavailable: {}", from, to, err);
                FxRate::Unavailable {
                    from,
                    to,
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Looks up several targets concurrently. Keys are the targets as given.
    pub async fn fetch_rates<S: AsRef<str>>(
        &self,
        from: &str,
        targets: &[S],
    ) -> BTreeMap<String, FxRate> {
        let lookups = targets.iter().map(|to| async move {
            let rate = self.fetch_rate(from, to.as_ref()).await;
            (to.as_ref().to_string(), rate)
        });

        join_all(lookups).await.into_iter().collect()
    }

    async fn request_rate(&self, from: &str, to: &str) -> Result<f64> {
        let url = format!("{}/{}", self.base_url, from);
        let res = self.client.get(&url).send().await?;
        let status = res.status();

        if !status.is_success() {
            return Err(FundDashboardError::FxUnavailable(format!(
                "status {} from {}",
                status, url
            )));
        }

        let body: serde_json::Value = res.json().await?;
        rate_from_response(&body, to)
    }
}

/// Reads `rates.<to>` from an exchange-rate response body.
pub fn rate_from_response(body: &serde_json::Value, to: &str) -> Result<f64> {
    if let Some(result) = body.get("result").and_then(|v| v.as_str()) {
        if result != "success" {
            return Err(FundDashboardError::FxUnavailable(format!(
                "provider returned result '{}'",
                result
            )));
        }
    }

    let rate = body
        .get("rates")
        .and_then(|rates| rates.get(to))
        .and_then(|v| v.as_f64())
        .ok_or_else(|| FundDashboardError::FxUnavailable(format!("no rate for {}", to)))?;

    if !rate.is_finite() || rate <= 0.0 {
        return Err(FundDashboardError::FxUnavailable(format!(
            "invalid rate {} for {}",
            rate, to
        )));
    }

    Ok(rate)
}
