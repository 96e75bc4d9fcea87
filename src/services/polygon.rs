// src/services/polygon.rs
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use reqwest::{Client, Url};
use serde_json::Value;

use crate::models::{AggregateBar, StockSnapshot};
use crate::services::provider::{
    bar_from_value, bar_timespan, redact, send_json, snapshot_from_bar, BarUnit, ProviderClient,
    ProviderError,
};

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
const SNAPSHOT_PAGE_LIMIT: &str = "250";
const AGGREGATE_PAGE_LIMIT: &str = "50000";

/// Polygon REST client. Pagination follows `next_url`, re-appending the key.
pub struct PolygonClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PolygonClient {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        PolygonClient {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn build_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .and_then(|base| base.join(path))
            .map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
            pairs.append_pair("apiKey", &self.api_key);
        }
        Ok(url)
    }

    fn normalize_next_url(&self, next_url: &str) -> Result<Url, ProviderError> {
        let mut url = match Url::parse(next_url) {
            Ok(absolute) => absolute,
            Err(_) => Url::parse(&self.base_url)
                .and_then(|base| base.join(next_url))
                .map_err(|e| ProviderError::InvalidUrl(e.to_string()))?,
        };
        if !url.query_pairs().any(|(k, _)| k == "apiKey") {
            url.query_pairs_mut().append_pair("apiKey", &self.api_key);
        }
        Ok(url)
    }

    /// Collect `results` from every page. Any failed page fails the whole fetch,
    /// and so does a `next_url` that points at a page already read.
    async fn fetch_all_pages(&self, first: Url) -> Result<Vec<Value>, ProviderError> {
        let mut collected = Vec::new();
        let mut pages = 0usize;
        let mut seen = HashSet::new();
        let mut next = Some(first);
        while let Some(current) = next {
            if !seen.insert(current.to_string()) {
                return Err(ProviderError::Decode {
                    url: redact(&current),
                    message: format!("next_url repeated after {} page(s)", pages),
                });
            }
            let page = send_json(self.client.get(current.clone()), &current).await?;
            pages += 1;
            if let Some(results) = page.get("results").and_then(Value::as_array) {
                collected.extend(results.iter().cloned());
            }
            next = match page.get("next_url").and_then(Value::as_str) {
                Some(next_url) if !next_url.is_empty() => Some(self.normalize_next_url(next_url)?),
                _ => None,
            };
        }
        info!("Fetched {} records over {} page(s)", collected.len(), pages);
        Ok(collected)
    }
}

fn timespan_name(unit: BarUnit) -> &'static str {
    match unit {
        BarUnit::Minute => "minute",
        BarUnit::Hour => "hour",
        BarUnit::Day => "day",
        BarUnit::Week => "week",
    }
}

#[async_trait]
impl ProviderClient for PolygonClient {
    fn name(&self) -> &'static str {
        "polygon"
    }

    async fn fetch_previous_close(&self, ticker: &str) -> Result<StockSnapshot, ProviderError> {
        let url = self.build_url(&format!("/v2/aggs/ticker/{}/prev", ticker), &[("adjusted", "true")])?;
        info!("Fetching previous close for {} from {}", ticker, redact(&url));
        let body = send_json(self.client.get(url.clone()), &url).await?;

        match body
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
        {
            Some(bar) => Ok(snapshot_from_bar(bar)),
            None => {
                warn!("No previous-close bar returned for {}", ticker);
                Ok(StockSnapshot::default())
            }
        }
    }

    async fn fetch_option_snapshots(&self, ticker: &str) -> Result<Vec<Value>, ProviderError> {
        let url = self.build_url(
            &format!("/v3/snapshot/options/{}", ticker),
            &[("limit", SNAPSHOT_PAGE_LIMIT)],
        )?;
        info!("Fetching option snapshots for {}", ticker);
        self.fetch_all_pages(url).await
    }

    async fn fetch_aggregates(
        &self,
        ticker: &str,
        days_back: u32,
        minutes_per_bar: u32,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregateBar>, ProviderError> {
        let (multiplier, unit) = bar_timespan(minutes_per_bar);
        let to = end.date_naive();
        let from = to - Duration::days(i64::from(days_back));
        let url = self.build_url(
            &format!(
                "/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
                ticker,
                multiplier,
                timespan_name(unit),
                from.format("%Y-%m-%d"),
                to.format("%Y-%m-%d")
            ),
            &[("adjusted", "true"), ("sort", "asc"), ("limit", AGGREGATE_PAGE_LIMIT)],
        )?;
        info!(
            "Fetching {}x{} aggregates for {} ({} days)",
            multiplier,
            timespan_name(unit),
            ticker,
            days_back
        );
        let raw = self.fetch_all_pages(url).await?;
        Ok(raw.iter().filter_map(bar_from_value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use warp::filters::BoxedFilter;
    use warp::http::StatusCode;
    use warp::reply::Response;
    use warp::{Filter, Reply};

    fn client() -> PolygonClient {
        PolygonClient::new(Client::new(), DEFAULT_BASE_URL, "k3y")
    }

    fn serve(routes: BoxedFilter<(Response,)>) -> String {
        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{}", addr)
    }

    fn first_page(next_url: &'static str) -> BoxedFilter<(Response,)> {
        warp::path!("v3" / "snapshot" / "options" / "SPY")
            .map(move || {
                warp::reply::json(&json!({
                    "results": [{"ticker": "O:SPY240119C00470000"}],
                    "next_url": next_url
                }))
                .into_response()
            })
            .boxed()
    }

    #[tokio::test]
    async fn snapshots_accumulate_across_pages() {
        let second = warp::path!("page2")
            .and(warp::query::<HashMap<String, String>>())
            .map(|query: HashMap<String, String>| {
                let keyed = query.get("apiKey").map(String::as_str) == Some("k3y");
                warp::reply::json(&json!({"results": [{"ticker": "O:SPY240119P00470000", "keyed": keyed}]}))
                    .into_response()
            });
        let base = serve(first_page("/page2").or(second).unify().boxed());

        let snapshots = PolygonClient::new(Client::new(), base, "k3y")
            .fetch_option_snapshots("SPY")
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0]["ticker"], "O:SPY240119C00470000");
        assert_eq!(snapshots[1]["keyed"], true);
    }

    #[tokio::test]
    async fn failed_later_page_fails_the_whole_fetch() {
        let second = warp::path!("page2").map(|| {
            warp::reply::with_status(
                warp::reply::html("<html><body><h1>Bad   Gateway</h1></body></html>"),
                StatusCode::BAD_GATEWAY,
            )
            .into_response()
        });
        let base = serve(first_page("/page2").or(second).unify().boxed());

        let err = PolygonClient::new(Client::new(), base, "k3y")
            .fetch_option_snapshots("SPY")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProviderError::Remote {
                status: 502,
                reason: "Bad Gateway".to_string(),
                message: Some("Bad Gateway".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn repeated_next_url_is_an_error() {
        let looping = warp::path!("loop").map(|| {
            warp::reply::json(&json!({"results": [{"ticker": "X"}], "next_url": "/loop?cursor=same"}))
                .into_response()
        });
        let base = serve(first_page("/loop?cursor=same").or(looping).unify().boxed());

        let err = PolygonClient::new(Client::new(), base, "k3y")
            .fetch_option_snapshots("SPY")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Decode { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let err = PolygonClient::new(Client::new(), "http://127.0.0.1:1", "k3y")
            .fetch_option_snapshots("SPY")
            .await
            .unwrap_err();
        assert!(err.is_transport(), "got {:?}", err);
    }

    #[test]
    fn urls_carry_the_api_key() {
        let url = client()
            .build_url("/v3/snapshot/options/SPY", &[("limit", "250")])
            .unwrap();
        assert_eq!(url.path(), "/v3/snapshot/options/SPY");
        assert!(url.query_pairs().any(|(k, v)| k == "limit" && v == "250"));
        assert!(url.query_pairs().any(|(k, v)| k == "apiKey" && v == "k3y"));
    }

    #[test]
    fn next_urls_get_the_key_exactly_once() {
        let c = client();
        let next = c
            .normalize_next_url("https://api.polygon.io/v3/snapshot/options/SPY?cursor=abc")
            .unwrap();
        assert_eq!(next.query_pairs().filter(|(k, _)| k == "apiKey").count(), 1);

        let keyed = c
            .normalize_next_url("https://api.polygon.io/v3/snapshot/options/SPY?cursor=abc&apiKey=k3y")
            .unwrap();
        assert_eq!(keyed.query_pairs().filter(|(k, _)| k == "apiKey").count(), 1);

        let relative = c.normalize_next_url("/v3/snapshot/options/SPY?cursor=def").unwrap();
        assert_eq!(relative.host_str(), Some("api.polygon.io"));
        assert!(relative.query_pairs().any(|(k, v)| k == "cursor" && v == "def"));
    }
}
