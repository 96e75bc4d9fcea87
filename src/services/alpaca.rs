// src/services/alpaca.rs
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;

use crate::models::{AggregateBar, StockSnapshot};
use crate::services::provider::{
    bar_from_value, bar_timespan, redact, send_json, snapshot_from_bar, BarUnit, ProviderClient,
    ProviderError,
};

pub const DEFAULT_DATA_URL: &str = "https://data.alpaca.markets";

/// Alpaca market-data client. Pages are chained with `next_page_token`.
pub struct AlpacaClient {
    client: Client,
    data_url: String,
    key_id: String,
    secret_key: String,
}

impl AlpacaClient {
    pub fn new(
        client: Client,
        data_url: impl Into<String>,
        key_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        AlpacaClient {
            client,
            data_url: data_url.into(),
            key_id: key_id.into(),
            secret_key: secret_key.into(),
        }
    }

    fn build_url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.data_url)
            .and_then(|base| base.join(path))
            .map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn get(&self, url: &Url) -> RequestBuilder {
        self.client
            .get(url.clone())
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
    }

    /// Follow `next_page_token` until exhausted, handing each page body to `collect`.
    async fn fetch_all_pages<F>(
        &self,
        path: &str,
        query: Vec<(&str, String)>,
        mut collect: F,
    ) -> Result<usize, ProviderError>
    where
        F: FnMut(Value) + Send,
    {
        let mut token: Option<String> = None;
        let mut seen: HashSet<String> = HashSet::new();
        let mut pages = 0usize;
        loop {
            let mut page_query = query.clone();
            if let Some(t) = token.take() {
                page_query.push(("page_token", t));
            }
            let url = self.build_url(path, &page_query)?;
            let mut body = send_json(self.get(&url), &url).await?;
            pages += 1;

            token = body
                .get("next_page_token")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            collect(body.take());

            match token.as_deref() {
                None => break,
                Some(t) if !seen.insert(t.to_string()) => {
                    return Err(ProviderError::Decode {
                        url: redact(&url),
                        message: format!("page token {} repeated after {} page(s)", t, pages),
                    });
                }
                Some(_) => {}
            }
            debug!("Following page token for {} (page {})", path, pages + 1);
        }
        Ok(pages)
    }
}

fn timeframe(minutes_per_bar: u32) -> String {
    let (n, unit) = bar_timespan(minutes_per_bar);
    let suffix = match unit {
        BarUnit::Minute => "Min",
        BarUnit::Hour => "Hour",
        BarUnit::Day => "Day",
        BarUnit::Week => "Week",
    };
    format!("{}{}", n, suffix)
}

/// Snapshots arrive as a symbol-keyed map; carry the symbol into each record.
fn flatten_snapshots(page: Value, into: &mut Vec<Value>) {
    let Value::Object(mut page) = page else { return };
    let Some(Value::Object(snapshots)) = page.remove("snapshots") else { return };
    for (symbol, mut snapshot) in snapshots {
        if let Value::Object(fields) = &mut snapshot {
            fields
                .entry("ticker")
                .or_insert_with(|| Value::String(symbol.clone()));
        }
        into.push(snapshot);
    }
}

#[async_trait]
impl ProviderClient for AlpacaClient {
    fn name(&self) -> &'static str {
        "alpaca"
    }

    async fn fetch_previous_close(&self, ticker: &str) -> Result<StockSnapshot, ProviderError> {
        let url = self.build_url(&format!("/v2/stocks/{}/snapshot", ticker), &[])?;
        info!("Fetching previous close for {} from alpaca", ticker);
        let body = send_json(self.get(&url), &url).await?;

        match body.get("prevDailyBar").or_else(|| body.get("dailyBar")) {
            Some(bar) if bar.is_object() => Ok(snapshot_from_bar(bar)),
            _ => {
                warn!("No daily bar in alpaca snapshot for {}", ticker);
                Ok(StockSnapshot::default())
            }
        }
    }

    async fn fetch_option_snapshots(&self, ticker: &str) -> Result<Vec<Value>, ProviderError> {
        info!("Fetching option snapshots for {} from alpaca", ticker);
        let mut collected = Vec::new();
        let pages = self
            .fetch_all_pages(
                &format!("/v1beta1/options/snapshots/{}", ticker),
                vec![("feed", "indicative".to_string()), ("limit", "1000".to_string())],
                |page| flatten_snapshots(page, &mut collected),
            )
            .await?;
        info!("Fetched {} option snapshots over {} page(s)", collected.len(), pages);
        Ok(collected)
    }

    async fn fetch_aggregates(
        &self,
        ticker: &str,
        days_back: u32,
        minutes_per_bar: u32,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregateBar>, ProviderError> {
        let start = end - Duration::days(i64::from(days_back));
        info!(
            "Fetching {} bars for {} ({} days) from alpaca",
            timeframe(minutes_per_bar),
            ticker,
            days_back
        );

        let mut bars = Vec::new();
        self.fetch_all_pages(
            &format!("/v2/stocks/{}/bars", ticker),
            vec![
                ("timeframe", timeframe(minutes_per_bar)),
                ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("limit", "10000".to_string()),
                ("adjustment", "raw".to_string()),
                ("feed", "iex".to_string()),
            ],
            |page| {
                if let Some(raw) = page.get("bars").and_then(Value::as_array) {
                    bars.extend(raw.iter().filter_map(bar_from_value));
                }
            },
        )
        .await?;
        Ok(bars)
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

    type Pages = fn(Option<&str>) -> Response;

    /// Serves option snapshots for SPY, answering each request by its page token.
    fn serve(pages: Pages) -> String {
        let routes: BoxedFilter<(Response,)> = warp::path!("v1beta1" / "options" / "snapshots" / "SPY")
            .and(warp::header::exact("apca-api-key-id", "id"))
            .and(warp::header::exact("apca-api-secret-key", "secret"))
            .and(warp::query::<HashMap<String, String>>())
            .map(move |query: HashMap<String, String>| pages(query.get("page_token").map(String::as_str)))
            .boxed();
        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{}", addr)
    }

    fn client(base: String) -> AlpacaClient {
        AlpacaClient::new(Client::new(), base, "id", "secret")
    }

    fn page(symbol: &str, next: Option<&str>) -> Response {
        let mut snapshots = serde_json::Map::new();
        snapshots.insert(symbol.to_string(), json!({}));
        warp::reply::json(&json!({"snapshots": snapshots, "next_page_token": next})).into_response()
    }

    #[tokio::test]
    async fn snapshots_accumulate_across_page_tokens() {
        let base = serve(|token| match token {
            None => page("SPY240119C00470000", Some("t2")),
            Some(_) => page("SPY240119P00470000", None),
        });

        let snapshots = client(base).fetch_option_snapshots("SPY").await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().any(|s| s["ticker"] == "SPY240119C00470000"));
        assert!(snapshots.iter().any(|s| s["ticker"] == "SPY240119P00470000"));
    }

    #[tokio::test]
    async fn failed_later_page_fails_the_whole_fetch() {
        let base = serve(|token| match token {
            None => page("SPY240119C00470000", Some("t2")),
            Some(_) => warp::reply::with_status(
                warp::reply::html("<html><head><title>502</title></head><body>Bad  Gateway</body></html>"),
                StatusCode::BAD_GATEWAY,
            )
            .into_response(),
        });

        let err = client(base).fetch_option_snapshots("SPY").await.unwrap_err();
        match err {
            ProviderError::Remote { status, message, .. } => {
                assert_eq!(status, 502);
                assert_eq!(message.as_deref(), Some("502 Bad Gateway"));
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn repeated_page_token_is_an_error() {
        let base = serve(|_| page("SPY240119C00470000", Some("same")));
        let err = client(base).fetch_option_snapshots("SPY").await.unwrap_err();
        assert!(matches!(err, ProviderError::Decode { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let err = client("http://127.0.0.1:1".to_string())
            .fetch_option_snapshots("SPY")
            .await
            .unwrap_err();
        assert!(err.is_transport(), "got {:?}", err);
    }

    #[test]
    fn timeframes_use_alpaca_vocabulary() {
        assert_eq!(timeframe(5), "5Min");
        assert_eq!(timeframe(60), "1Hour");
        assert_eq!(timeframe(1440), "1Day");
        assert_eq!(timeframe(10_080), "1Week");
    }

    #[test]
    fn snapshot_map_is_flattened_with_symbols() {
        let page = json!({
            "snapshots": {
                "SPY240119C00470000": {"latestQuote": {"bp": 1.0, "ap": 1.2}},
                "SPY240119P00470000": {"ticker": "keep-me"}
            },
            "next_page_token": null
        });
        let mut out = Vec::new();
        flatten_snapshots(page, &mut out);

        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|s| s["ticker"] == "SPY240119C00470000"));
        assert!(out.iter().any(|s| s["ticker"] == "keep-me"));
    }

    #[test]
    fn pages_without_snapshots_add_nothing() {
        let mut out = Vec::new();
        flatten_snapshots(json!({"message": "nope"}), &mut out);
        flatten_snapshots(json!([1, 2]), &mut out);
        assert!(out.is_empty());
    }
}
