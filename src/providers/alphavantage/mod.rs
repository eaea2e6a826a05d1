//! Alpha Vantage daily price adapter

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::providers::rate_limiter::RequestBudget;
use crate::providers::types::{DailyBar, DailySeriesResponse, OutputSize};
use crate::providers::MarketDataSource;
use crate::types::{PriceObservation, PriceSeries};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

const FUNCTION: &str = "TIME_SERIES_DAILY";

/// Alpha Vantage `TIME_SERIES_DAILY` source
pub struct AlphaVantageSource {
    client: Client,
    base_url: Url,
    api_key: String,
    budget: RequestBudget,
}

impl AlphaVantageSource {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.provider.base_url).map_err(|e| {
            AppError::Config(format!("invalid provider url {}: {}", config.provider.base_url, e))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.provider.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            budget: RequestBudget::per_minute(config.provider.requests_per_minute),
        })
    }

    fn request_url(&self, ticker: &str, size: OutputSize) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("function", FUNCTION)
            .append_pair("symbol", ticker)
            .append_pair("outputsize", size.as_str())
            .append_pair("datatype", "json")
            .append_pair("apikey", &self.api_key);
        url
    }
}

#[async_trait]
impl MarketDataSource for AlphaVantageSource {
    fn id(&self) -> &'static str {
        "alphavantage"
    }

    async fn fetch(&self, ticker: &str, size_hint: usize) -> Result<PriceSeries> {
        if let Err(wait) = self.budget.acquire() {
            tracing::warn!(
                "Local request budget exhausted, retry after {}ms",
                wait.as_millis()
            );
            return Err(AppError::RateLimited {
                message: "local request budget exhausted".to_string(),
                retry_after: Some(wait),
            });
        }

        let size = OutputSize::for_hint(size_hint);
        tracing::info!(
            "Fetching daily prices for {} from {} (outputsize={})",
            ticker,
            self.id(),
            size.as_str()
        );

        let response = self
            .client
            .get(self.request_url(ticker, size))
            .send()
            .await
            .map_err(transport_error)?;

        classify_status(response.status(), ticker)?;

        let body = response.text().await.map_err(transport_error)?;
        let series = parse_daily_response(ticker, &body)?;

        tracing::info!("Received {} sessions for {}", series.len(), ticker);
        Ok(series)
    }
}

/// Map an HTTP status to the error taxonomy; success passes through
pub fn classify_status(status: StatusCode, ticker: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(AppError::RateLimited {
            message: format!("provider returned {}", status),
            retry_after: None,
        }),
        StatusCode::NOT_FOUND => Err(AppError::NotFound(format!("ticker {}", ticker))),
        s if s.is_server_error() => Err(AppError::TransientNetwork(format!(
            "provider returned {}",
            s
        ))),
        s => Err(AppError::Provider(format!("provider returned {}", s))),
    }
}

fn transport_error(err: reqwest::Error) -> AppError {
    // The request URL carries the API key
    let err = err.without_url();
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        AppError::TransientNetwork(err.to_string())
    } else {
        AppError::Provider(err.to_string())
    }
}

/// Normalize a `TIME_SERIES_DAILY` body into a price series for `ticker`
pub fn parse_daily_response(ticker: &str, body: &str) -> Result<PriceSeries> {
    let response: DailySeriesResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Schema(format!("unreadable provider payload: {}", e)))?;

    if let Some(message) = response.error_message {
        return Err(AppError::NotFound(format!("ticker {}: {}", ticker, message)));
    }
    if let Some(message) = response.note.or(response.information) {
        return Err(AppError::RateLimited {
            message,
            retry_after: None,
        });
    }

    if let Some(symbol) = response.meta.and_then(|m| m.symbol) {
        if !symbol.trim().eq_ignore_ascii_case(ticker) {
            return Err(AppError::Schema(format!(
                "payload for {} received for {}",
                symbol, ticker
            )));
        }
    }

    let bars = response.series.ok_or_else(|| {
        AppError::Schema(format!("payload for {} has no daily time series", ticker))
    })?;
    if bars.is_empty() {
        return Err(AppError::NotFound(format!("no daily prices for {}", ticker)));
    }

    let observations = bars
        .iter()
        .map(|(date, bar)| to_observation(ticker, date, bar))
        .collect::<Result<Vec<_>>>()?;

    PriceSeries::new(ticker, observations)
}

fn to_observation(ticker: &str, date: &str, bar: &DailyBar) -> Result<PriceObservation> {
    let timestamp = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| AppError::Schema(format!("bad session date {:?}: {}", date, e)))?;

    let observation = PriceObservation {
        ticker: ticker.to_string(),
        timestamp,
        open: number(date, "open", &bar.open)?,
        high: number(date, "high", &bar.high)?,
        low: number(date, "low", &bar.low)?,
        close: number(date, "close", &bar.close)?,
        volume: bar.volume.trim().parse::<i64>().map_err(|e| {
            AppError::Schema(format!("{}: bad volume {:?}: {}", date, bar.volume, e))
        })?,
    };
    observation.validate()?;
    Ok(observation)
}

fn number(date: &str, field: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| AppError::Schema(format!("{}: bad {} {:?}: {}", date, field, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    const DAILY: &str = r#"{
        "Meta Data": {
            "1. Information": "Daily Prices (open, high, low, close) and Volumes",
            "2. Symbol": "IBM",
            "3. Last Refreshed": "2024-03-08",
            "4. Output Size": "Compact",
            "5. Time Zone": "US/Eastern"
        },
        "Time Series (Daily)": {
            "2024-03-08": {"1. open": "195.0900", "2. high": "197.7700", "3. low": "194.6800", "4. close": "195.9500", "5. volume": "4226545"},
            "2024-03-06": {"1. open": "193.5000", "2. high": "198.1500", "3. low": "192.9600", "4. close": "196.1600", "5. volume": "6945818"},
            "2024-03-07": {"1. open": "197.5800", "2. high": "198.7300", "3. low": "196.1400", "4. close": "198.7400", "5. volume": "4184138"}
        }
    }"#;

    fn test_config(base_url: &str) -> Config {
        let mut config = Config::new("demo", "unused.db");
        config.provider.base_url = base_url.to_string();
        config.provider.timeout_secs = 5;
        config
    }

    /// Serve one canned HTTP response and hand back the request line
    async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let text = String::from_utf8_lossy(&request);
            let _ = tx.send(text.lines().next().unwrap_or_default().to_string());

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        (format!("http://{}/query", addr), rx)
    }

    #[test]
    fn test_parse_sorts_ascending() {
        let series = parse_daily_response("IBM", DAILY).unwrap();
        assert_eq!(series.ticker(), "IBM");
        assert_eq!(series.len(), 3);
        assert_eq!(
            series.first().unwrap().timestamp,
            NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()
        );
        assert_eq!(series.closes(), vec![196.16, 198.74, 195.95]);
        assert_eq!(series.last().unwrap().volume, 4_226_545);
    }

    #[test]
    fn test_error_message_is_not_found() {
        let body = r#"{"Error Message": "Invalid API call. Please retry or visit the documentation."}"#;
        assert!(matches!(
            parse_daily_response("ZZZZ", body),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_throttle_notes_are_rate_limits() {
        let note = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#;
        let info = r#"{"Information": "We have detected your API key and our standard API rate limit is 25 requests per day."}"#;
        for body in [note, info] {
            let err = parse_daily_response("IBM", body).unwrap_err();
            assert!(matches!(err, AppError::RateLimited { .. }));
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_malformed_payloads_are_schema_errors() {
        assert!(matches!(
            parse_daily_response("IBM", "<html>oops</html>"),
            Err(AppError::Schema(_))
        ));
        assert!(matches!(
            parse_daily_response("IBM", r#"{"Meta Data": {}}"#),
            Err(AppError::Schema(_))
        ));

        let bad_number = r#"{"Time Series (Daily)": {"2024-03-08": {"1. open": "x", "2. high": "1", "3. low": "1", "4. close": "1", "5. volume": "1"}}}"#;
        assert!(matches!(
            parse_daily_response("IBM", bad_number),
            Err(AppError::Schema(_))
        ));

        let bad_date = r#"{"Time Series (Daily)": {"03/08/2024": {"1. open": "1", "2. high": "1", "3. low": "1", "4. close": "1", "5. volume": "1"}}}"#;
        assert!(matches!(
            parse_daily_response("IBM", bad_date),
            Err(AppError::Schema(_))
        ));
    }

    #[test]
    fn test_payload_for_other_symbol_rejected() {
        assert!(matches!(
            parse_daily_response("MSFT", DAILY),
            Err(AppError::Schema(_))
        ));
        assert!(parse_daily_response("ibm", DAILY).is_ok());
    }

    #[test]
    fn test_empty_series_is_not_found() {
        assert!(matches!(
            parse_daily_response("IBM", r#"{"Time Series (Daily)": {}}"#),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK, "IBM").is_ok());
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "IBM"),
            Err(AppError::RateLimited { .. })
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "IBM"),
            Err(AppError::TransientNetwork(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "IBM"),
            Err(AppError::Provider(_))
        ));
    }

    #[test]
    fn test_output_size_follows_hint() {
        assert_eq!(OutputSize::for_hint(10), OutputSize::Compact);
        assert_eq!(OutputSize::for_hint(100), OutputSize::Compact);
        assert_eq!(OutputSize::for_hint(101), OutputSize::Full);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = test_config("not a url");
        assert!(matches!(
            AlphaVantageSource::new(&config),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_over_http() {
        let (url, request_line) = serve_once("200 OK", DAILY).await;
        let source = AlphaVantageSource::new(&test_config(&url)).unwrap();

        let series = source.fetch("IBM", 500).await.unwrap();
        assert_eq!(series.len(), 3);

        let line = request_line.await.unwrap();
        assert!(line.starts_with("GET /query?"), "{}", line);
        assert!(line.contains("function=TIME_SERIES_DAILY"));
        assert!(line.contains("symbol=IBM"));
        assert!(line.contains("outputsize=full"));
        assert!(line.contains("apikey=demo"));
    }

    #[tokio::test]
    async fn test_fetch_maps_http_throttling() {
        let (url, _) = serve_once("429 Too Many Requests", "{}").await;
        let source = AlphaVantageSource::new(&test_config(&url)).unwrap();
        assert!(matches!(
            source.fetch("IBM", 10).await,
            Err(AppError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_maps_server_errors() {
        let (url, _) = serve_once("503 Service Unavailable", "{}").await;
        let source = AlphaVantageSource::new(&test_config(&url)).unwrap();
        assert!(matches!(
            source.fetch("IBM", 10).await,
            Err(AppError::TransientNetwork(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = AlphaVantageSource::new(&test_config(&format!("http://{}/query", addr))).unwrap();
        let err = source.fetch("IBM", 10).await.unwrap_err();
        assert!(matches!(err, AppError::TransientNetwork(_)), "{:?}", err);
        assert!(!err.to_string().contains("apikey"));
    }

    #[tokio::test]
    async fn test_local_budget_exhausted() {
        let (url, _) = serve_once("200 OK", DAILY).await;
        let mut config = test_config(&url);
        config.provider.requests_per_minute = 1;
        let source = AlphaVantageSource::new(&config).unwrap();

        source.fetch("IBM", 10).await.unwrap();
        match source.fetch("IBM", 10).await {
            Err(AppError::RateLimited { retry_after, .. }) => assert!(retry_after.is_some()),
            other => panic!("expected rate limit, got {:?}", other),
        }
    }
}
