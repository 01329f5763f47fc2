//! Async HTTP client wrapping the vendor gateway.

use std::time::Duration;

use macrofeed_core::{
  client::MarketDataClient,
  indicator::{DataSource, Indicator, SPARSE_FIELD},
  series::{DateWindow, FetchedTable, Series},
};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  wire::{StatusResponse, VendorResponse},
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Connection settings for the vendor gateway.
#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub base_url: String,
  pub timeout:  Duration,
}

/// Async HTTP client for the vendor gateway.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpMarketDataClient {
  client: Client,
  config: ClientConfig,
}

impl HttpMarketDataClient {
  pub fn new(config: ClientConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(config.timeout)
      .user_agent(concat!("macrofeed/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  async fn get_vendor(
    &self,
    call: &'static str,
    query: &[(&str, &str)],
  ) -> Result<VendorResponse> {
    let resp = self
      .client
      .get(self.url(&format!("/{call}")))
      .query(query)
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(Error::Status { call, status: resp.status() });
    }
    Ok(resp.json().await?)
  }

  /// `GET /wsd`: one field of a dense daily series.
  pub async fn fetch_dense_field(
    &self,
    code: &str,
    field: &str,
    window: DateWindow,
  ) -> Result<Series> {
    let begin = window.start.format(DATE_FORMAT).to_string();
    let end = window.end.format(DATE_FORMAT).to_string();
    debug!(code, field, %begin, %end, "requesting wsd series");

    let resp = self
      .get_vendor(
        "wsd",
        &[("codes", code), ("fields", field), ("begin_time", &begin), ("end_time", &end)],
      )
      .await?;
    resp.into_series(&format!("{code}.{field}"))
  }

  /// `GET /edb`: a sparse economic series.
  pub async fn fetch_sparse(&self, code: &str, window: DateWindow) -> Result<Series> {
    let begin = window.start.format(DATE_FORMAT).to_string();
    let end = window.end.format(DATE_FORMAT).to_string();
    debug!(code, %begin, %end, "requesting edb series");

    let resp = self
      .get_vendor("edb", &[("codes", code), ("begin_time", &begin), ("end_time", &end)])
      .await?;
    resp.into_series(code)
  }
}

impl MarketDataClient for HttpMarketDataClient {
  type Error = Error;

  async fn fetch(&self, indicator: &Indicator, window: DateWindow) -> Result<FetchedTable> {
    let mut table = FetchedTable::new();

    match indicator.source {
      DataSource::Sparse => {
        let series = self.fetch_sparse(&indicator.code, window).await?;
        if !series.is_empty() {
          table.insert(SPARSE_FIELD.to_owned(), series);
        }
      }
      DataSource::Dense => {
        // One request per field; failed fields are left out so the caller
        // sees partial coverage.
        let mut first_error = None;
        for field in indicator.field_names() {
          match self.fetch_dense_field(&indicator.code, field, window).await {
            Ok(series) => {
              if !series.is_empty() {
                table.insert(field.to_owned(), series);
              }
            }
            Err(e) => {
              warn!(code = %indicator.code, field, error = %e, "field fetch failed");
              first_error.get_or_insert(e);
            }
          }
        }
        if let (true, Some(e)) = (table.is_empty(), first_error) {
          return Err(e);
        }
      }
    }

    info!(
      code = %indicator.code,
      fields = table.len(),
      points = table.values().map(Series::len).sum::<usize>(),
      "fetched indicator"
    );
    Ok(table)
  }

  async fn check_connection(&self) -> bool {
    let resp = match self.client.get(self.url("/status")).send().await {
      Ok(resp) if resp.status().is_success() => resp,
      Ok(resp) => {
        warn!(status = %resp.status(), "gateway status check failed");
        return false;
      }
      Err(e) => {
        warn!(error = %e, "gateway unreachable");
        return false;
      }
    };
    resp
      .json::<StatusResponse>()
      .await
      .map(|s| s.connected)
      .unwrap_or(false)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveDate, Utc};
  use macrofeed_core::indicator::Field;
  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
  };

  use super::*;

  fn client(server: &MockServer) -> HttpMarketDataClient {
    HttpMarketDataClient::new(ClientConfig {
      base_url: server.uri(),
      timeout:  Duration::from_secs(5),
    })
    .unwrap()
  }

  fn indicator(source: DataSource, fields: &[&str]) -> Indicator {
    Indicator {
      code:       "000300.SH".into(),
      category:   "Equity".into(),
      name:       "CSI 300".into(),
      source,
      fields:     fields.iter().map(|f| Field::new(*f)).collect(),
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  fn window() -> DateWindow {
    DateWindow::new(
      NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
      NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
    )
  }

  async fn mount_wsd(server: &MockServer, field: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
      .and(path("/wsd"))
      .and(query_param("fields", field))
      .respond_with(template)
      .mount(server)
      .await;
  }

  const TWO_DAYS: &str =
    r#"{"ErrorCode":0,"Data":[[1.0,2.0]],"Times":["2024-01-02","2024-01-03"]}"#;

  #[tokio::test]
  async fn dense_fetch_fans_out_per_field() {
    let server = MockServer::start().await;
    mount_wsd(&server, "close", ResponseTemplate::new(200).set_body_string(TWO_DAYS)).await;
    mount_wsd(&server, "pct_chg", ResponseTemplate::new(200).set_body_string(TWO_DAYS)).await;

    let table = client(&server)
      .fetch(&indicator(DataSource::Dense, &["close", "pct_chg"]), window())
      .await
      .unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table["close"].present_count(), 2);
  }

  #[tokio::test]
  async fn dense_fetch_keeps_fields_that_succeeded() {
    let server = MockServer::start().await;
    mount_wsd(&server, "close", ResponseTemplate::new(200).set_body_string(TWO_DAYS)).await;
    mount_wsd(&server, "val_pe_nonnegative", ResponseTemplate::new(500)).await;

    let table = client(&server)
      .fetch(&indicator(DataSource::Dense, &["close", "val_pe_nonnegative"]), window())
      .await
      .unwrap();

    assert!(table.contains_key("close"));
    assert!(!table.contains_key("val_pe_nonnegative"));
  }

  #[tokio::test]
  async fn dense_fetch_errors_when_every_field_fails() {
    let server = MockServer::start().await;
    mount_wsd(
      &server,
      "close",
      ResponseTemplate::new(200).set_body_string(r#"{"ErrorCode":-1,"Error":"quota"}"#),
    )
    .await;

    let err = client(&server)
      .fetch(&indicator(DataSource::Dense, &["close"]), window())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Vendor { code: -1, .. }));
  }

  #[tokio::test]
  async fn sparse_fetch_uses_edb_and_value_field() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/edb"))
      .and(query_param("codes", "000300.SH"))
      .and(query_param("begin_time", "2024-01-02"))
      .respond_with(ResponseTemplate::new(200).set_body_string(TWO_DAYS))
      .mount(&server)
      .await;

    let table = client(&server)
      .fetch(&indicator(DataSource::Sparse, &[SPARSE_FIELD]), window())
      .await
      .unwrap();
    assert_eq!(table[SPARSE_FIELD].len(), 2);
  }

  #[tokio::test]
  async fn empty_vendor_answer_is_an_empty_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/edb"))
      .respond_with(
        ResponseTemplate::new(200).set_body_string(r#"{"ErrorCode":0,"Data":[],"Times":[]}"#),
      )
      .mount(&server)
      .await;

    let table = client(&server)
      .fetch(&indicator(DataSource::Sparse, &[SPARSE_FIELD]), window())
      .await
      .unwrap();
    assert!(table.is_empty());
  }

  #[tokio::test]
  async fn check_connection_reads_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/status"))
      .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"connected":true}"#))
      .mount(&server)
      .await;

    assert!(client(&server).check_connection().await);
  }

  #[tokio::test]
  async fn check_connection_false_when_gateway_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/status"))
      .respond_with(ResponseTemplate::new(503))
      .mount(&server)
      .await;

    assert!(!client(&server).check_connection().await);
  }
}
