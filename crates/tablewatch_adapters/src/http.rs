use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tablewatch_domain::browse::{BrowseError, PageHandle, PageSource, RawResponse};
use tracing::{debug, instrument};

use crate::html::visible_text;

const USER_AGENT: &str = concat!("tablewatch/", env!("CARGO_PKG_VERSION"));

/// Fetches the booking page over plain HTTP, followed by any configured
/// availability endpoints. No script execution takes place.
pub struct HttpPageSource {
    client: Client,
    endpoints: Vec<String>,
}

impl HttpPageSource {
    pub fn new(endpoints: Vec<String>) -> Result<Self, BrowseError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| BrowseError::Transport(Box::new(err)))?;
        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}

impl PageSource for HttpPageSource {
    #[instrument(skip(self, timeout), fields(endpoints = self.endpoints.len()))]
    fn load_page(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn PageHandle + '_>, BrowseError> {
        let page = fetch(&self.client, url, timeout, "page load")?;
        let text = visible_text(&page.body);
        debug!(bytes = page.body.len(), "booking page loaded");
        Ok(Box::new(HttpPage {
            client: &self.client,
            first: Some(page),
            pending: self.endpoints.iter().cloned().collect(),
            text,
        }))
    }
}

struct HttpPage<'a> {
    client: &'a Client,
    first: Option<RawResponse>,
    pending: VecDeque<String>,
    text: String,
}

impl PageHandle for HttpPage<'_> {
    fn next_response(&mut self, deadline: Instant) -> Result<Option<RawResponse>, BrowseError> {
        if let Some(first) = self.first.take() {
            return Ok(Some(first));
        }
        let Some(url) = self.pending.pop_front() else {
            return Ok(None);
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!(%url, "deadline reached before request");
            return Ok(None);
        }
        fetch(self.client, &url, remaining, "availability request").map(Some)
    }

    fn read_visible_text(&mut self) -> Result<String, BrowseError> {
        Ok(self.text.clone())
    }
}

fn fetch(
    client: &Client,
    url: &str,
    timeout: Duration,
    stage: &'static str,
) -> Result<RawResponse, BrowseError> {
    let classify = |err: reqwest::Error| {
        if err.is_timeout() {
            BrowseError::Timeout {
                stage,
                after: timeout,
            }
        } else {
            BrowseError::Transport(Box::new(err))
        }
    };

    let response = client.get(url).timeout(timeout).send().map_err(classify)?;
    let status = response.status();
    if !status.is_success() {
        return Err(BrowseError::Navigation(format!("{url} returned {status}")));
    }
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let final_url = response.url().to_string();
    let body = response.text().map_err(classify)?;
    debug!(url = %final_url, %content_type, bytes = body.len(), stage, "response captured");
    Ok(RawResponse {
        url: final_url,
        content_type,
        body,
    })
}

/// Fills `{date}` (`YYYY-MM-DD`) and `{party}` placeholders of an endpoint template.
pub fn expand_endpoint(template: &str, date: NaiveDate, party_size: u32) -> String {
    template
        .replace("{date}", &date.format("%Y-%m-%d").to_string())
        .replace("{party}", &party_size.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_placeholders_expand() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(
            expand_endpoint("https://api.test/slots?day={date}&covers={party}", date, 4),
            "https://api.test/slots?day=2024-03-15&covers=4"
        );
        assert_eq!(expand_endpoint("https://api.test/static", date, 4), "https://api.test/static");
    }

    #[test]
    fn expired_deadline_skips_pending_requests() {
        let client = Client::new();
        let mut page = HttpPage {
            client: &client,
            first: None,
            pending: VecDeque::from(["http://127.0.0.1:9/availability".to_string()]),
            text: "Friday".into(),
        };
        let deadline = Instant::now();
        assert!(page.next_response(deadline).unwrap().is_none());
        assert!(page.pending.is_empty());
        assert_eq!(page.read_visible_text().unwrap(), "Friday");
    }

    #[test]
    fn source_keeps_endpoint_order() {
        let source = HttpPageSource::new(vec!["a".into(), "b".into()]).expect("client");
        assert_eq!(source.endpoints(), ["a".to_string(), "b".to_string()]);
    }
}
