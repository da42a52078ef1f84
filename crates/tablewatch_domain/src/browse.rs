use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payload::PayloadTree;

#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// One network response as handed over by the page collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    pub url: String,
    pub content_type: String,
    pub body: String,
}

/// Opens booking pages. Implementations hide all site-specific navigation.
pub trait PageSource {
    fn load_page(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn PageHandle + '_>, BrowseError>;
}

/// A loaded page that streams the responses it triggers.
pub trait PageHandle {
    /// Next captured response. `Ok(None)` means the page has nothing more to
    /// deliver; implementations must return no later than `deadline`.
    fn next_response(&mut self, deadline: Instant) -> Result<Option<RawResponse>, BrowseError>;

    fn read_visible_text(&mut self) -> Result<String, BrowseError>;
}

const URL_HINTS: &[&str] = &["availab", "slot", "reserv", "book", "time", "calendar"];

/// Decides which captured responses are worth buffering.
#[derive(Debug, Clone, Default)]
pub struct ResponseFilter;

impl ResponseFilter {
    pub fn accepts(&self, response: &RawResponse) -> bool {
        if response.content_type.to_ascii_lowercase().contains("json") {
            return true;
        }
        let url = response.url.to_ascii_lowercase();
        URL_HINTS.iter().any(|hint| url.contains(hint))
    }
}

/// One buffered unit of evidence collected during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Json { url: String, tree: PayloadTree },
    Text(String),
}

impl Observation {
    /// Parses a response body as JSON. Bodies that are not JSON yield `None`.
    pub fn from_response(response: &RawResponse) -> Option<Self> {
        match PayloadTree::parse_json(&response.body) {
            Ok(tree) => Some(Observation::Json {
                url: response.url.clone(),
                tree,
            }),
            Err(err) => {
                tracing::debug!(url = %response.url, %err, "dropping non-JSON response");
                None
            }
        }
    }
}

/// Replays a fixed set of responses and page text, ignoring the URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySource {
    responses: Vec<RawResponse>,
    visible_text: String,
}

impl ReplaySource {
    pub fn new(responses: Vec<RawResponse>, visible_text: impl Into<String>) -> Self {
        Self {
            responses,
            visible_text: visible_text.into(),
        }
    }

    /// A source serving each body as an `application/json` response.
    pub fn json_bodies<I, S>(bodies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let responses = bodies
            .into_iter()
            .enumerate()
            .map(|(idx, body)| RawResponse {
                url: format!("replay://response/{idx}"),
                content_type: "application/json".to_string(),
                body: body.into(),
            })
            .collect();
        Self::new(responses, String::new())
    }

    pub fn responses(&self) -> &[RawResponse] {
        &self.responses
    }

    pub fn visible_text(&self) -> &str {
        &self.visible_text
    }
}

impl PageSource for ReplaySource {
    fn load_page(
        &mut self,
        url: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn PageHandle + '_>, BrowseError> {
        tracing::debug!(url, responses = self.responses.len(), "replaying captured page");
        Ok(Box::new(ReplayPage {
            pending: self.responses.iter().cloned().collect(),
            visible_text: self.visible_text.clone(),
        }))
    }
}

struct ReplayPage {
    pending: VecDeque<RawResponse>,
    visible_text: String,
}

impl PageHandle for ReplayPage {
    fn next_response(&mut self, _deadline: Instant) -> Result<Option<RawResponse>, BrowseError> {
        Ok(self.pending.pop_front())
    }

    fn read_visible_text(&mut self) -> Result<String, BrowseError> {
        Ok(self.visible_text.clone())
    }
}
