use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tablewatch_domain::notifications::{Ack, NotificationRequest, NotificationSink, SendError};
use tracing::{debug, instrument};

pub const PUSHOVER_ENDPOINT: &str = "https://api.pushover.net/1/messages.json";
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct PushoverReply {
    status: i64,
    #[serde(default)]
    request: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

/// Delivers notifications through the Pushover message API.
pub struct PushoverSink {
    client: Client,
    endpoint: String,
    token: String,
    user: String,
}

impl PushoverSink {
    pub fn new(token: impl Into<String>, user: impl Into<String>) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|err| SendError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: PUSHOVER_ENDPOINT.to_string(),
            token: token.into(),
            user: user.into(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn form(&self, request: &NotificationRequest) -> Vec<(&'static str, String)> {
        vec![
            ("token", self.token.clone()),
            ("user", self.user.clone()),
            ("title", request.title.clone()),
            ("message", request.message.clone()),
            ("priority", request.priority.to_string()),
        ]
    }
}

impl NotificationSink for PushoverSink {
    #[instrument(skip_all, fields(title = %request.title))]
    fn send(&self, request: &NotificationRequest) -> Result<Ack, SendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&self.form(request))
            .send()
            .map_err(|err| SendError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| SendError::Transport(err.to_string()))?;
        debug!(status, "pushover replied");
        interpret_reply(status, &body)
    }
}

fn interpret_reply(status: u16, body: &str) -> Result<Ack, SendError> {
    let reply: PushoverReply = serde_json::from_str(body).map_err(|err| SendError::Rejected {
        status,
        detail: format!("unreadable reply: {err}"),
    })?;
    if !(200..300).contains(&status) || reply.status != 1 {
        let detail = if reply.errors.is_empty() {
            format!("status {}", reply.status)
        } else {
            reply.errors.join("; ")
        };
        return Err(SendError::Rejected { status, detail });
    }
    Ok(Ack { id: reply.request })
}
