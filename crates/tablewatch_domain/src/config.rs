use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use crate::time::TimeWindow;

pub const DEFAULT_PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_OBSERVATION_WINDOW: Duration = Duration::from_secs(15);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target url is empty")]
    EmptyUrl,
    #[error("party size must be at least 1")]
    EmptyParty,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Everything one run needs to know, fixed for its whole duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckConfig {
    target_url: String,
    party_size: u32,
    target_date: NaiveDate,
    window: TimeWindow,
    page_load_timeout: Duration,
    observation_window: Duration,
}

impl CheckConfig {
    pub fn new(
        target_url: impl Into<String>,
        party_size: u32,
        target_date: NaiveDate,
        window: TimeWindow,
    ) -> Result<Self, ConfigError> {
        let target_url = target_url.into();
        if target_url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        if party_size == 0 {
            return Err(ConfigError::EmptyParty);
        }
        Ok(Self {
            target_url,
            party_size,
            target_date,
            window,
            page_load_timeout: DEFAULT_PAGE_LOAD_TIMEOUT,
            observation_window: DEFAULT_OBSERVATION_WINDOW,
        })
    }

    pub fn with_page_load_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("page load timeout"));
        }
        self.page_load_timeout = timeout;
        Ok(self)
    }

    pub fn with_observation_window(mut self, window: Duration) -> Result<Self, ConfigError> {
        if window.is_zero() {
            return Err(ConfigError::ZeroDuration("observation window"));
        }
        self.observation_window = window;
        Ok(self)
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn party_size(&self) -> u32 {
        self.party_size
    }

    pub fn target_date(&self) -> NaiveDate {
        self.target_date
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn page_load_timeout(&self) -> Duration {
        self.page_load_timeout
    }

    pub fn observation_window(&self) -> Duration {
        self.observation_window
    }
}
