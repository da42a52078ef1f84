use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use tablewatch_adapters::http::expand_endpoint;
use tablewatch_domain::{config::CheckConfig, time::TimeWindow};
use tracing::warn;

pub const DEFAULT_LEDGER_PATH: &str = "notified_slots.json";

#[derive(Clone)]
pub enum Delivery {
    DryRun,
    Pushover { token: String, user: String },
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::DryRun => f.write_str("DryRun"),
            Delivery::Pushover { .. } => f.write_str("Pushover { .. }"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) check: CheckConfig,
    pub(crate) ledger_path: PathBuf,
    pub(crate) endpoints: Vec<String>,
    pub(crate) capture_dir: Option<PathBuf>,
    pub(crate) trust_page_text: bool,
    pub(crate) delivery: Delivery,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("missing required setting {key}"));

        let url = required("TABLEWATCH_URL")?;
        let party_size: u32 = required("TABLEWATCH_PARTY_SIZE")?
            .parse()
            .context("TABLEWATCH_PARTY_SIZE must be a whole number")?;
        let date_raw = required("TABLEWATCH_DATE")?;
        let target_date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d")
            .with_context(|| format!("TABLEWATCH_DATE `{date_raw}` is not YYYY-MM-DD"))?;
        let window = TimeWindow::parse(
            &required("TABLEWATCH_WINDOW_START")?,
            &required("TABLEWATCH_WINDOW_END")?,
        )
        .context("invalid reservation window")?;

        let mut check = CheckConfig::new(url, party_size, target_date, window)
            .context("invalid check configuration")?;
        if let Some(secs) = get("TABLEWATCH_PAGE_TIMEOUT_SECS").and_then(|v| parse_secs(&v)) {
            check = check.with_page_load_timeout(secs)?;
        }
        if let Some(secs) = get("TABLEWATCH_OBSERVE_SECS").and_then(|v| parse_secs(&v)) {
            check = check.with_observation_window(secs)?;
        }

        let endpoints = get("TABLEWATCH_API_URLS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(|entry| expand_endpoint(entry, target_date, party_size))
                    .collect()
            })
            .unwrap_or_default();

        let dry_run = get("TABLEWATCH_DRY_RUN").is_some_and(|v| is_truthy(&v));
        let delivery = if dry_run {
            Delivery::DryRun
        } else {
            Delivery::Pushover {
                token: required("PUSHOVER_TOKEN")?,
                user: required("PUSHOVER_USER")?,
            }
        };

        Ok(Self {
            check,
            ledger_path: get("TABLEWATCH_LEDGER")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH)),
            endpoints,
            capture_dir: get("TABLEWATCH_CAPTURE_DIR").map(PathBuf::from),
            trust_page_text: get("TABLEWATCH_TRUST_PAGE_TEXT").is_some_and(|v| is_truthy(&v)),
            delivery,
        })
    }

    pub fn check(&self) -> &CheckConfig {
        &self.check
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self.delivery, Delivery::DryRun)
    }
}

fn parse_secs(raw: &str) -> Option<Duration> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            warn!(value = raw, "ignoring invalid duration setting");
            None
        }
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
