use std::time::Instant;

use anyhow::{Context, Result};
use tablewatch_adapters::{CaptureSource, HttpPageSource, PushoverSink};
use tablewatch_domain::{
    browse::PageSource,
    checker::{RunOutcome, RunReport, SlotStatus},
    ledger::JsonFileStore,
    notifications::{NotificationSink, TracingSink},
    AvailabilityChecker,
};
use tracing::info;

use crate::config::{AppConfig, Delivery};

/// Performs one availability check with the collaborators `config` selects.
pub fn run(config: &AppConfig) -> Result<RunReport> {
    let check = config.check();
    info!(
        url = %check.target_url(),
        date = %check.target_date(),
        window = %check.window(),
        party = check.party_size(),
        dry_run = config.is_dry_run(),
        "starting availability check"
    );
    let start = Instant::now();

    let sink: Box<dyn NotificationSink> = match &config.delivery {
        Delivery::DryRun => Box::new(TracingSink),
        Delivery::Pushover { token, user } => Box::new(
            PushoverSink::new(token.as_str(), user.as_str())
                .context("failed to initialize pushover client")?,
        ),
    };
    let mut source: Box<dyn PageSource> = match &config.capture_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "reading captured observations");
            Box::new(CaptureSource::new(dir))
        }
        None => Box::new(
            HttpPageSource::new(config.endpoints.clone())
                .context("failed to initialize http client")?,
        ),
    };

    let mut checker = AvailabilityChecker::builder(check.clone())
        .with_notification_sink(sink)
        .with_ledger_store(Box::new(JsonFileStore::new(&config.ledger_path)))
        .trust_dated_text(config.trust_page_text)
        .build();
    let report = checker
        .run(source.as_mut())
        .context("availability check failed")?;

    info!(
        elapsed_ms = %start.elapsed().as_millis(),
        attempts = report.attempts,
        "check finished"
    );
    Ok(report)
}

/// Human-readable lines describing how a run ended.
pub fn summary_lines(report: &RunReport, config: &AppConfig) -> Vec<String> {
    let check = config.check();
    let mut lines = Vec::new();
    match report.outcome() {
        RunOutcome::NothingFound => lines.push(format!(
            "No open tables between {} on {}.",
            check.window(),
            check.target_date()
        )),
        RunOutcome::NothingNew => lines.push(format!(
            "{} matching slot(s) on {}, all already notified.",
            report.decisions.len(),
            check.target_date()
        )),
        RunOutcome::Notified(_) | RunOutcome::Undelivered(_) => {}
    }
    for decision in &report.decisions {
        match &decision.status {
            SlotStatus::Notified => lines.push(format!("Notified: {}", decision.key)),
            SlotStatus::AlreadyNotified => {}
            SlotStatus::SendFailed(reason) => {
                lines.push(format!("Send failed for {}: {}", decision.key, reason))
            }
        }
    }
    if report.persist_failures > 0 {
        lines.push(format!(
            "Warning: ledger {} could not be written; {} slot(s) may be notified again.",
            config.ledger_path.display(),
            report.persist_failures
        ));
    }
    lines
}
