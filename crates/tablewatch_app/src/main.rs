use std::process::ExitCode;

use tablewatch_app::{
    app::{run, summary_lines},
    config::AppConfig,
};

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(report) => {
            for line in summary_lines(&report, &config) {
                println!("{line}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(err = %format!("{err:#}"), "run aborted");
            eprintln!("Tablewatch run failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
