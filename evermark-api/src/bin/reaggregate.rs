//! One-shot re-aggregation.
//!
//! Rebuilds the leaderboard snapshot of each season given on the command
//! line, or of the current season when none is given. Runs through the same
//! reconciler as the server, so a live run for the same season is reported
//! as a conflict instead of racing it.
//!
//! Usage:
//!   reaggregate [SEASON...]

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use evermark_api::telemetry::{init_tracer, TelemetryConfig};
use evermark_api::{
    reconcile_config_from_env, season_config_from_env, ApiConfig, ApiError, ApiResult, DbClient,
    DbConfig, LeaderboardReconciler, RunTrigger,
};
use evermark_core::{SeasonNumber, SeasonOracle};

fn parse_seasons(args: impl Iterator<Item = String>) -> ApiResult<Vec<SeasonNumber>> {
    args.map(|arg| match arg.parse::<SeasonNumber>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ApiError::invalid_input(format!("Invalid season number: {}", arg))),
    })
    .collect()
}

async fn run() -> ApiResult<bool> {
    let api_config = ApiConfig::from_env();
    let oracle = SeasonOracle::new(season_config_from_env(api_config.is_production())?)?;

    let mut seasons = parse_seasons(std::env::args().skip(1))?;
    if seasons.is_empty() {
        seasons.push(oracle.current_season(Utc::now())?.number);
    }

    let db = DbClient::from_config(&DbConfig::from_env())?;
    db.migrate().await?;
    let reconciler = LeaderboardReconciler::from_backend(Arc::new(db), reconcile_config_from_env()?)?;

    let mut all_ok = true;
    for season in seasons {
        match reconciler.run(season, RunTrigger::Cli).await {
            Ok(report) => {
                println!(
                    "season {}: {} entries, {} votes read, {} self-votes excluded, {} dangling, digest {}",
                    report.season,
                    report.entries_written,
                    report.votes_read,
                    report.self_votes_excluded,
                    report.dangling_references,
                    report.digest,
                );
            }
            Err(e) => {
                eprintln!("season {}: {}", season, e);
                all_ok = false;
            }
        }
    }
    Ok(all_ok)
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracer(&TelemetryConfig::default()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("reaggregate: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seasons() {
        let args = ["3", "7"].into_iter().map(String::from);
        assert_eq!(parse_seasons(args).unwrap(), vec![3, 7]);
        assert!(parse_seasons(["0"].into_iter().map(String::from)).is_err());
        assert!(parse_seasons(["week"].into_iter().map(String::from)).is_err());
    }
}
