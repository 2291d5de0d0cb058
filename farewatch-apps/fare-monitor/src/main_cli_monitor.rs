//!  Farewatch Fare Monitor
//!
//!  Copyright (C) 2026  Mamy Ratsimbazafy
//!
//!  This program is free software: you can redistribute it and/or modify
//!  it under the terms of the GNU Affero General Public License as published by
//!  the Free Software Foundation, either version 3 of the License, or
//!  (at your option) any later version.
//!
//!  This program is distributed in the hope that it will be useful,
//!  but WITHOUT ANY WARRANTY; without even the implied warranty of
//!  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//!  GNU Affero General Public License for more details.
//!
//!  You should have received a copy of the GNU Affero General Public License
//!  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! CLI for a single fare monitoring run, meant to be started by a scheduler.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use farewatch_fare_monitor::config::{
    AMADEUS_PRODUCTION_URL, DEFAULT_TIMEOUT_SECS, TELEGRAM_API_URL,
};
use farewatch_fare_monitor::{
    AmadeusCredentials, AmadeusFlightsClient, AmadeusTokenEndpoint, ConfigurationError,
    ConsoleNotifier, DeliveryStatus, EmptyResultPolicy, FareMonitor, FileTokenCache, MonitorConfig,
    MonitorError, Money, Notifier, SessionManager, TelegramNotifier, TelegramTarget,
    build_http_client, format_failure, missing_env_vars,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "farewatch-monitor")]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Origin airport code (e.g., ICN)
    #[arg(short, long, env = "FAREWATCH_ORIGIN", default_value = "ICN")]
    from: String,

    /// Destination airport code (e.g., HNL, NRT)
    #[arg(short, long, env = "FAREWATCH_DESTINATION", default_value = "HNL")]
    to: String,

    /// Departure date (YYYY-MM-DD or YYYY/MM/DD)
    #[arg(short, long, env = "FAREWATCH_DEPARTURE_DATE")]
    date: String,

    /// Return date (YYYY-MM-DD or YYYY/MM/DD)
    #[arg(short = 'R', long, env = "FAREWATCH_RETURN_DATE")]
    return_date: Option<String>,

    /// Number of passengers (adults)
    #[arg(short, long, env = "FAREWATCH_ADULTS", default_value = "2")]
    passengers: u32,

    /// Price ceiling for the total of all passengers (e.g., 1500000 or 1,234.50)
    #[arg(short = 'm', long, env = "FAREWATCH_MAX_PRICE", default_value = "1500000")]
    max_price: String,

    /// Currency of the search and the price ceiling
    #[arg(short, long, env = "FAREWATCH_CURRENCY", default_value = "KRW")]
    currency: String,

    /// Keep offers with connections (default: direct flights only)
    #[arg(long, env = "FAREWATCH_ALLOW_CONNECTIONS")]
    allow_connections: bool,

    /// Maximum number of offers requested from the provider (1-250)
    #[arg(long, env = "FAREWATCH_MAX_RESULTS", default_value = "50")]
    max_results: u32,

    /// What to do when nothing matches: silent, notify
    #[arg(long, env = "FAREWATCH_ON_EMPTY", default_value = "silent")]
    on_empty: String,

    /// Timeout in seconds for each network call (1-60)
    #[arg(long, env = "FAREWATCH_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Search provider base URL (use https://test.api.amadeus.com for the test environment)
    #[arg(long, env = "FAREWATCH_BASE_URL", default_value = AMADEUS_PRODUCTION_URL)]
    base_url: String,

    /// Telegram Bot API base URL
    #[arg(long, env = "FAREWATCH_TELEGRAM_API_URL", default_value = TELEGRAM_API_URL, hide = true)]
    telegram_api_url: String,

    /// Persist the access token across runs in this file
    #[arg(long, env = "FAREWATCH_TOKEN_CACHE")]
    token_cache: Option<PathBuf>,

    /// Print the message instead of sending it
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verify secrets, authenticate and send a test message, without searching
    #[arg(long)]
    check: bool,

    /// Send an alert to the chat when the run fails
    #[arg(long, env = "FAREWATCH_NOTIFY_ON_ERROR")]
    notify_on_error: bool,

    /// Verbose output
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

/// Configure logging on stderr; stdout is reserved for dry-run and JSON output.
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Parse date string to NaiveDate
fn parse_date(field: &'static str, s: &str) -> Result<NaiveDate, ConfigurationError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y/%m/%d"))
        .map_err(|_| ConfigurationError::InvalidValue {
            field,
            reason: format!("'{}' (use YYYY-MM-DD or YYYY/MM/DD)", s),
        })
}

fn build_config(args: &CliArgs) -> Result<MonitorConfig, ConfigurationError> {
    let departure = parse_date("date", &args.date)?;
    let return_date = args
        .return_date
        .as_deref()
        .map(|d| parse_date("return-date", d))
        .transpose()?
        .ok_or(ConfigurationError::MissingReturnDate)?;

    let currency = args.currency.trim().to_ascii_uppercase();
    let max_price = Money::parse(&args.max_price, &currency)
        .map_err(|e| ConfigurationError::InvalidPrice(format!("{}: {}", args.max_price, e)))?;
    let policy: EmptyResultPolicy = args.on_empty.parse()?;

    MonitorConfig::new(&args.from, &args.to, departure, return_date, max_price)
        .with_adults(args.passengers)
        .with_direct_only(!args.allow_connections)
        .with_empty_result_policy(policy)
        .with_max_results(args.max_results)
        .with_base_url(&args.base_url)
        .with_timeout_secs(args.timeout)
}

async fn run(args: &CliArgs) -> Result<ExitCode> {
    let config = build_config(args).map_err(MonitorError::from)?;

    let missing = missing_env_vars(|key| std::env::var(key).ok(), args.dry_run);
    if !missing.is_empty() {
        return Err(MonitorError::from(ConfigurationError::MissingEnv(missing)).into());
    }
    let credentials = AmadeusCredentials::from_env().map_err(MonitorError::from)?;

    let client = build_http_client(config.request_timeout).map_err(MonitorError::from)?;
    let endpoint = Arc::new(AmadeusTokenEndpoint::new(
        client.clone(),
        &config.amadeus_base_url,
        credentials,
    ));
    let mut session = SessionManager::new(endpoint);
    if let Some(path) = &args.token_cache {
        tracing::debug!("Using token cache at {}", path.display());
        session = session.with_cache(Arc::new(FileTokenCache::new(path)));
    }

    let source = Arc::new(AmadeusFlightsClient::new(
        client.clone(),
        &config.amadeus_base_url,
    ));
    let notifier: Arc<dyn Notifier> = if args.dry_run {
        tracing::info!("Dry run: the message will be printed, not sent");
        Arc::new(ConsoleNotifier)
    } else {
        let target = TelegramTarget::from_env().map_err(MonitorError::from)?;
        Arc::new(TelegramNotifier::new(client, &args.telegram_api_url, target))
    };

    let monitor = FareMonitor::new(config, Arc::new(session), source, notifier);

    if args.check {
        return match monitor.self_check().await? {
            DeliveryStatus::Failed { error } => {
                anyhow::bail!("Check failed: test message not delivered: {}", error)
            }
            _ => {
                tracing::info!("✅ Check passed");
                Ok(ExitCode::SUCCESS)
            }
        };
    }

    let report = monitor.run().await?;

    if args.json {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize run report")?;
        println!("{}", json);
    }

    Ok(ExitCode::SUCCESS)
}

/// Best effort: a failed alert is only logged.
async fn send_failure_alert(err: &anyhow::Error, args: &CliArgs) {
    let target = match TelegramTarget::from_env() {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!("Cannot send failure alert: {}", e);
            return;
        }
    };
    let client = match build_http_client(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS)) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Cannot send failure alert: {}", e);
            return;
        }
    };

    let notifier = TelegramNotifier::new(client, &args.telegram_api_url, target);
    let detail = format!("{:#}", err);
    if let Err(e) = notifier.send(&format_failure(&detail)).await {
        tracing::warn!("Failure alert not delivered: {}", e);
    }
}

/// Exit status for a failed run; 1 for anything outside the known classes.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| {
            e.downcast_ref::<MonitorError>()
                .map(MonitorError::exit_code)
                .or_else(|| e.downcast_ref::<ConfigurationError>().map(|_| 2))
        })
        .unwrap_or(1)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before clap reads its environment fallbacks.
    let dotenv = dotenvy::dotenv();
    let args = CliArgs::parse();
    setup_logging(args.verbose);

    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
    }

    tracing::info!("Starting farewatch-monitor");
    tracing::debug!("Args: {:?}", args);

    match run(&args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("Run failed: {:#}", err);
            if args.notify_on_error && !args.dry_run {
                send_failure_alert(&err, &args).await;
            }
            ExitCode::from(exit_code_for(&err))
        }
    }
}
