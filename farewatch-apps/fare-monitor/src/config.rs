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

//! # Run Configuration
//!
//! One immutable configuration value is built at start-up and shared by
//! reference with every component. Secrets only ever come from the
//! environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ConfigurationError;
use crate::money::Money;

pub const AMADEUS_PRODUCTION_URL: &str = "https://api.amadeus.com";
pub const AMADEUS_TEST_URL: &str = "https://test.api.amadeus.com";
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
pub const MAX_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RESULTS: u32 = 50;

pub const ENV_AMADEUS_API_KEY: &str = "AMADEUS_API_KEY";
pub const ENV_AMADEUS_API_SECRET: &str = "AMADEUS_API_SECRET";
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

/// What to do when a run finds no matching offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyResultPolicy {
    /// Exit without sending anything.
    #[default]
    Silent,
    /// Send a short "no flights found" notice.
    Notify,
}

impl FromStr for EmptyResultPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silent" | "quiet" | "none" => Ok(Self::Silent),
            "notify" | "notice" => Ok(Self::Notify),
            _ => Err(ConfigurationError::InvalidValue {
                field: "on-empty",
                reason: format!("'{}' (use: silent, notify)", s),
            }),
        }
    }
}

impl fmt::Display for EmptyResultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => f.write_str("silent"),
            Self::Notify => f.write_str("notify"),
        }
    }
}

/// Fixed monitoring parameters for one run.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub adults: u32,
    pub currency: String,
    pub max_price: Money,
    pub direct_only: bool,
    pub max_results: u32,
    pub empty_result_policy: EmptyResultPolicy,
    pub request_timeout: Duration,
    pub amadeus_base_url: String,
}

impl MonitorConfig {
    /// Route and price defaults; dates must always be supplied.
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        departure_date: NaiveDate,
        return_date: NaiveDate,
        max_price: Money,
    ) -> Self {
        let currency = max_price.currency.clone();
        Self {
            origin: origin.into(),
            destination: destination.into(),
            departure_date,
            return_date: Some(return_date),
            adults: 1,
            currency,
            max_price,
            direct_only: true,
            max_results: DEFAULT_MAX_RESULTS,
            empty_result_policy: EmptyResultPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            amadeus_base_url: AMADEUS_PRODUCTION_URL.to_string(),
        }
    }

    pub fn with_adults(mut self, adults: u32) -> Self {
        self.adults = adults;
        self
    }

    pub fn with_direct_only(mut self, direct_only: bool) -> Self {
        self.direct_only = direct_only;
        self
    }

    pub fn with_empty_result_policy(mut self, policy: EmptyResultPolicy) -> Self {
        self.empty_result_policy = policy;
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Result<Self, ConfigurationError> {
        self.request_timeout = validate_timeout(secs)?;
        Ok(self)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.amadeus_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

pub fn validate_timeout(secs: u64) -> Result<Duration, ConfigurationError> {
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        return Err(ConfigurationError::InvalidTimeout(secs));
    }
    Ok(Duration::from_secs(secs))
}

/// Client credentials for the flight search provider.
#[derive(Clone)]
pub struct AmadeusCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for AmadeusCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmadeusCredentials")
            .field("client_id", &mask(&self.client_id))
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl AmadeusCredentials {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigurationError> {
        let [client_id, client_secret] =
            require_all(&lookup, [ENV_AMADEUS_API_KEY, ENV_AMADEUS_API_SECRET])?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }
}

/// Bot token and destination chat for notifications.
#[derive(Clone)]
pub struct TelegramTarget {
    pub bot_token: String,
    pub chat_id: String,
}

impl fmt::Debug for TelegramTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramTarget")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl TelegramTarget {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigurationError> {
        let [bot_token, chat_id] =
            require_all(&lookup, [ENV_TELEGRAM_BOT_TOKEN, ENV_TELEGRAM_CHAT_ID])?;
        Ok(Self { bot_token, chat_id })
    }
}

/// Names of the required secrets that are unset or blank.
pub fn missing_env_vars(lookup: impl Fn(&str) -> Option<String>, dry_run: bool) -> Vec<String> {
    let mut required = vec![ENV_AMADEUS_API_KEY, ENV_AMADEUS_API_SECRET];
    if !dry_run {
        required.extend([ENV_TELEGRAM_BOT_TOKEN, ENV_TELEGRAM_CHAT_ID]);
    }
    required
        .into_iter()
        .filter(|key| lookup(key).is_none_or(|v| v.trim().is_empty()))
        .map(str::to_string)
        .collect()
}

fn require_all<const N: usize>(
    lookup: &impl Fn(&str) -> Option<String>,
    keys: [&'static str; N],
) -> Result<[String; N], ConfigurationError> {
    let values = keys.map(|key| lookup(key).filter(|v| !v.trim().is_empty()));
    let missing: Vec<String> = keys
        .iter()
        .zip(values.iter())
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| k.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ConfigurationError::MissingEnv(missing));
    }
    Ok(values.map(|v| v.unwrap_or_default()))
}

fn mask(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    format!("{}…", visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_policy_parsing() {
        assert_eq!("silent".parse::<EmptyResultPolicy>().unwrap(), EmptyResultPolicy::Silent);
        assert_eq!("NOTIFY".parse::<EmptyResultPolicy>().unwrap(), EmptyResultPolicy::Notify);
        assert!("sometimes".parse::<EmptyResultPolicy>().is_err());
        assert_eq!(EmptyResultPolicy::default(), EmptyResultPolicy::Silent);
    }

    #[test]
    fn test_credentials_report_all_missing() {
        let err = AmadeusCredentials::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingEnv(vec![
                ENV_AMADEUS_API_KEY.to_string(),
                ENV_AMADEUS_API_SECRET.to_string()
            ])
        );
    }

    #[test]
    fn test_blank_secret_counts_as_missing() {
        let lookup = lookup_from(&[(ENV_TELEGRAM_BOT_TOKEN, "  "), (ENV_TELEGRAM_CHAT_ID, "42")]);
        let err = TelegramTarget::from_lookup(lookup).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingEnv(vec![ENV_TELEGRAM_BOT_TOKEN.to_string()])
        );
    }

    #[test]
    fn test_missing_env_vars_dry_run_skips_telegram() {
        let lookup = lookup_from(&[(ENV_AMADEUS_API_KEY, "k"), (ENV_AMADEUS_API_SECRET, "s")]);
        assert!(missing_env_vars(&lookup, true).is_empty());
        assert_eq!(
            missing_env_vars(&lookup, false),
            vec![ENV_TELEGRAM_BOT_TOKEN.to_string(), ENV_TELEGRAM_CHAT_ID.to_string()]
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = AmadeusCredentials {
            client_id: "abcdefgh".into(),
            client_secret: "topsecret".into(),
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("abcdefgh"));
    }

    #[test]
    fn test_timeout_bounds() {
        assert!(validate_timeout(0).is_err());
        assert!(validate_timeout(61).is_err());
        assert_eq!(validate_timeout(20).unwrap(), Duration::from_secs(20));
    }
}
