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

//! # Error Taxonomy
//!
//! Fatal errors abort the run before a result exists. Warnings and delivery
//! failures are recovered locally and never discard a computed result.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// Invalid static parameters. Always raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("missing required environment variable(s): {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    #[error("invalid airport code '{0}': expected 3 letters")]
    InvalidAirport(String),

    #[error("origin and destination are both {0}")]
    SameOriginAndDestination(String),

    #[error("departure date {departure} must be before return date {return_date}")]
    DateOrder {
        departure: NaiveDate,
        return_date: NaiveDate,
    },

    #[error("a return date is required for a round-trip search")]
    MissingReturnDate,

    #[error("passenger count must be at least 1")]
    NoPassengers,

    #[error("max price must be greater than zero")]
    NonPositiveMaxPrice,

    #[error("max price is in {price} but searches are priced in {query}")]
    PriceCurrencyMismatch { price: String, query: String },

    #[error("invalid price '{0}'")]
    InvalidPrice(String),

    #[error("invalid currency code '{0}': expected 3 letters")]
    InvalidCurrency(String),

    #[error("max results must be between 1 and {limit}, got {got}")]
    MaxResultsOutOfRange { got: u32, limit: u32 },

    #[error("request timeout must be between 1 and 60 seconds, got {0}")]
    InvalidTimeout(u64),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Credential exchange with the search provider failed.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("token request failed: {0}")]
    Transport(String),

    #[error("token endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed token response: {0}")]
    MalformedPayload(String),
}

/// The search call itself failed. No partial results survive this.
#[derive(Debug, Error)]
pub enum SearchRequestError {
    #[error("search request failed: {0}")]
    Transport(String),

    #[error("rate limited by the search provider")]
    RateLimited,

    #[error("search provider rejected the access token")]
    Unauthorized,

    #[error("search rejected with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unreadable search response: {0}")]
    MalformedResponse(String),
}

/// A single offer entry could not be normalized and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("offer #{index} ({offer_id}) skipped: {reason}")]
pub struct NormalizationWarning {
    pub index: usize,
    pub offer_id: String,
    pub reason: String,
}

/// Every entry in a non-empty response was unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("none of the {total} offers returned could be normalized")]
    NoUsableOffers { total: usize },
}

/// The computed message could not be delivered.
#[derive(Debug, Error)]
pub enum NotificationDeliveryError {
    #[error("delivery request failed: {0}")]
    Transport(String),

    #[error("messaging endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("messaging endpoint rejected the message: {0}")]
    Rejected(String),

    #[error("failed to write message: {0}")]
    Output(String),
}

/// Anything that prevents a trustworthy result from being produced.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    #[error("search request error: {0}")]
    Search(#[from] SearchRequestError),

    #[error("normalization error: {0}")]
    Normalization(#[from] NormalizationError),
}

impl MonitorError {
    /// Process exit status, distinct per failure class. `0` stays reserved
    /// for completed runs, with or without matches.
    pub fn exit_code(&self) -> u8 {
        match self {
            MonitorError::Configuration(_) => 2,
            MonitorError::Authentication(_) => 3,
            MonitorError::Search(_) => 4,
            MonitorError::Normalization(_) => 5,
        }
    }
}

/// Keep provider error bodies short enough for a log line.
pub(crate) fn body_preview(body: &str) -> String {
    body.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            MonitorError::from(ConfigurationError::NoPassengers),
            MonitorError::from(AuthenticationError::MalformedPayload("x".into())),
            MonitorError::from(SearchRequestError::RateLimited),
            MonitorError::from(NormalizationError::NoUsableOffers { total: 3 }),
        ];
        let mut codes: Vec<u8> = errors.iter().map(|e| e.exit_code()).collect();
        codes.dedup();
        assert_eq!(codes, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_missing_env_lists_every_variable() {
        let err = ConfigurationError::MissingEnv(vec!["A".into(), "B".into()]);
        assert_eq!(
            err.to_string(),
            "missing required environment variable(s): A, B"
        );
    }
}
