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

//! # Flights Query Builder
//!
//! Side-effect free construction and validation of the flight offers query.
//! Every check here runs before any network call so a bad configuration never
//! spends API quota.

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::MonitorConfig;
use crate::error::ConfigurationError;
use crate::money::Money;

/// Upper bound the provider accepts for `max`.
pub const MAX_RESULTS_LIMIT: u32 = 250;

pub const FLIGHT_OFFERS_PATH: &str = "/v2/shopping/flight-offers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: NaiveDate,
    pub adults: u32,
    pub currency: String,
    pub non_stop: bool,
    pub max_results: u32,
    pub max_price: Money,
}

impl SearchQuery {
    fn validate(&self) -> Result<(), ConfigurationError> {
        validate_airport(&self.origin)?;
        validate_airport(&self.destination)?;
        if self.origin == self.destination {
            return Err(ConfigurationError::SameOriginAndDestination(
                self.origin.clone(),
            ));
        }

        if self.departure_date >= self.return_date {
            return Err(ConfigurationError::DateOrder {
                departure: self.departure_date,
                return_date: self.return_date,
            });
        }

        if self.adults < 1 {
            return Err(ConfigurationError::NoPassengers);
        }

        if self.currency.len() != 3 || !self.currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ConfigurationError::InvalidCurrency(self.currency.clone()));
        }

        if !self.max_price.is_positive() {
            return Err(ConfigurationError::NonPositiveMaxPrice);
        }
        if self.max_price.currency != self.currency {
            return Err(ConfigurationError::PriceCurrencyMismatch {
                price: self.max_price.currency.clone(),
                query: self.currency.clone(),
            });
        }

        if self.max_results == 0 || self.max_results > MAX_RESULTS_LIMIT {
            return Err(ConfigurationError::MaxResultsOutOfRange {
                got: self.max_results,
                limit: MAX_RESULTS_LIMIT,
            });
        }

        Ok(())
    }

    /// Query string parameters in a stable order.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("originLocationCode", self.origin.clone()),
            ("destinationLocationCode", self.destination.clone()),
            ("departureDate", self.departure_date.format("%Y-%m-%d").to_string()),
            ("returnDate", self.return_date.format("%Y-%m-%d").to_string()),
            ("adults", self.adults.to_string()),
            ("nonStop", self.non_stop.to_string()),
            ("currencyCode", self.currency.clone()),
            ("max", self.max_results.to_string()),
        ]
    }

    pub fn get_search_url(&self, base_url: &str) -> String {
        let query = self
            .to_query_pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!(
            "{}{}?{}",
            base_url.trim_end_matches('/'),
            FLIGHT_OFFERS_PATH,
            query
        )
    }

    pub fn route_label(&self) -> String {
        format!("{} → {}", self.origin, self.destination)
    }

    pub fn builder(
        origin: impl Into<String>,
        destination: impl Into<String>,
        departure_date: NaiveDate,
    ) -> SearchQueryBuilder {
        SearchQueryBuilder {
            origin: origin.into(),
            destination: destination.into(),
            departure_date,
            return_date: None,
            adults: 1,
            currency: None,
            non_stop: true,
            max_results: crate::config::DEFAULT_MAX_RESULTS,
            max_price: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchQueryBuilder {
    origin: String,
    destination: String,
    departure_date: NaiveDate,
    return_date: Option<NaiveDate>,
    adults: u32,
    currency: Option<String>,
    non_stop: bool,
    max_results: u32,
    max_price: Option<Money>,
}

impl SearchQueryBuilder {
    pub fn return_date(mut self, return_date: NaiveDate) -> Self {
        self.return_date = Some(return_date);
        self
    }

    pub fn adults(mut self, adults: u32) -> Self {
        self.adults = adults;
        self
    }

    /// Defaults to the currency of the max price.
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn non_stop(mut self, non_stop: bool) -> Self {
        self.non_stop = non_stop;
        self
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn max_price(mut self, max_price: Money) -> Self {
        self.max_price = Some(max_price);
        self
    }

    pub fn build(self) -> Result<SearchQuery, ConfigurationError> {
        let return_date = self.return_date.ok_or(ConfigurationError::MissingReturnDate)?;
        let max_price = self.max_price.ok_or(ConfigurationError::NonPositiveMaxPrice)?;
        let currency = self
            .currency
            .unwrap_or_else(|| max_price.currency.clone())
            .trim()
            .to_ascii_uppercase();

        let query = SearchQuery {
            origin: self.origin.trim().to_ascii_uppercase(),
            destination: self.destination.trim().to_ascii_uppercase(),
            departure_date: self.departure_date,
            return_date,
            adults: self.adults,
            currency,
            non_stop: self.non_stop,
            max_results: self.max_results,
            max_price,
        };
        query.validate()?;
        Ok(query)
    }
}

/// Turn the run configuration into a validated query.
pub fn build_query(config: &MonitorConfig) -> Result<SearchQuery, ConfigurationError> {
    let mut builder = SearchQuery::builder(
        config.origin.as_str(),
        config.destination.as_str(),
        config.departure_date,
    )
    .adults(config.adults)
    .currency(config.currency.as_str())
    .non_stop(config.direct_only)
    .max_results(config.max_results)
    .max_price(config.max_price.clone());

    if let Some(return_date) = config.return_date {
        builder = builder.return_date(return_date);
    }

    builder.build()
}

fn validate_airport(code: &str) -> Result<(), ConfigurationError> {
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidAirport(code.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn base_builder() -> SearchQueryBuilder {
        SearchQuery::builder("icn", "NRT", date(2026, 10, 4))
            .return_date(date(2026, 10, 8))
            .adults(2)
            .max_price(Money::from_units(1_500_000, "KRW"))
    }

    #[test]
    fn test_build_normalizes_codes() {
        let query = base_builder().build().unwrap();
        assert_eq!(query.origin, "ICN");
        assert_eq!(query.currency, "KRW");
        assert!(query.non_stop);
    }

    #[test]
    fn test_query_pairs_order() {
        let query = base_builder().max_results(10).build().unwrap();
        let keys: Vec<&str> = query.to_query_pairs().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec![
                "originLocationCode",
                "destinationLocationCode",
                "departureDate",
                "returnDate",
                "adults",
                "nonStop",
                "currencyCode",
                "max"
            ]
        );
    }

    #[test]
    fn test_get_search_url() {
        let query = base_builder().build().unwrap();
        let url = query.get_search_url("https://test.api.amadeus.com/");
        assert!(url.starts_with("https://test.api.amadeus.com/v2/shopping/flight-offers?"));
        assert!(url.contains("originLocationCode=ICN"));
        assert!(url.contains("returnDate=2026-10-08"));
        assert!(url.contains("adults=2"));
        assert!(url.contains("nonStop=true"));
    }

    #[test]
    fn test_date_order_rejected() {
        let err = base_builder().return_date(date(2026, 10, 4)).build().unwrap_err();
        assert!(matches!(err, ConfigurationError::DateOrder { .. }));
    }

    #[test]
    fn test_zero_passengers_rejected() {
        let err = base_builder().adults(0).build().unwrap_err();
        assert_eq!(err, ConfigurationError::NoPassengers);
    }

    #[test]
    fn test_zero_price_rejected() {
        let err = base_builder()
            .max_price(Money::from_units(0, "KRW"))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::NonPositiveMaxPrice);
    }

    #[test]
    fn test_bad_airport_and_currency_rejected() {
        let err = SearchQuery::builder("IC1", "NRT", date(2026, 10, 4))
            .return_date(date(2026, 10, 8))
            .max_price(Money::from_units(1, "KRW"))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::InvalidAirport("IC1".into()));

        let err = base_builder().currency("USD").build().unwrap_err();
        assert!(matches!(err, ConfigurationError::PriceCurrencyMismatch { .. }));

        let err = SearchQuery::builder("NRT", "nrt", date(2026, 10, 4))
            .return_date(date(2026, 10, 8))
            .max_price(Money::from_units(1, "KRW"))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::SameOriginAndDestination("NRT".into()));
    }

    #[test]
    fn test_max_results_bounds() {
        assert!(base_builder().max_results(0).build().is_err());
        assert!(base_builder().max_results(251).build().is_err());
        assert!(base_builder().max_results(250).build().is_ok());
    }

    #[test]
    fn test_missing_return_date() {
        let err = SearchQuery::builder("ICN", "NRT", date(2026, 10, 4))
            .max_price(Money::from_units(1, "KRW"))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::MissingReturnDate);
    }
}
