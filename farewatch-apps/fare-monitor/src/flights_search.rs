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

//! # Amadeus Flight Offers Client
//!
//! Effectful (network) operations for the flight offers search.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::amadeus_session::Credential;
use crate::error::{ConfigurationError, SearchRequestError, body_preview};
use crate::flights_query_builder::SearchQuery;
use crate::flights_results_parser::RawSearchResponse;

/// Build the shared HTTP client. Every exchange of a run goes through it, so
/// its timeouts bound every wait point.
pub fn build_http_client(timeout: Duration) -> Result<Arc<wreq::Client>, ConfigurationError> {
    let client = wreq::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;
    Ok(Arc::new(client))
}

/// Source of raw flight offers for a query.
#[async_trait]
pub trait OfferSource: Send + Sync {
    async fn fetch_offers(
        &self,
        query: &SearchQuery,
        credential: &Credential,
    ) -> Result<RawSearchResponse, SearchRequestError>;
}

/// Map the search endpoint's status to an error, if any.
pub fn classify_search_status(status: u16, body: &str) -> Result<(), SearchRequestError> {
    match status {
        200..=299 => Ok(()),
        401 => Err(SearchRequestError::Unauthorized),
        429 => Err(SearchRequestError::RateLimited),
        _ => Err(SearchRequestError::Status {
            status,
            body: body_preview(body),
        }),
    }
}

#[derive(Clone)]
pub struct AmadeusFlightsClient {
    client: Arc<wreq::Client>,
    base_url: String,
}

impl AmadeusFlightsClient {
    pub fn new(client: Arc<wreq::Client>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch_raw(
        &self,
        url: &str,
        credential: &Credential,
    ) -> Result<String, SearchRequestError> {
        let http_start = std::time::Instant::now();
        tracing::trace!("[fetch_raw] Starting HTTP request to: {}", url);

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", credential.token()))
            .header("Accept", "application/vnd.amadeus+json, application/json")
            .send()
            .await
            .map_err(|e| SearchRequestError::Transport(e.to_string()))?;

        let status = response.status();
        tracing::debug!(
            "[fetch_raw] HTTP Status: {} {} in {:?}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown"),
            http_start.elapsed()
        );

        let body = response
            .text()
            .await
            .map_err(|e| SearchRequestError::Transport(format!("reading body: {}", e)))?;
        tracing::debug!("[fetch_raw] Response body: {} KB", body.len() / 1024);

        classify_search_status(status.as_u16(), &body)?;
        Ok(body)
    }
}

#[async_trait]
impl OfferSource for AmadeusFlightsClient {
    async fn fetch_offers(
        &self,
        query: &SearchQuery,
        credential: &Credential,
    ) -> Result<RawSearchResponse, SearchRequestError> {
        let url = query.get_search_url(&self.base_url);
        tracing::info!(
            "🔎 Searching {} {} ~ {} for {} adult(s)",
            query.route_label(),
            query.departure_date,
            query.return_date,
            query.adults
        );

        let fetch_start = std::time::Instant::now();
        let body = self.fetch_raw(&url, credential).await?;

        let response = RawSearchResponse::from_json(&body).map_err(|e| {
            tracing::error!(
                "Search response preview (first 500 chars):\n{}",
                body_preview(&body)
            );
            SearchRequestError::MalformedResponse(e.to_string())
        })?;

        tracing::info!(
            "Search returned {} offer(s) in {:?}",
            response.len(),
            fetch_start.elapsed()
        );
        Ok(response)
    }
}
