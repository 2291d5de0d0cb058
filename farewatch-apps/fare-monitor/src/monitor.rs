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

//! # Fare Monitor
//!
//! One run: validate, authenticate, search, normalize, select, format, notify.
//! Each stage consumes the complete output of the previous one, so nothing is
//! sent before the result is final.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::amadeus_session::SessionManager;
use crate::config::{EmptyResultPolicy, MonitorConfig};
use crate::error::{MonitorError, NormalizationWarning, SearchRequestError};
use crate::flights_query_builder::{SearchQuery, build_query};
use crate::flights_results_parser::{RawSearchResponse, collect_offers};
use crate::flights_search::OfferSource;
use crate::notification_format::{format, format_no_match};
use crate::offer_selector::{MonitorResult, select};
use crate::telegram_notifier::Notifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed { error: String },
    /// Nothing to send under the empty-result policy.
    Skipped,
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub result: MonitorResult,
    /// The message sent, or that would have been sent on delivery failure.
    pub message: Option<String>,
    pub delivery: DeliveryStatus,
    pub warnings: Vec<NormalizationWarning>,
    pub entries_received: usize,
}

pub struct FareMonitor {
    config: MonitorConfig,
    session: Arc<SessionManager>,
    source: Arc<dyn OfferSource>,
    notifier: Arc<dyn Notifier>,
}

impl FareMonitor {
    pub fn new(
        config: MonitorConfig,
        session: Arc<SessionManager>,
        source: Arc<dyn OfferSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            session,
            source,
            notifier,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<RunReport, MonitorError> {
        self.run_at(Utc::now()).await
    }

    /// Run with an explicit search timestamp.
    pub async fn run_at(&self, searched_at: DateTime<Utc>) -> Result<RunReport, MonitorError> {
        let run_start = std::time::Instant::now();
        let query = build_query(&self.config)?;
        tracing::info!(
            "Monitoring {} {} ~ {}, {} adult(s), max {}{}",
            query.route_label(),
            query.departure_date,
            query.return_date,
            query.adults,
            query.max_price,
            if query.non_stop { ", direct only" } else { "" }
        );

        let raw = self.search_with_reauth(&query).await?;

        let normalized = collect_offers(&raw, query.adults);
        let entries_received = normalized.total_entries;
        let warnings = normalized.warnings.clone();
        let offers = normalized.into_offers()?;

        let result = select(offers, &query, searched_at);

        let message = if !result.is_empty() {
            Some(format(&result))
        } else {
            match self.config.empty_result_policy {
                EmptyResultPolicy::Silent => {
                    tracing::info!("No matching offers, nothing to send");
                    None
                }
                EmptyResultPolicy::Notify => Some(format_no_match(&query, searched_at)),
            }
        };

        let delivery = match &message {
            Some(text) => self.deliver(text).await,
            None => DeliveryStatus::Skipped,
        };

        tracing::info!(
            "Run completed in {:?}: {} match(es) from {} entries, delivery {:?}",
            run_start.elapsed(),
            result.len(),
            entries_received,
            delivery
        );

        Ok(RunReport {
            result,
            message,
            delivery,
            warnings,
            entries_received,
        })
    }

    /// Search, re-authenticating once if the provider rejects the token.
    async fn search_with_reauth(
        &self,
        query: &SearchQuery,
    ) -> Result<RawSearchResponse, MonitorError> {
        let credential = self.session.get_valid_credential().await?;
        match self.source.fetch_offers(query, &credential).await {
            Err(SearchRequestError::Unauthorized) => {
                tracing::warn!("Access token rejected, re-authenticating once");
                self.session.invalidate().await;
                let credential = self.session.get_valid_credential().await?;
                Ok(self.source.fetch_offers(query, &credential).await?)
            }
            other => Ok(other?),
        }
    }

    /// Send `text`, recording rather than propagating a failure.
    pub async fn deliver(&self, text: &str) -> DeliveryStatus {
        match self.notifier.send(text).await {
            Ok(()) => DeliveryStatus::Sent,
            Err(e) => {
                tracing::error!("Notification delivery failed: {}", e);
                DeliveryStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Validate the configuration, authenticate and send a test message
    /// without searching.
    pub async fn self_check(&self) -> Result<DeliveryStatus, MonitorError> {
        let query = build_query(&self.config)?;
        let credential = self.session.get_valid_credential().await?;
        tracing::info!(
            "Authentication OK, token valid until {}",
            credential.expires_at()
        );

        let text = format!(
            "✅ Fare monitor check OK\n{} {} ~ {} | max {}",
            query.route_label(),
            query.departure_date,
            query.return_date,
            query.max_price.display()
        );
        Ok(self.deliver(&text).await)
    }
}
