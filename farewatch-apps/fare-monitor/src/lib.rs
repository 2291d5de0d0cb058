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

// Library for farewatch-fare-monitor
// Round-trip fare search, filtering and chat notification

pub mod amadeus_session;
pub mod config;
pub mod error;
pub mod flights_query_builder;
pub mod flights_results_parser;
pub mod flights_search;
pub mod money;
pub mod monitor;
pub mod notification_format;
pub mod offer_selector;
pub mod telegram_notifier;

pub use amadeus_session::{
    AmadeusTokenEndpoint, Credential, SessionManager, TokenEndpoint, TokenGrant,
};
pub use config::{
    AmadeusCredentials, EmptyResultPolicy, MonitorConfig, TelegramTarget, missing_env_vars,
};
pub use error::{
    AuthenticationError, ConfigurationError, MonitorError, NormalizationError,
    NormalizationWarning, NotificationDeliveryError, SearchRequestError,
};
pub use flights_query_builder::{SearchQuery, SearchQueryBuilder, build_query};
pub use flights_results_parser::{
    FlightOffer, NormalizedOffers, RawSearchResponse, Segment, collect_offers, normalize,
};
pub use flights_search::{AmadeusFlightsClient, OfferSource, build_http_client};
pub use money::Money;
pub use monitor::{DeliveryStatus, FareMonitor, RunReport};
pub use notification_format::{format, format_failure, format_no_match};
pub use offer_selector::{MonitorResult, select};
pub use telegram_notifier::{ConsoleNotifier, Notifier, TelegramNotifier};

// Token cache types, for callers wiring a session manager.
pub use farewatch_token_cache::{CachedToken, FileTokenCache, MemoryTokenCache, TokenCache};
