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

//! # Offer Selection
//!
//! Direct-only filter, price ceiling, then a deterministic ordering.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::flights_query_builder::SearchQuery;
use crate::flights_results_parser::FlightOffer;

/// Offers that passed every filter in one run, cheapest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorResult {
    pub query: SearchQuery,
    pub searched_at: DateTime<Utc>,
    pub offers: Vec<FlightOffer>,
}

impl MonitorResult {
    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    pub fn cheapest(&self) -> Option<&FlightOffer> {
        self.offers.first()
    }
}

/// Exactly one segment in each direction.
pub fn is_direct(offer: &FlightOffer) -> bool {
    offer.outbound.len() == 1 && offer.inbound.len() == 1
}

pub fn within_ceiling(offer: &FlightOffer, query: &SearchQuery) -> bool {
    offer.currency() == query.max_price.currency
        && offer.total_price.hundredths <= query.max_price.hundredths
}

pub fn select(
    offers: Vec<FlightOffer>,
    query: &SearchQuery,
    searched_at: DateTime<Utc>,
) -> MonitorResult {
    let received = offers.len();

    let direct: Vec<FlightOffer> = if query.non_stop {
        offers
            .into_iter()
            .filter(|o| {
                let keep = is_direct(o);
                if !keep {
                    tracing::debug!(
                        "Dropping offer {} ({}): {} outbound / {} inbound stop(s)",
                        o.id,
                        o.carrier_code,
                        o.outbound_stops(),
                        o.inbound_stops()
                    );
                }
                keep
            })
            .collect()
    } else {
        offers
    };
    let direct_count = direct.len();

    let mut selected: Vec<FlightOffer> = direct
        .into_iter()
        .filter(|o| {
            let keep = within_ceiling(o, query);
            if !keep {
                tracing::debug!(
                    "Dropping offer {} ({}): {} above ceiling {}",
                    o.id,
                    o.carrier_code,
                    o.total_price,
                    query.max_price
                );
            }
            keep
        })
        .collect();

    // Vec::sort_by is stable.
    selected.sort_by(|a, b| {
        a.total_price
            .hundredths
            .cmp(&b.total_price.hundredths)
            .then_with(|| a.carrier_code.cmp(&b.carrier_code))
            .then_with(|| a.outbound_departure().cmp(&b.outbound_departure()))
    });

    tracing::info!(
        "Selected {} of {} offer(s) ({} direct, ceiling {})",
        selected.len(),
        received,
        direct_count,
        query.max_price
    );

    MonitorResult {
        query: query.clone(),
        searched_at,
        offers: selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flights_results_parser::Segment;
    use crate::money::Money;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn seg(flight: &str, dep: NaiveDateTime) -> Segment {
        Segment {
            flight_number: flight.to_string(),
            carrier_code: flight[..2].to_string(),
            departure_airport: "ICN".into(),
            arrival_airport: "NRT".into(),
            departure_time: dep,
            arrival_time: dep + chrono::Duration::hours(2),
            duration_minutes: Some(120),
            departure_terminal: None,
            arrival_terminal: None,
        }
    }

    fn offer(id: &str, carrier: &str, won: i64, out_legs: usize, dep_hour: u32) -> FlightOffer {
        FlightOffer {
            id: id.into(),
            carrier_code: carrier.into(),
            carrier_name: carrier.into(),
            total_price: Money::from_units(won, "KRW"),
            price_per_passenger: Money::from_units(won / 2, "KRW"),
            outbound: (0..out_legs)
                .map(|i| seg(&format!("{}10{}", carrier, i), at(4, dep_hour + i as u32)))
                .collect(),
            inbound: vec![seg(&format!("{}200", carrier), at(8, 13))],
            outbound_duration_minutes: None,
            inbound_duration_minutes: None,
            seats_available: Some(4),
            fare_class: None,
        }
    }

    fn query(non_stop: bool) -> SearchQuery {
        SearchQuery::builder(
            "ICN",
            "NRT",
            NaiveDate::from_ymd_opt(2026, 10, 4).unwrap(),
        )
        .return_date(NaiveDate::from_ymd_opt(2026, 10, 8).unwrap())
        .adults(2)
        .non_stop(non_stop)
        .max_price(Money::from_units(1_500_000, "KRW"))
        .build()
        .unwrap()
    }

    #[test]
    fn test_direct_only_rejects_connections() {
        let offers = vec![offer("a", "KE", 1_450_000, 1, 9), offer("b", "OZ", 1_200_000, 2, 8)];
        let result = select(offers, &query(true), Utc::now());
        assert_eq!(result.len(), 1);
        assert_eq!(result.offers[0].id, "a");
    }

    #[test]
    fn test_connections_kept_when_allowed() {
        let offers = vec![offer("a", "KE", 1_450_000, 1, 9), offer("b", "OZ", 1_200_000, 2, 8)];
        let result = select(offers, &query(false), Utc::now());
        assert_eq!(result.len(), 2);
        assert_eq!(result.offers[0].id, "b");
    }

    #[test]
    fn test_ceiling_is_inclusive() {
        let offers = vec![
            offer("at", "KE", 1_500_000, 1, 9),
            offer("over", "KE", 1_500_001, 1, 9),
        ];
        let result = select(offers, &query(true), Utc::now());
        assert_eq!(result.offers.iter().map(|o| o.id.as_str()).collect::<Vec<_>>(), ["at"]);
    }

    #[test]
    fn test_foreign_currency_rejected() {
        let mut usd = offer("usd", "UA", 900, 1, 9);
        usd.total_price = Money::from_units(900, "USD");
        let result = select(vec![usd], &query(true), Utc::now());
        assert!(result.is_empty());
    }

    #[test]
    fn test_tie_breaks_by_carrier_then_departure() {
        let offers = vec![
            offer("oz-late", "OZ", 1_000_000, 1, 15),
            offer("ke-late", "KE", 1_000_000, 1, 15),
            offer("ke-early", "KE", 1_000_000, 1, 7),
            offer("cheap", "ZE", 900_000, 1, 12),
        ];
        let result = select(offers, &query(true), Utc::now());
        let ids: Vec<&str> = result.offers.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["cheap", "ke-early", "ke-late", "oz-late"]);
        assert_eq!(result.cheapest().unwrap().id, "cheap");
    }

    #[test]
    fn test_direct_only_requires_one_segment_each_way() {
        let mut no_return = offer("no-return", "KE", 1_000_000, 1, 9);
        no_return.inbound.clear();
        let mut return_connection = offer("return-connection", "KE", 1_000_000, 1, 9);
        return_connection.inbound.push(seg("KE201", at(8, 17)));
        let direct = offer("direct", "KE", 1_100_000, 1, 9);

        assert!(!is_direct(&no_return));
        assert!(!is_direct(&return_connection));
        assert!(is_direct(&direct));

        let result = select(vec![no_return, return_connection, direct], &query(true), Utc::now());
        let ids: Vec<&str> = result.offers.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["direct"]);
        for o in &result.offers {
            assert_eq!((o.outbound.len(), o.inbound.len()), (1, 1));
        }
    }

    #[test]
    fn test_empty_input_is_empty_result() {
        let result = select(Vec::new(), &query(true), Utc::now());
        assert!(result.is_empty());
    }
}
