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

//! # Flights Results Parser
//!
//! Side-effect free normalization of flight offers search responses.
//! Each raw entry is converted on its own; a malformed entry becomes a
//! warning and never aborts the rest of the response.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{NormalizationError, NormalizationWarning};
use crate::money::Money;

/// Search response as returned by the provider. Entries stay untyped so one
/// bad entry cannot fail deserialization of the whole response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSearchResponse {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(default)]
    pub dictionaries: Dictionaries,
}

impl RawSearchResponse {
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dictionaries {
    #[serde(default)]
    pub carriers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// Carrier code plus number, e.g. `KE703`.
    pub flight_number: String,
    pub carrier_code: String,
    pub departure_airport: String,
    pub arrival_airport: String,
    /// Local time at the departure airport.
    pub departure_time: NaiveDateTime,
    /// Local time at the arrival airport.
    pub arrival_time: NaiveDateTime,
    pub duration_minutes: Option<u32>,
    pub departure_terminal: Option<String>,
    pub arrival_terminal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlightOffer {
    pub id: String,
    pub carrier_code: String,
    pub carrier_name: String,
    pub total_price: Money,
    pub price_per_passenger: Money,
    pub outbound: Vec<Segment>,
    pub inbound: Vec<Segment>,
    pub outbound_duration_minutes: Option<u32>,
    pub inbound_duration_minutes: Option<u32>,
    pub seats_available: Option<u32>,
    pub fare_class: Option<String>,
}

impl FlightOffer {
    pub fn currency(&self) -> &str {
        &self.total_price.currency
    }

    pub fn outbound_departure(&self) -> Option<NaiveDateTime> {
        self.outbound.first().map(|s| s.departure_time)
    }

    pub fn inbound_departure(&self) -> Option<NaiveDateTime> {
        self.inbound.first().map(|s| s.departure_time)
    }

    pub fn outbound_stops(&self) -> usize {
        self.outbound.len().saturating_sub(1)
    }

    pub fn inbound_stops(&self) -> usize {
        self.inbound.len().saturating_sub(1)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOffer {
    id: Option<String>,
    #[serde(default)]
    itineraries: Vec<RawItinerary>,
    price: Option<RawPrice>,
    #[serde(default)]
    traveler_pricings: Vec<RawTravelerPricing>,
    number_of_bookable_seats: Option<u32>,
    #[serde(default)]
    validating_airline_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawItinerary {
    duration: Option<String>,
    #[serde(default)]
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSegment {
    departure: Option<RawEndpoint>,
    arrival: Option<RawEndpoint>,
    carrier_code: Option<String>,
    number: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEndpoint {
    iata_code: Option<String>,
    terminal: Option<String>,
    at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrice {
    currency: Option<String>,
    total: Option<String>,
    grand_total: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTravelerPricing {
    price: Option<RawPrice>,
    #[serde(default)]
    fare_details_by_segment: Vec<RawFareDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFareDetail {
    cabin: Option<String>,
    #[serde(rename = "class")]
    booking_class: Option<String>,
    branded_fare: Option<String>,
}

static ISO_DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:\d+(?:\.\d+)?S)?)?$").unwrap()
});

/// Parse an ISO-8601 duration such as `PT2H35M` or `P1DT3H` into minutes.
pub fn parse_iso_duration(s: &str) -> Option<u32> {
    let caps = ISO_DURATION_RE.captures(s.trim())?;
    let part = |i: usize| -> Option<u32> {
        match caps.get(i) {
            Some(m) => m.as_str().parse::<u32>().ok(),
            None => Some(0),
        }
    };
    // Out-of-range values yield None rather than a wrapped count.
    let minutes = part(1)?
        .checked_mul(24 * 60)?
        .checked_add(part(2)?.checked_mul(60)?)?
        .checked_add(part(3)?)?;
    if minutes == 0 && s.trim() == "P" {
        return None;
    }
    Some(minutes)
}

fn parse_local_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .ok()
}

/// Lazily normalize every entry of `response`.
///
/// The iterator borrows the response and holds no other state, so calling
/// this again yields the same sequence from the start.
pub fn normalize<'a>(
    response: &'a RawSearchResponse,
    passengers: u32,
) -> impl Iterator<Item = Result<FlightOffer, NormalizationWarning>> + 'a {
    response
        .data
        .iter()
        .enumerate()
        .map(move |(index, entry)| {
            normalize_entry(entry, &response.dictionaries, passengers).map_err(|reason| {
                NormalizationWarning {
                    index,
                    offer_id: entry
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or("?")
                        .to_string(),
                    reason,
                }
            })
        })
}

/// Offers that survived normalization, plus what was dropped.
#[derive(Debug, Clone, Default)]
pub struct NormalizedOffers {
    pub offers: Vec<FlightOffer>,
    pub warnings: Vec<NormalizationWarning>,
    pub total_entries: usize,
}

impl NormalizedOffers {
    /// Fail only when there was something to parse and none of it was usable.
    pub fn into_offers(self) -> Result<Vec<FlightOffer>, NormalizationError> {
        if self.total_entries > 0 && self.offers.is_empty() {
            return Err(NormalizationError::NoUsableOffers {
                total: self.total_entries,
            });
        }
        Ok(self.offers)
    }
}

/// Collapse [`normalize`] into valid offers, logging each skipped entry.
pub fn collect_offers(response: &RawSearchResponse, passengers: u32) -> NormalizedOffers {
    let mut collected = NormalizedOffers {
        total_entries: response.len(),
        ..Default::default()
    };

    for item in normalize(response, passengers) {
        match item {
            Ok(offer) => collected.offers.push(offer),
            Err(warning) => {
                tracing::warn!("{}", warning);
                collected.warnings.push(warning);
            }
        }
    }

    tracing::debug!(
        "Normalized {}/{} offers",
        collected.offers.len(),
        collected.total_entries
    );
    collected
}

fn normalize_entry(
    entry: &serde_json::Value,
    dictionaries: &Dictionaries,
    passengers: u32,
) -> Result<FlightOffer, String> {
    let raw: RawOffer =
        serde_json::from_value(entry.clone()).map_err(|e| format!("unexpected shape: {}", e))?;

    let price = raw.price.as_ref().ok_or("missing price")?;
    let currency = price
        .currency
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or("missing price currency")?;
    let total_raw = price
        .grand_total
        .as_deref()
        .or(price.total.as_deref())
        .ok_or("missing total price")?;
    let total_price =
        Money::parse(total_raw, currency).map_err(|e| format!("bad total price: {}", e))?;

    let per_pax_raw = raw
        .traveler_pricings
        .first()
        .and_then(|tp| tp.price.as_ref())
        .and_then(|p| p.total.as_deref())
        .ok_or("missing per-passenger price")?;
    let price_per_passenger = Money::parse(per_pax_raw, currency)
        .map_err(|e| format!("bad per-passenger price: {}", e))?;

    let expected = price_per_passenger.times(passengers);
    if !total_price.approx_eq(&expected) {
        return Err(format!(
            "total {} does not match {} x {} passenger(s)",
            total_price, price_per_passenger, passengers
        ));
    }

    let mut itineraries = raw.itineraries.iter();
    let outbound_itin = itineraries.next().ok_or("missing outbound itinerary")?;
    let outbound = normalize_segments(&outbound_itin.segments)
        .map_err(|e| format!("outbound: {}", e))?;
    if outbound.is_empty() {
        return Err("outbound itinerary has no segments".to_string());
    }

    let inbound_itin = itineraries.next().ok_or("missing return itinerary")?;
    let inbound =
        normalize_segments(&inbound_itin.segments).map_err(|e| format!("inbound: {}", e))?;
    if inbound.is_empty() {
        return Err("return itinerary has no segments".to_string());
    }

    let carrier_code = raw
        .validating_airline_codes
        .first()
        .cloned()
        .unwrap_or_else(|| outbound[0].carrier_code.clone());
    let carrier_name = dictionaries
        .carriers
        .get(&carrier_code)
        .cloned()
        .unwrap_or_else(|| carrier_code.clone());

    let fare_class = raw
        .traveler_pricings
        .first()
        .and_then(|tp| tp.fare_details_by_segment.first())
        .and_then(describe_fare);

    Ok(FlightOffer {
        id: raw.id.unwrap_or_default(),
        carrier_code,
        carrier_name,
        total_price,
        price_per_passenger,
        outbound,
        inbound,
        outbound_duration_minutes: outbound_itin.duration.as_deref().and_then(parse_iso_duration),
        inbound_duration_minutes: inbound_itin.duration.as_deref().and_then(parse_iso_duration),
        seats_available: raw.number_of_bookable_seats,
        fare_class,
    })
}

fn normalize_segments(raw: &[RawSegment]) -> Result<Vec<Segment>, String> {
    raw.iter()
        .enumerate()
        .map(|(i, seg)| normalize_segment(seg).map_err(|e| format!("segment {}: {}", i + 1, e)))
        .collect()
}

fn normalize_segment(seg: &RawSegment) -> Result<Segment, String> {
    let departure = seg.departure.as_ref().ok_or("missing departure")?;
    let arrival = seg.arrival.as_ref().ok_or("missing arrival")?;

    let departure_time = departure
        .at
        .as_deref()
        .and_then(parse_local_time)
        .ok_or("missing or invalid departure time")?;
    let arrival_time = arrival
        .at
        .as_deref()
        .and_then(parse_local_time)
        .ok_or("missing or invalid arrival time")?;

    let carrier_code = seg.carrier_code.clone().ok_or("missing carrier code")?;
    let number = seg.number.as_deref().unwrap_or("");

    Ok(Segment {
        flight_number: format!("{}{}", carrier_code, number),
        carrier_code,
        departure_airport: departure.iata_code.clone().unwrap_or_default(),
        arrival_airport: arrival.iata_code.clone().unwrap_or_default(),
        departure_time,
        arrival_time,
        duration_minutes: seg.duration.as_deref().and_then(parse_iso_duration),
        departure_terminal: departure.terminal.clone().filter(|t| !t.is_empty()),
        arrival_terminal: arrival.terminal.clone().filter(|t| !t.is_empty()),
    })
}

fn describe_fare(detail: &RawFareDetail) -> Option<String> {
    let cabin = detail.branded_fare.as_ref().or(detail.cabin.as_ref());
    match (cabin, detail.booking_class.as_ref()) {
        (Some(cabin), Some(class)) => Some(format!("{} ({})", cabin, class)),
        (Some(cabin), None) => Some(cabin.clone()),
        (None, Some(class)) => Some(class.clone()),
        (None, None) => None,
    }
}
