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

//! # Notification Formatting
//!
//! Plain-text rendering of a run's outcome. Output is a pure function of its
//! inputs: the same result always renders to the same text.

use std::fmt::Display;

use chrono::{DateTime, Utc};

use crate::flights_query_builder::SearchQuery;
use crate::flights_results_parser::{FlightOffer, Segment};
use crate::offer_selector::MonitorResult;

/// Telegram's `sendMessage` limit, in UTF-16 code units.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Error text kept in a failure alert.
pub const FAILURE_DETAIL_CHARS: usize = 200;

/// Render the matching offers, cheapest first.
pub fn format(result: &MonitorResult) -> String {
    format_with_limit(result, TELEGRAM_MESSAGE_LIMIT)
}

/// Same as [`format`], dropping trailing offers once `limit` would be exceeded.
pub fn format_with_limit(result: &MonitorResult, limit: usize) -> String {
    let query = &result.query;
    let header = format!(
        "✈️ {} flight(s) found: {}\n{}\n",
        result.len(),
        query.route_label(),
        fmt_query_line(query)
    );
    let footer = fmt_checked_at(result.searched_at);

    let mut msg = header;
    let total = result.offers.len();
    for (i, offer) in result.offers.iter().enumerate() {
        let block = fmt_offer(i + 1, offer);
        let remaining_after = total - i - 1;
        let trailer_len = if remaining_after > 0 {
            text_len(&fmt_more(remaining_after))
        } else {
            0
        };
        if text_len(&msg) + text_len(&block) + trailer_len + text_len(&footer) > limit {
            msg.push_str(&fmt_more(total - i));
            break;
        }
        msg.push_str(&block);
    }

    msg.push_str(&footer);
    msg
}

/// Notice for a completed run with nothing under the ceiling.
pub fn format_no_match(query: &SearchQuery, searched_at: DateTime<Utc>) -> String {
    format!(
        "🔍 No flights matched: {}\n{}\n{}",
        query.route_label(),
        fmt_query_line(query),
        fmt_checked_at(searched_at)
    )
}

/// Alert for a run that failed before producing a result.
pub fn format_failure(error: &dyn Display) -> String {
    let detail: String = error.to_string().chars().take(FAILURE_DETAIL_CHARS).collect();
    format!("❌ Monitoring error\n{}", detail)
}

fn fmt_query_line(query: &SearchQuery) -> String {
    let direct = if query.non_stop { " | direct only" } else { "" };
    format!(
        "📅 {} ~ {} | 👥 {} adult(s) | 💰 max {}{}",
        query.departure_date,
        query.return_date,
        query.adults,
        query.max_price.display(),
        direct
    )
}

fn fmt_checked_at(searched_at: DateTime<Utc>) -> String {
    format!("\n🕐 Checked {}", searched_at.format("%Y-%m-%d %H:%M UTC"))
}

fn fmt_more(n: usize) -> String {
    format!("\n… and {} more", n)
}

fn fmt_offer(rank: usize, offer: &FlightOffer) -> String {
    let mut block = format!(
        "\n{}. {} ({})\n   💵 {} total ({} per person)\n",
        rank,
        offer.carrier_name,
        offer.carrier_code,
        offer.total_price.display(),
        offer.price_per_passenger.display()
    );

    block.push_str(&fmt_direction(
        "🛫 Outbound",
        &offer.outbound,
        offer.outbound_duration_minutes,
    ));
    if !offer.inbound.is_empty() {
        block.push_str(&fmt_direction(
            "🛬 Return",
            &offer.inbound,
            offer.inbound_duration_minutes,
        ));
    }

    let seats = offer
        .seats_available
        .map_or("seats unknown".to_string(), |n| format!("{} seat(s) left", n));
    match &offer.fare_class {
        Some(fare) => block.push_str(&format!("   💺 {} | {}\n", seats, fare)),
        None => block.push_str(&format!("   💺 {}\n", seats)),
    }
    block
}

fn fmt_direction(label: &str, segments: &[Segment], duration: Option<u32>) -> String {
    let duration = duration
        .or_else(|| segments.iter().map(|s| s.duration_minutes).sum())
        .map_or("??".to_string(), fmt_duration);
    let mut out = format!(
        "   {} · {} · {}\n",
        label,
        fmt_stops(segments.len().saturating_sub(1)),
        duration
    );
    for seg in segments {
        out.push_str(&format!(
            "      {} {}{} {} → {}{} {}\n",
            seg.flight_number,
            seg.departure_airport,
            fmt_terminal(&seg.departure_terminal),
            seg.departure_time.format("%m-%d %H:%M"),
            seg.arrival_airport,
            fmt_terminal(&seg.arrival_terminal),
            seg.arrival_time.format("%m-%d %H:%M"),
        ));
    }
    out
}

fn fmt_terminal(terminal: &Option<String>) -> String {
    terminal
        .as_deref()
        .map_or(String::new(), |t| format!(" T{}", t))
}

fn fmt_stops(stops: usize) -> String {
    match stops {
        0 => "direct".to_string(),
        1 => "1 stop".to_string(),
        n => format!("{} stops", n),
    }
}

/// Format duration in hours/minutes.
fn fmt_duration(minutes: u32) -> String {
    let hrs = minutes / 60;
    let mins = minutes % 60;
    if mins == 0 {
        format!("{}h", hrs)
    } else if hrs == 0 {
        format!("{}m", mins)
    } else {
        format!("{}h {:02}m", hrs, mins)
    }
}

fn text_len(s: &str) -> usize {
    s.encode_utf16().count()
}
