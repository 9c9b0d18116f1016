//! Validated inputs for every callable operation.
//!
//! Wire payloads (`*Draft`) keep every field optional so a missing field turns into
//! `invalid-argument` instead of a deserialization rejection. Commands can only be
//! built through their constructors, so a command value is always valid.

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::review::truncate_comment;
use crate::rule::parse_hhmm;
use crate::{CoreError, CoreResult};

pub const MAX_SEATS_PER_BOOKING: i32 = 6;
pub const MAX_TRIP_SEATS: i32 = 8;
pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;
pub const DEFAULT_HORIZON_DAYS: u32 = 30;

fn required(value: Option<&str>, field: &str) -> CoreResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(CoreError::invalid(format!("Missing {}", field))),
    }
}

fn whole_number(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn parse_date(value: &str, field: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::invalid(format!("Invalid {}: expected YYYY-MM-DD", field)))
}

fn parse_time(value: &str) -> CoreResult<NaiveTime> {
    parse_hhmm(value).ok_or_else(|| CoreError::invalid("Invalid time: expected HH:mm"))
}

fn parse_price(value: Option<f64>) -> CoreResult<f64> {
    let price = value.ok_or_else(|| CoreError::invalid("Missing price"))?;
    if !price.is_finite() || price < 0.0 {
        return Err(CoreError::invalid("Price must be a non-negative number"));
    }
    Ok(price)
}

fn parse_trip_seats(value: Option<f64>) -> CoreResult<i32> {
    let raw = value.ok_or_else(|| CoreError::invalid("Missing seats"))?;
    match whole_number(raw) {
        Some(n) if (1..=i64::from(MAX_TRIP_SEATS)).contains(&n) => Ok(n as i32),
        _ => Err(CoreError::invalid(format!(
            "Seats must be a whole number between 1 and {}",
            MAX_TRIP_SEATS
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveSeats {
    pub trip_id: String,
    pub seats: i32,
}

impl ReserveSeats {
    /// Seats default to 1 when omitted.
    pub fn new(trip_id: &str, seats: Option<f64>) -> CoreResult<Self> {
        let trip_id = required(Some(trip_id), "trip_id")?;
        let seats = match whole_number(seats.unwrap_or(1.0)) {
            Some(n) if (1..=i64::from(MAX_SEATS_PER_BOOKING)).contains(&n) => n as i32,
            _ => {
                return Err(CoreError::invalid(format!(
                    "Invalid parameters: seats must be a whole number between 1 and {}",
                    MAX_SEATS_PER_BOOKING
                )))
            }
        };
        Ok(Self { trip_id, seats })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRef {
    pub trip_id: String,
    pub booking_id: String,
}

impl BookingRef {
    pub fn new(trip_id: &str, booking_id: &str) -> CoreResult<Self> {
        Ok(Self {
            trip_id: required(Some(trip_id), "trip_id")?,
            booking_id: required(Some(booking_id), "booking_id")?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiptDraft {
    pub receipt_url: Option<String>,
    pub amount: Option<f64>,
    pub note: Option<String>,
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachReceipt {
    pub booking: BookingRef,
    pub receipt_url: String,
    pub amount: Option<f64>,
    pub note: String,
    pub method: String,
}

impl AttachReceipt {
    pub fn new(booking: BookingRef, draft: ReceiptDraft) -> CoreResult<Self> {
        let receipt_url = required(draft.receipt_url.as_deref(), "receipt_url")?;
        if !(receipt_url.starts_with("https://") || receipt_url.starts_with("http://")) {
            return Err(CoreError::invalid("receipt_url must be an http(s) link"));
        }
        if let Some(amount) = draft.amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(CoreError::invalid("Amount must be a non-negative number"));
            }
        }
        Ok(Self {
            booking,
            receipt_url,
            amount: draft.amount,
            note: draft.note.unwrap_or_default().trim().to_string(),
            method: optional_text(draft.method).unwrap_or_else(|| "transfer".to_string()),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleDraft {
    pub rule_id: Option<String>,
    pub origin_id: Option<String>,
    pub destination_id: Option<String>,
    pub weekdays: Option<Vec<i64>>,
    pub time: Option<String>,
    pub price: Option<f64>,
    pub seats: Option<f64>,
    pub vehicle_photo_url: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub active: Option<bool>,
}

/// A rule as submitted by its owner, before ownership and timestamps are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleInput {
    pub rule_id: Option<String>,
    pub origin_id: String,
    pub destination_id: String,
    pub weekdays: Vec<u8>,
    pub time: NaiveTime,
    pub price: f64,
    pub seats: i32,
    pub vehicle_photo_url: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
}

impl TryFrom<RuleDraft> for RuleInput {
    type Error = CoreError;

    fn try_from(draft: RuleDraft) -> CoreResult<Self> {
        let origin_id = required(draft.origin_id.as_deref(), "origin_id")?;
        let destination_id = required(draft.destination_id.as_deref(), "destination_id")?;
        let raw_weekdays = draft
            .weekdays
            .ok_or_else(|| CoreError::invalid("Missing weekdays"))?;
        let time = parse_time(&required(draft.time.as_deref(), "time")?)?;
        let price = parse_price(draft.price)?;
        let seats = parse_trip_seats(draft.seats)?;
        let start_date = parse_date(&required(draft.start_date.as_deref(), "start_date")?, "start_date")?;

        if origin_id == destination_id {
            return Err(CoreError::invalid("Origin and destination must differ"));
        }

        let mut weekdays = Vec::with_capacity(raw_weekdays.len());
        for day in raw_weekdays {
            if !(0..=6).contains(&day) {
                return Err(CoreError::invalid(format!("Invalid weekday {}: expected 0..6", day)));
            }
            weekdays.push(day as u8);
        }
        weekdays.sort_unstable();
        weekdays.dedup();

        let end_date = match optional_text(draft.end_date) {
            Some(raw) => Some(parse_date(&raw, "end_date")?),
            None => None,
        };
        if let Some(end) = end_date {
            if end < start_date {
                return Err(CoreError::invalid("end_date must not be before start_date"));
            }
        }

        Ok(Self {
            rule_id: optional_text(draft.rule_id),
            origin_id,
            destination_id,
            weekdays,
            time,
            price,
            seats,
            vehicle_photo_url: optional_text(draft.vehicle_photo_url),
            start_date,
            end_date,
            active: draft.active.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateForRule {
    pub rule_id: String,
    pub horizon_days: u32,
}

impl GenerateForRule {
    pub fn new(rule_id: &str, horizon_days: Option<f64>, max_horizon_days: u32) -> CoreResult<Self> {
        let rule_id = required(Some(rule_id), "rule_id")?;
        let horizon = horizon_days.unwrap_or(f64::from(DEFAULT_HORIZON_DAYS));
        let horizon_days = match whole_number(horizon) {
            Some(n) if n >= 1 && n <= i64::from(max_horizon_days) => n as u32,
            _ => {
                return Err(CoreError::invalid(format!(
                    "horizon_days must be a whole number between 1 and {}",
                    max_horizon_days
                )))
            }
        };
        Ok(Self { rule_id, horizon_days })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReview {
    pub trip_id: String,
    pub rating: i32,
    pub comment: String,
}

impl SubmitReview {
    pub fn new(trip_id: &str, rating: Option<f64>, comment: Option<String>) -> CoreResult<Self> {
        let trip_id = required(Some(trip_id), "trip_id")?;
        let rating = match rating.and_then(whole_number) {
            Some(r) if (i64::from(MIN_RATING)..=i64::from(MAX_RATING)).contains(&r) => r as i32,
            _ => {
                return Err(CoreError::invalid(format!(
                    "Invalid parameters: rating must be a whole number between {} and {}",
                    MIN_RATING, MAX_RATING
                )))
            }
        };
        Ok(Self {
            trip_id,
            rating,
            comment: truncate_comment(comment.as_deref().unwrap_or_default()),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripDraft {
    pub origin_id: Option<String>,
    pub destination_id: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub price: Option<f64>,
    pub seats: Option<f64>,
    pub vehicle_photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishTrip {
    pub origin_id: String,
    pub destination_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub price: f64,
    pub seats: i32,
    pub vehicle_photo_url: Option<String>,
}

impl TryFrom<TripDraft> for PublishTrip {
    type Error = CoreError;

    fn try_from(draft: TripDraft) -> CoreResult<Self> {
        let route = RouteRef::new(
            draft.origin_id.as_deref().unwrap_or_default(),
            draft.destination_id.as_deref().unwrap_or_default(),
        )?;
        Ok(Self {
            origin_id: route.origin_id,
            destination_id: route.destination_id,
            date: parse_date(&required(draft.date.as_deref(), "date")?, "date")?,
            time: parse_time(&required(draft.time.as_deref(), "time")?)?,
            price: parse_price(draft.price)?,
            seats: parse_trip_seats(draft.seats)?,
            vehicle_photo_url: optional_text(draft.vehicle_photo_url),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRef {
    pub origin_id: String,
    pub destination_id: String,
}

impl RouteRef {
    pub fn new(origin_id: &str, destination_id: &str) -> CoreResult<Self> {
        let origin_id = required(Some(origin_id), "origin_id")?;
        let destination_id = required(Some(destination_id), "destination_id")?;
        if origin_id == destination_id {
            return Err(CoreError::invalid("Origin and destination must differ"));
        }
        Ok(Self {
            origin_id,
            destination_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_draft() -> RuleDraft {
        RuleDraft {
            origin_id: Some("cordoba".into()),
            destination_id: Some("rosario".into()),
            weekdays: Some(vec![5, 1, 3, 1]),
            time: Some("07:30".into()),
            price: Some(4500.0),
            seats: Some(3.0),
            start_date: Some("2024-01-01".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_reserve_seats_bounds() {
        assert_eq!(ReserveSeats::new("t1", None).unwrap().seats, 1);
        assert_eq!(ReserveSeats::new("t1", Some(6.0)).unwrap().seats, 6);
        for bad in [0.0, 7.0, 1.5, f64::NAN, -1.0] {
            let err = ReserveSeats::new("t1", Some(bad)).unwrap_err();
            assert_eq!(err.code(), "invalid-argument");
        }
        assert!(ReserveSeats::new("  ", Some(1.0)).is_err());
    }

    #[test]
    fn test_rule_input_normalizes_weekdays() {
        let input = RuleInput::try_from(rule_draft()).unwrap();
        assert_eq!(input.weekdays, vec![1, 3, 5]);
        assert!(input.active);
        assert_eq!(input.end_date, None);
    }

    #[test]
    fn test_rule_input_rejects_bad_fields() {
        let mut missing = rule_draft();
        missing.time = None;
        assert_eq!(
            RuleInput::try_from(missing).unwrap_err(),
            CoreError::invalid("Missing time")
        );

        let mut weekday = rule_draft();
        weekday.weekdays = Some(vec![7]);
        assert!(RuleInput::try_from(weekday).is_err());

        let mut backwards = rule_draft();
        backwards.end_date = Some("2023-12-31".into());
        assert!(RuleInput::try_from(backwards).is_err());

        let mut loop_route = rule_draft();
        loop_route.destination_id = Some("cordoba".into());
        assert!(RuleInput::try_from(loop_route).is_err());

        let mut price = rule_draft();
        price.price = Some(-1.0);
        assert!(RuleInput::try_from(price).is_err());
    }

    #[test]
    fn test_generate_horizon_limits() {
        assert_eq!(GenerateForRule::new("r1", None, 365).unwrap().horizon_days, 30);
        assert!(GenerateForRule::new("r1", Some(0.0), 365).is_err());
        assert!(GenerateForRule::new("r1", Some(366.0), 365).is_err());
        assert!(GenerateForRule::new("", Some(10.0), 365).is_err());
    }

    #[test]
    fn test_submit_review_validation() {
        let ok = SubmitReview::new("t1", Some(5.0), Some("x".repeat(700))).unwrap();
        assert_eq!(ok.comment.chars().count(), 500);
        assert!(SubmitReview::new("t1", Some(6.0), None).is_err());
        assert!(SubmitReview::new("t1", Some(4.5), None).is_err());
        assert!(SubmitReview::new("t1", None, None).is_err());
    }

    #[test]
    fn test_receipt_requires_link() {
        let booking = BookingRef::new("t1", "b1").unwrap();
        let err = AttachReceipt::new(booking.clone(), ReceiptDraft::default()).unwrap_err();
        assert_eq!(err, CoreError::invalid("Missing receipt_url"));

        let ok = AttachReceipt::new(
            booking,
            ReceiptDraft {
                receipt_url: Some("https://files.example/r.png".into()),
                note: Some("  paid  ".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ok.method, "transfer");
        assert_eq!(ok.note, "paid");
    }
}
