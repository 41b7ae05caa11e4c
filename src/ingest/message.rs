// src/ingest/message.rs
//! Decoding and validation of scraped price messages.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;

use crate::model::Observation;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("payload is not valid {encoding}: {detail}")]
    Decode {
        encoding: &'static str,
        detail: String,
    },

    #[error("payload is not a map")]
    NotAMap,

    #[error("missing field `{0}`")]
    Missing(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Wire encoding of a delivery body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Json,
    MsgPack,
}

impl Encoding {
    /// Anything mentioning msgpack is MessagePack; everything else is JSON.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.to_ascii_lowercase().contains("msgpack") => Encoding::MsgPack,
            _ => Encoding::Json,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::MsgPack => "msgpack",
        }
    }
}

pub fn decode(payload: &[u8], encoding: Encoding) -> Result<Value, MessageError> {
    let res = match encoding {
        Encoding::Json => serde_json::from_slice::<Value>(payload).map_err(|e| e.to_string()),
        Encoding::MsgPack => rmp_serde::from_slice::<Value>(payload).map_err(|e| e.to_string()),
    };
    res.map_err(|detail| MessageError::Decode {
        encoding: encoding.label(),
        detail,
    })
}

/// Scrapers wrap field values in lists; take the first element.
/// An empty list carries no value.
pub fn unwrap_scalar(v: &Value) -> Option<&Value> {
    match v {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
}

/// Best-effort title for log context, even from an invalid message.
pub fn peek_title(body: &Value) -> Option<String> {
    body.get("title")
        .and_then(unwrap_scalar)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}

fn required<'a>(map: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, MessageError> {
    map.get(field)
        .and_then(unwrap_scalar)
        .ok_or(MessageError::Missing(field))
}

fn invalid(field: &'static str, reason: impl Into<String>) -> MessageError {
    MessageError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn required_text(map: &Map<String, Value>, field: &'static str) -> Result<String, MessageError> {
    match required(map, field)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::String(_) => Err(invalid(field, "empty")),
        Value::Null => Err(MessageError::Missing(field)),
        other => Err(invalid(field, format!("expected text, got {other}"))),
    }
}

fn nullable_text(v: &Value, field: &'static str) -> Result<Option<String>, MessageError> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.trim().to_string())),
        other => Err(invalid(field, format!("expected text, got {other}"))),
    }
}

/// Present key, nullable value.
fn present_text(map: &Map<String, Value>, field: &'static str) -> Result<Option<String>, MessageError> {
    if !map.contains_key(field) {
        return Err(MessageError::Missing(field));
    }
    match map.get(field).and_then(unwrap_scalar) {
        Some(v) => nullable_text(v, field),
        None => Ok(None),
    }
}

fn optional_text(map: &Map<String, Value>, field: &'static str) -> Result<Option<String>, MessageError> {
    match map.get(field).and_then(unwrap_scalar) {
        Some(v) => nullable_text(v, field),
        None => Ok(None),
    }
}

pub fn parse_price(v: &Value) -> Result<Decimal, MessageError> {
    let raw = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().trim_start_matches('$').trim().replace(',', ""),
        Value::Null => return Err(MessageError::Missing("price")),
        other => return Err(invalid("price", format!("expected number, got {other}"))),
    };
    let price = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| invalid("price", format!("not a number: {raw:?}")))?;
    if price.is_sign_negative() && !price.is_zero() {
        return Err(invalid("price", format!("negative: {price}")));
    }
    Ok(price.normalize())
}

pub fn parse_date(v: &Value) -> Result<NaiveDate, MessageError> {
    let s = match v {
        Value::String(s) => s.trim(),
        Value::Null => return Err(MessageError::Missing("date")),
        other => return Err(invalid("date", format!("expected date text, got {other}"))),
    };
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt.date());
    }
    Err(invalid("date", format!("unrecognized date {s:?}")))
}

/// Validate a decoded message body into an [`Observation`].
pub fn parse_observation(body: &Value) -> Result<Observation, MessageError> {
    let map = body.as_object().ok_or(MessageError::NotAMap)?;

    let title = required_text(map, "title")?;
    let price = parse_price(required(map, "price")?)?;
    let per = optional_text(map, "per")?;
    let url = present_text(map, "url")?;
    let image_url = present_text(map, "image_url")?;
    let date = parse_date(required(map, "date")?)?;
    let vendor = required_text(map, "vendor")?;

    Ok(Observation {
        title,
        price,
        per,
        url,
        image_url,
        date,
        vendor,
    })
}
