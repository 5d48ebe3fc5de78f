//! Upstream live feed client.
//!
//! # Responsibility
//! - Fetch the current reading of one location from the feed API.
//! - Decode the payload into a [`FeedReading`].
//!
//! # Invariants
//! - A non-`ok` status is a fetch failure, never an empty reading.
//! - No retry: one request per call.

use crate::model::observation::{Pollutant, PollutantReading, Weather};
use crate::model::station::NewStation;
use crate::normalize::parse_timestamp;
use chrono::NaiveDateTime;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub type FeedResult<T> = Result<T, FeedError>;

#[derive(Debug)]
pub enum FeedError {
    /// Feed unreachable or answered with an HTTP error.
    Transport(reqwest::Error),
    /// Feed answered but reported a non-`ok` status.
    Status { location: String, message: String },
    /// Body is not the documented payload shape.
    InvalidPayload { location: String, message: String },
}

impl Display for FeedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "feed request failed: {err}"),
            Self::Status { location, message } => {
                write!(f, "feed fetch failed for `{location}`: {message}")
            }
            Self::InvalidPayload { location, message } => {
                write!(f, "invalid feed payload for `{location}`: {message}")
            }
        }
    }
}

impl Error for FeedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Status { .. } | Self::InvalidPayload { .. } => None,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value)
    }
}

/// One decoded live reading.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedReading {
    pub station: NewStation,
    pub observed_at: NaiveDateTime,
    /// Index computed by the feed itself.
    pub aqi: Option<i32>,
    /// Informational only; not reconciled with the local max rule.
    pub dominant_pollutant: Option<String>,
    pub weather: Weather,
    pub readings: Vec<PollutantReading>,
}

/// Source of live readings, keyed by location identifier.
pub trait FeedClient {
    fn fetch(&self, location: &str) -> FeedResult<FeedReading>;
}

/// Blocking HTTP client for the WAQI-style feed.
pub struct WaqiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    token: String,
}

impl WaqiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> FeedResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }
}

impl FeedClient for WaqiClient {
    fn fetch(&self, location: &str) -> FeedResult<FeedReading> {
        let url = format!("{}/feed/{}/", self.base_url, location);
        debug!("event=feed_fetch module=ingest status=start location={location}");
        let body = self
            .http
            .get(url)
            .query(&[("token", self.token.as_str())])
            .send()?
            .error_for_status()?
            .text()?;
        decode_feed_response(location, &body)
    }
}

#[derive(Debug, Deserialize)]
struct FeedEnvelope {
    status: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct FeedData {
    #[serde(default)]
    aqi: Value,
    #[serde(default)]
    dominentpol: Option<String>,
    city: FeedCity,
    time: FeedTime,
    #[serde(default)]
    iaqi: BTreeMap<String, FeedValue>,
}

#[derive(Debug, Deserialize)]
struct FeedCity {
    name: String,
    #[serde(default)]
    geo: Vec<f64>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedTime {
    s: String,
}

#[derive(Debug, Deserialize)]
struct FeedValue {
    #[serde(default)]
    v: Value,
}

/// Decodes one feed response body.
pub fn decode_feed_response(location: &str, body: &str) -> FeedResult<FeedReading> {
    let invalid = |message: String| FeedError::InvalidPayload {
        location: location.to_string(),
        message,
    };

    let envelope: FeedEnvelope =
        serde_json::from_str(body).map_err(|err| invalid(err.to_string()))?;
    if envelope.status != "ok" {
        let message = match envelope.data {
            Value::String(message) => message,
            Value::Null => envelope.status,
            other => other.to_string(),
        };
        return Err(FeedError::Status {
            location: location.to_string(),
            message,
        });
    }

    let data: FeedData =
        serde_json::from_value(envelope.data).map_err(|err| invalid(err.to_string()))?;
    let observed_at = parse_timestamp(&data.time.s)
        .ok_or_else(|| invalid(format!("unparseable time `{}`", data.time.s)))?;

    let mut readings = Vec::new();
    for (code, value) in &data.iaqi {
        let Some(pollutant) = Pollutant::parse(code) else {
            continue;
        };
        let Some(number) = json_number(&value.v) else {
            warn!(
                "event=feed_decode module=ingest status=skip location={location} pollutant={pollutant} reason=non_numeric"
            );
            continue;
        };
        match PollutantReading::new(pollutant, number) {
            Ok(reading) => readings.push(reading),
            Err(err) => warn!(
                "event=feed_decode module=ingest status=skip location={location} error={err}"
            ),
        }
    }

    let weather_value = |code: &str| data.iaqi.get(code).and_then(|value| json_number(&value.v));
    let weather = Weather {
        temperature: weather_value("t"),
        humidity: weather_value("h"),
        pressure: weather_value("p"),
        wind: weather_value("w"),
    };

    let name = data.city.name;
    let station = NewStation {
        city: name.clone(),
        name,
        country: data.city.country.unwrap_or_else(|| "Unknown".to_string()),
        latitude: data.city.geo.first().copied(),
        longitude: data.city.geo.get(1).copied(),
    };

    Ok(FeedReading {
        station,
        observed_at,
        aqi: json_number(&data.aqi).map(|value| value.round() as i32),
        dominant_pollutant: data.dominentpol.filter(|label| !label.trim().is_empty()),
        weather,
        readings,
    })
}

fn json_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}
