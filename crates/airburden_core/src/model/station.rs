//! Station model.

use serde::{Deserialize, Serialize};

/// Store-assigned station identifier.
pub type StationId = i64;

/// Fixed named observation point.
///
/// Created once per distinct `name` and looked up thereafter; never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub city: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Station attributes supplied by ingestion before an id exists.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStation {
    pub name: String,
    pub city: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl NewStation {
    /// Station known only by name; city mirrors the name and country is unknown.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            city: name.clone(),
            name,
            country: "Unknown".to_string(),
            latitude: None,
            longitude: None,
        }
    }
}
