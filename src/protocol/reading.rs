//! Sensor reading entity carried on the weather queue
//!
//! A [`Reading`] is built by the codec from one delivery, handed to the
//! forwarder once, and dropped after the delivery is resolved.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A single sensor observation
///
/// Field names follow the camelCase wire shape produced by the collector
/// and accepted by the ingestion endpoint. A missing or `null` field takes
/// its zero value (`0.0` or `""`); only a value of the wrong type is
/// rejected.
///
/// # Examples
/// ```
/// use weather_relay::protocol::Reading;
///
/// let reading = Reading {
///     temperature: 21.5,
///     humidity: 60.0,
///     wind_speed: 3.2,
///     condition: "cloudy".to_string(),
///     location: "Berlin".to_string(),
///     latitude: None,
///     longitude: None,
///     timestamp: "2024-01-01T00:00:00Z".to_string(),
/// };
/// assert_eq!(reading.location, "Berlin");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Reading {
    /// Air temperature in degrees Celsius
    #[serde(deserialize_with = "null_as_default")]
    pub temperature: f64,
    /// Relative humidity in percent
    #[serde(deserialize_with = "null_as_default")]
    pub humidity: f64,
    /// Wind speed as reported by the collector
    #[serde(deserialize_with = "null_as_default")]
    pub wind_speed: f64,
    /// Short condition label, e.g. "Clear", "Cloudy", "Rain"
    #[serde(deserialize_with = "null_as_default")]
    pub condition: String,
    /// Human readable location name
    #[serde(deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Observation time, ISO-8601 recommended but not enforced
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
}

/// Read `null` as the type's zero value
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Reading {
    /// Whether both coordinates are present
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Short human readable summary used in receive logs
impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}°C, {:.0}% humidity from {}",
            self.temperature, self.humidity, self.location
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn berlin() -> Reading {
        Reading {
            temperature: 21.5,
            humidity: 60.0,
            wind_speed: 3.2,
            condition: "cloudy".to_string(),
            location: "Berlin".to_string(),
            latitude: None,
            longitude: None,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_display_summary() {
        assert_eq!(berlin().to_string(), "21.5°C, 60% humidity from Berlin");
    }

    #[test]
    fn test_has_coordinates_requires_both() {
        let mut reading = berlin();
        assert!(!reading.has_coordinates());

        reading.latitude = Some(52.52);
        assert!(!reading.has_coordinates());

        reading.longitude = Some(13.405);
        assert!(reading.has_coordinates());
    }

    #[test]
    fn test_missing_and_null_fields_take_zero_values() {
        let reading: Reading =
            serde_json::from_str(r#"{"location":"Berlin","temperature":null}"#).unwrap();

        assert_eq!(reading.temperature, 0.0);
        assert_eq!(reading.humidity, 0.0);
        assert_eq!(reading.condition, "");
        assert_eq!(reading.timestamp, "");
        assert_eq!(reading.location, "Berlin");
        assert_eq!(reading.latitude, None);
    }

    #[test]
    fn test_serializes_with_camel_case_and_omits_missing_coordinates() {
        let value = serde_json::to_value(berlin()).unwrap();
        let object = value.as_object().unwrap();

        assert!(object.contains_key("windSpeed"));
        assert!(!object.contains_key("wind_speed"));
        assert!(!object.contains_key("latitude"));
        assert!(!object.contains_key("longitude"));
    }
}
