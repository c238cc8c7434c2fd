use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Reads a whole number of seconds into a `Duration`.
pub fn deserialize_duration_from_seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

/// Reads a whole number of milliseconds into a `Duration`.
pub fn deserialize_duration_from_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Writes a `Duration` as whole seconds.
pub fn serialize_duration_to_seconds<S>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

/// Writes a `Duration` as whole milliseconds.
pub fn serialize_duration_to_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Timeouts {
        #[serde(
            deserialize_with = "deserialize_duration_from_seconds",
            serialize_with = "serialize_duration_to_seconds"
        )]
        delivery: Duration,
        #[serde(
            deserialize_with = "deserialize_duration_from_ms",
            serialize_with = "serialize_duration_to_ms"
        )]
        backoff: Duration,
    }

    #[test]
    fn test_durations_from_numbers() {
        let t: Timeouts = serde_json::from_str(r#"{"delivery": 30, "backoff": 250}"#).unwrap();
        assert_eq!(t.delivery, Duration::from_secs(30));
        assert_eq!(t.backoff, Duration::from_millis(250));
    }

    #[test]
    fn test_durations_to_numbers() {
        let t = Timeouts { delivery: Duration::from_secs(5), backoff: Duration::from_millis(1500) };
        assert_eq!(serde_json::to_string(&t).unwrap(), r#"{"delivery":5,"backoff":1500}"#);
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        let result: Result<Timeouts, _> =
            serde_json::from_str(r#"{"delivery": -1, "backoff": 0}"#);
        assert!(result.is_err());
    }
}
