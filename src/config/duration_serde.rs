//! Common serde utilities for human-readable durations and byte sizes across configuration.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

/// Custom serde functions for Duration that support human-readable strings
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration_str = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&duration_str)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(
                    "a duration as seconds (number) or human-readable string (e.g., '1s', '500ms', '1m30s')",
                )
            }

            fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_secs(seconds))
            }

            fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(seconds)
                    .map(Duration::from_secs)
                    .map_err(|_| de::Error::custom(format!("Negative duration: {seconds}")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                humantime::parse_duration(value)
                    .map_err(|e| de::Error::custom(format!("Invalid duration '{value}': {e}")))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Custom serde functions for byte sizes that accept plain integers or strings like "15MiB"
pub mod byte_size {
    use super::*;
    use crate::utils::human_format::parse_byte_size;

    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    pub fn serialize<S>(bytes: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match *bytes {
            0 => serializer.serialize_u64(0),
            b if b % MIB == 0 => serializer.serialize_str(&format!("{}MiB", b / MIB)),
            b if b % KIB == 0 => serializer.serialize_str(&format!("{}KiB", b / KIB)),
            b => serializer.serialize_u64(b),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ByteSizeVisitor;

        impl Visitor<'_> for ByteSizeVisitor {
            type Value = u64;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a size in bytes (number) or human-readable string (e.g., '8KiB', '15MiB')")
            }

            fn visit_u64<E>(self, bytes: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(bytes)
            }

            fn visit_i64<E>(self, bytes: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(bytes)
                    .map_err(|_| de::Error::custom(format!("Negative size: {bytes}")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                parse_byte_size(value).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(with = "super::duration")]
        timeout: Duration,
        #[serde(with = "super::byte_size")]
        limit: u64,
    }

    #[test]
    fn test_deserialize_human_readable_values() {
        let sample: Sample = toml::from_str("timeout = \"1s\"\nlimit = \"15MiB\"").unwrap();
        assert_eq!(sample.timeout, Duration::from_secs(1));
        assert_eq!(sample.limit, 15 * 1024 * 1024);

        let sample: Sample = toml::from_str("timeout = 2\nlimit = 8192").unwrap();
        assert_eq!(sample.timeout, Duration::from_secs(2));
        assert_eq!(sample.limit, 8192);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let original = Sample {
            timeout: Duration::from_millis(1500),
            limit: 8 * 1024,
        };
        let encoded = toml::to_string(&original).unwrap();
        let decoded: Sample = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(toml::from_str::<Sample>("timeout = \"soon\"\nlimit = 1").is_err());
        assert!(toml::from_str::<Sample>("timeout = 1\nlimit = \"lots\"").is_err());
    }
}
