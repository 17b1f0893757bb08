//! Timestamps as they are stored in documents.
//!
//! Server timestamps are written with a fixed nine-digit fraction so that
//! plain string comparison orders them chronologically.

use std::sync::{Mutex, PoisonError};

use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description};

use super::BackendResult;

pub fn format_timestamp(at: OffsetDateTime) -> BackendResult<String> {
    Ok(at.to_offset(time::UtcOffset::UTC).format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
    ))?)
}

/// Hands out strictly increasing instants, even when the wall clock stalls.
#[derive(Debug)]
pub(crate) struct ServerClock {
    last: Mutex<OffsetDateTime>,
}

impl ServerClock {
    pub(crate) fn new() -> Self {
        Self {
            last: Mutex::new(OffsetDateTime::UNIX_EPOCH),
        }
    }

    pub(crate) fn now(&self) -> BackendResult<String> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let mut now = OffsetDateTime::now_utc();
        if now <= *last {
            now = *last + Duration::nanoseconds(1);
        }
        *last = now;
        format_timestamp(now)
    }
}

/// `#[serde(with = "...")]` adapter for optional document timestamps.
pub mod opt_timestamp {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<OffsetDateTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => s.serialize_str(&format_timestamp(*at).map_err(serde::ser::Error::custom)?),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<OffsetDateTime>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|raw| OffsetDateTime::parse(&raw, &Rfc3339).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_strictly_increasing() {
        let clock = ServerClock::new();
        let stamps: Vec<_> = (0..50).map(|_| clock.now().unwrap()).collect();
        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(stamps.iter().all(|stamp| stamp.len() == 30));
    }

    #[test]
    fn stored_timestamps_parse_back() {
        let at = OffsetDateTime::from_unix_timestamp_nanos(1_700_000_000_120_000_000).unwrap();
        let raw = format_timestamp(at).unwrap();
        assert_eq!(raw, "2023-11-14T22:13:20.120000000Z");
        assert_eq!(OffsetDateTime::parse(&raw, &Rfc3339).unwrap(), at);
    }
}
