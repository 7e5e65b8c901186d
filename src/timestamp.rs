use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::SystemTime;

/// A Unix timestamp represented as a `u64`, used for proof validity windows
/// and ledger record times.
///
/// Encodes seconds since the Unix epoch (1970-01-01T00:00:00Z).
/// Serialized as a stringified integer to avoid loss of precision in JSON.
/// For example, `1699999999` becomes `"1699999999"` in the wire format.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq)]
pub struct UnixTimestamp(pub u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixTimestamp(ts))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0 + rhs)
    }
}

const SECS_PER_DAY: u64 = 24 * 60 * 60;

impl UnixTimestamp {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_secs();
        Self(now)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds elapsed from `self` to `later`. Saturates at zero when `self`
    /// is in the future relative to `later`.
    pub fn age_from(&self, later: UnixTimestamp) -> u64 {
        later.0.saturating_sub(self.0)
    }

    /// Whether both timestamps fall on the same UTC calendar day.
    pub fn same_utc_day(&self, other: UnixTimestamp) -> bool {
        self.0 / SECS_PER_DAY == other.0 / SECS_PER_DAY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_as_string() {
        let ts = UnixTimestamp(1699999999);
        let serialized = serde_json::to_string(&ts).unwrap();
        assert_eq!(serialized, "\"1699999999\"");
    }

    #[test]
    fn test_deserialize_rejects_non_integer() {
        assert!(serde_json::from_str::<UnixTimestamp>("\"soon\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("\"-5\"").is_err());
    }

    #[test]
    fn test_age_from_saturates() {
        let earlier = UnixTimestamp(100);
        let later = UnixTimestamp(400);
        assert_eq!(earlier.age_from(later), 300);
        assert_eq!(later.age_from(earlier), 0);
    }

    #[test]
    fn test_same_utc_day() {
        let morning = UnixTimestamp(1700000000);
        let later_same_day = UnixTimestamp(1700006399);
        let next_day = UnixTimestamp(1700092800);
        assert!(morning.same_utc_day(later_same_day));
        assert!(!morning.same_utc_day(next_day));
    }
}
