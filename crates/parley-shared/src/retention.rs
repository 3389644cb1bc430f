//! Per-conversation retention policy and the classifier that decides
//! whether a conversation is due for clearing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// How long a conversation may sit idle before its history is cleared.
///
/// The wire and storage form is one of the literals `never`, `24h`,
/// `1week`, `30days`; anything else is rejected when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RetentionPolicy {
    #[default]
    Never,
    Day,
    Week,
    Month,
}

impl RetentionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionPolicy::Never => "never",
            RetentionPolicy::Day => "24h",
            RetentionPolicy::Week => "1week",
            RetentionPolicy::Month => "30days",
        }
    }

    /// Idle time after which a conversation becomes due, or `None` if it
    /// never does.
    pub fn threshold(&self) -> Option<Duration> {
        match self {
            RetentionPolicy::Never => None,
            RetentionPolicy::Day => Some(Duration::hours(24)),
            RetentionPolicy::Week => Some(Duration::days(7)),
            RetentionPolicy::Month => Some(Duration::days(30)),
        }
    }
}

impl std::str::FromStr for RetentionPolicy {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(RetentionPolicy::Never),
            "24h" => Ok(RetentionPolicy::Day),
            "1week" => Ok(RetentionPolicy::Week),
            "30days" => Ok(RetentionPolicy::Month),
            other => Err(ProtocolError::InvalidRetentionPolicy(other.to_string())),
        }
    }
}

impl TryFrom<String> for RetentionPolicy {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RetentionPolicy> for String {
    fn from(policy: RetentionPolicy) -> Self {
        policy.as_str().to_string()
    }
}

impl std::fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a conversation with `policy` and `last_activity` is due for
/// clearing at `now`.
///
/// Only the activity clock matters: a previous clear does not reset it.
pub fn is_due(policy: RetentionPolicy, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    match policy.threshold() {
        Some(threshold) => now.signed_duration_since(last_activity) >= threshold,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hours_ago: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(hours_ago)
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!("never".parse::<RetentionPolicy>().unwrap(), RetentionPolicy::Never);
        assert_eq!("24h".parse::<RetentionPolicy>().unwrap(), RetentionPolicy::Day);
        assert_eq!("1week".parse::<RetentionPolicy>().unwrap(), RetentionPolicy::Week);
        assert_eq!("30days".parse::<RetentionPolicy>().unwrap(), RetentionPolicy::Month);
        assert!("1day".parse::<RetentionPolicy>().is_err());
        assert!("".parse::<RetentionPolicy>().is_err());
    }

    #[test]
    fn test_serde_rejects_unknown_literal() {
        let policy: RetentionPolicy = serde_json::from_str("\"1week\"").unwrap();
        assert_eq!(policy, RetentionPolicy::Week);
        assert!(serde_json::from_str::<RetentionPolicy>("\"weekly\"").is_err());
        assert_eq!(serde_json::to_string(&RetentionPolicy::Month).unwrap(), "\"30days\"");
    }

    #[test]
    fn test_never_is_never_due() {
        let now = Utc::now();
        assert!(!is_due(RetentionPolicy::Never, at(24 * 365 * 10, now), now));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let now = Utc::now();
        assert!(is_due(RetentionPolicy::Day, at(24, now), now));
        assert!(!is_due(
            RetentionPolicy::Day,
            now - Duration::hours(24) + Duration::seconds(1),
            now
        ));
        assert!(is_due(RetentionPolicy::Week, at(24 * 7, now), now));
        assert!(!is_due(RetentionPolicy::Week, at(24 * 6, now), now));
        assert!(is_due(RetentionPolicy::Month, at(24 * 30, now), now));
        assert!(!is_due(RetentionPolicy::Month, at(24 * 29, now), now));
    }

    #[test]
    fn test_activity_in_the_future_is_not_due() {
        let now = Utc::now();
        assert!(!is_due(RetentionPolicy::Day, now + Duration::hours(1), now));
    }
}
