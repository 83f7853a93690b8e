//! Topics and their typed payloads.
//!
//! A topic is one independently schedulable data feed. The set of feeds
//! the dashboards consume is closed, so topics are an enum and each one
//! carries its own payload type inside the `TopicPayload` tagged union.
//!
//! Wire names (`"liveStats"`, `"analytics"`, ...) are the keys the UI
//! code uses and are preserved by `Display`/`FromStr`/serde.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

// ────────────────────────────────────────────
// Topic identity
// ────────────────────────────────────────────

/// Identifies one logical data feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    /// Headline numbers for the marketing site hero section.
    #[serde(rename = "liveStats")]
    LiveStats,
    /// Full analytics document for the admin dashboard.
    #[serde(rename = "analytics")]
    Analytics,
    /// Platform-wide totals shown on the pricing page.
    #[serde(rename = "platformStats")]
    PlatformStats,
    /// Reserved topic carrying connection transitions.
    #[serde(rename = "connection")]
    Connection,
}

impl Topic {
    /// Every topic, in a stable order.
    pub const ALL: [Self; 4] = [
        Self::LiveStats,
        Self::Analytics,
        Self::PlatformStats,
        Self::Connection,
    ];

    /// The string key used by UI code and configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LiveStats => "liveStats",
            Self::Analytics => "analytics",
            Self::PlatformStats => "platformStats",
            Self::Connection => "connection",
        }
    }

    /// Whether successful fetches for this topic are fanned out as data.
    ///
    /// The connection topic only ever broadcasts transitions.
    pub const fn carries_data(self) -> bool {
        !matches!(self, Self::Connection)
    }

    /// How long a fetched value satisfies a one-shot read.
    ///
    /// Connection checks are never cached.
    pub const fn default_cache_ttl(self) -> Duration {
        match self {
            Self::LiveStats => Duration::from_secs(5),
            Self::PlatformStats => Duration::from_secs(10),
            Self::Analytics => Duration::from_secs(30),
            Self::Connection => Duration::ZERO,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string key names no known topic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic key: {0}")]
pub struct UnknownTopicKey(pub String);

impl FromStr for Topic {
    type Err = UnknownTopicKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTopicKey(s.to_string()))
    }
}

// ────────────────────────────────────────────
// Payloads
// ────────────────────────────────────────────

/// Headline statistics derived from the analytics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStats {
    /// Currently active users.
    pub active_subscriptions: u64,
    /// Monthly API calls, in millions.
    pub monthly_api_calls: u64,
    /// Uptime label, e.g. `"99.9%"`.
    pub platform_uptime: String,
    /// Average response time label, e.g. `"1.2s"`.
    pub avg_response_time: String,
}

/// Platform-wide totals derived from the analytics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    /// Total registered users.
    pub active_subscriptions: u64,
    /// Monthly API spend, in thousands.
    pub monthly_api_spend: u64,
    /// Uptime label.
    pub platform_uptime: String,
    /// Average response time label, e.g. `"1.2ms"`.
    pub avg_response_time: String,
}

/// Uptime label reported until the server exposes a measured value.
pub const DEFAULT_UPTIME_LABEL: &str = "99.9%";

/// Average response time assumed when the server omits it (seconds).
pub const DEFAULT_AVG_RESPONSE_TIME: f64 = 1.2;

/// Seats per tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTiers {
    pub free: u64,
    pub pro: u64,
    pub enterprise: u64,
}

/// One row of the "top models" table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub name: String,
    pub requests: u64,
    pub cost: f64,
    /// Period-over-period change, percent.
    pub change: f64,
}

/// Server health block embedded in the analytics document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    #[serde(default)]
    pub uptime: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub response_time: String,
    #[serde(default)]
    pub error_rate: Option<String>,
    #[serde(default)]
    pub active_connections: Option<u64>,
}

/// The analytics document served by `/v1/analytics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsData {
    pub total_users: u64,
    pub active_users: u64,
    pub total_requests: u64,
    #[serde(default)]
    pub total_cost: f64,
    pub cost_savings: f64,
    /// Reported as either `"1.2s"` or `1.2` depending on server version.
    #[serde(deserialize_with = "text_or_number")]
    pub avg_response_time: String,
    pub user_tiers: UserTiers,
    pub top_models: Vec<ModelUsage>,
    pub system_health: SystemHealth,
}

impl AnalyticsData {
    /// Average response time as a number, if the server sent one.
    fn avg_response_secs(&self) -> f64 {
        self.avg_response_time
            .trim_end_matches(|c: char| c.is_ascii_alphabetic())
            .parse()
            .unwrap_or(DEFAULT_AVG_RESPONSE_TIME)
    }

    /// Derive the marketing-site headline numbers.
    pub fn live_stats(&self) -> LiveStats {
        LiveStats {
            active_subscriptions: self.active_users,
            monthly_api_calls: self.total_requests / 1_000_000,
            platform_uptime: DEFAULT_UPTIME_LABEL.to_string(),
            avg_response_time: format!("{}s", self.avg_response_secs()),
        }
    }

    /// Derive the platform-wide totals.
    pub fn platform_stats(&self) -> PlatformStats {
        PlatformStats {
            active_subscriptions: self.total_users,
            // Whole thousands; negative or NaN costs floor to zero.
            monthly_api_spend: (self.total_cost / 1000.0).floor().max(0.0) as u64,
            platform_uptime: DEFAULT_UPTIME_LABEL.to_string(),
            avg_response_time: format!("{}ms", self.avg_response_secs()),
        }
    }
}

/// Error detail attached to a disconnection event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionErrorInfo {
    pub message: String,
}

/// Payload broadcast on [`Topic::Connection`] when connectivity flips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ConnectionErrorInfo>,
}

/// Health probe response. Only its arrival matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: Option<String>,
}

/// Tagged union of every payload that can cross the subscriber bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic", content = "data")]
pub enum TopicPayload {
    #[serde(rename = "liveStats")]
    LiveStats(LiveStats),
    #[serde(rename = "analytics")]
    Analytics(AnalyticsData),
    #[serde(rename = "platformStats")]
    PlatformStats(PlatformStats),
    /// A health probe result; never fanned out.
    #[serde(rename = "health")]
    Health(HealthReport),
    #[serde(rename = "connection")]
    Connection(ConnectionEvent),
}

impl TopicPayload {
    /// The topic this payload belongs to.
    pub const fn topic(&self) -> Topic {
        match self {
            Self::LiveStats(_) => Topic::LiveStats,
            Self::Analytics(_) => Topic::Analytics,
            Self::PlatformStats(_) => Topic::PlatformStats,
            Self::Health(_) | Self::Connection(_) => Topic::Connection,
        }
    }

    pub const fn as_live_stats(&self) -> Option<&LiveStats> {
        match self {
            Self::LiveStats(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_analytics(&self) -> Option<&AnalyticsData> {
        match self {
            Self::Analytics(a) => Some(a),
            _ => None,
        }
    }

    pub const fn as_platform_stats(&self) -> Option<&PlatformStats> {
        match self {
            Self::PlatformStats(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_connection(&self) -> Option<&ConnectionEvent> {
        match self {
            Self::Connection(c) => Some(c),
            _ => None,
        }
    }
}

/// Accept `"1.2s"` or `1.2` and keep it as text.
fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrNumber {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match TextOrNumber::deserialize(deserializer)? {
        TextOrNumber::Text(s) => s,
        TextOrNumber::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_analytics() -> AnalyticsData {
        serde_json::from_value(serde_json::json!({
            "total_users": 15420,
            "active_users": 8920,
            "total_requests": 2_800_000,
            "total_cost": 12450.0,
            "cost_savings": 3100.5,
            "avg_response_time": 1.4,
            "user_tiers": { "free": 12000, "pro": 3000, "enterprise": 420 },
            "top_models": [
                { "name": "gpt-4o", "requests": 1200, "cost": 310.2, "change": 4.5 }
            ],
            "system_health": { "uptime": "99.9%", "response_time": "120ms" }
        }))
        .unwrap()
    }

    #[test]
    fn test_topic_keys_round_trip_through_from_str() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        }
        assert!("usage".parse::<Topic>().is_err());
    }

    #[test]
    fn test_topic_serde_uses_ui_keys() {
        let json = serde_json::to_string(&Topic::LiveStats).unwrap();
        assert_eq!(json, "\"liveStats\"");
    }

    #[test]
    fn test_live_stats_derivation() {
        let stats = sample_analytics().live_stats();
        assert_eq!(stats.active_subscriptions, 8920);
        assert_eq!(stats.monthly_api_calls, 2);
        assert_eq!(stats.platform_uptime, "99.9%");
        assert_eq!(stats.avg_response_time, "1.4s");
    }

    #[test]
    fn test_platform_stats_derivation() {
        let stats = sample_analytics().platform_stats();
        assert_eq!(stats.active_subscriptions, 15420);
        assert_eq!(stats.monthly_api_spend, 12);
        assert_eq!(stats.avg_response_time, "1.4ms");
    }

    #[test]
    fn test_avg_response_time_accepts_text() {
        let mut data = sample_analytics();
        data.avg_response_time = "0.8s".to_string();
        assert_eq!(data.live_stats().avg_response_time, "0.8s");
    }

    #[test]
    fn test_analytics_missing_field_is_rejected() {
        let result: Result<AnalyticsData, _> =
            serde_json::from_value(serde_json::json!({ "total_users": 1 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_live_stats_serializes_camel_case() {
        let value = serde_json::to_value(sample_analytics().live_stats()).unwrap();
        assert!(value.get("activeSubscriptions").is_some());
        assert!(value.get("monthlyApiCalls").is_some());
    }

    #[test]
    fn test_payload_topic_mapping() {
        let payload = TopicPayload::LiveStats(sample_analytics().live_stats());
        assert_eq!(payload.topic(), Topic::LiveStats);
        assert!(payload.as_analytics().is_none());
        let health = TopicPayload::Health(HealthReport { status: None });
        assert_eq!(health.topic(), Topic::Connection);
    }
}
