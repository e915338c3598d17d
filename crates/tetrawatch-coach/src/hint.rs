use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintCategory {
    #[display("strategy")]
    Strategy,
    #[display("danger")]
    Danger,
    #[display("opportunity")]
    Opportunity,
}

/// Coarse bucket of a hint's urgency.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    #[default]
    #[display("low")]
    Low,
    #[display("medium")]
    Medium,
    #[display("high")]
    High,
    #[display("critical")]
    Critical,
}

impl UrgencyLevel {
    #[must_use]
    pub fn from_urgency(urgency: f32) -> Self {
        if urgency >= 0.85 {
            Self::Critical
        } else if urgency >= 0.6 {
            Self::High
        } else if urgency >= 0.35 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// A piece of advice with a limited lifetime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoachingHint {
    pub category: HintCategory,
    pub message: String,
    /// In `[0, 1]`.
    pub urgency: f32,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CoachingHint {
    #[must_use]
    pub fn new(
        category: HintCategory,
        message: String,
        urgency: f32,
        confidence: f32,
        generated_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            category,
            message,
            urgency: urgency.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            generated_at,
            expires_at: generated_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    #[must_use]
    pub fn level(&self) -> UrgencyLevel {
        UrgencyLevel::from_urgency(self.urgency)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether `other` carries the same advice.
    #[must_use]
    pub fn supersedes(&self, other: &Self) -> bool {
        self.category == other.category && self.message == other.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(UrgencyLevel::from_urgency(0.0), UrgencyLevel::Low);
        assert_eq!(UrgencyLevel::from_urgency(0.349), UrgencyLevel::Low);
        assert_eq!(UrgencyLevel::from_urgency(0.35), UrgencyLevel::Medium);
        assert_eq!(UrgencyLevel::from_urgency(0.6), UrgencyLevel::High);
        assert_eq!(UrgencyLevel::from_urgency(0.85), UrgencyLevel::Critical);
        assert_eq!(UrgencyLevel::from_urgency(1.0), UrgencyLevel::Critical);
        assert!(UrgencyLevel::Low < UrgencyLevel::Medium);
        assert!(UrgencyLevel::High < UrgencyLevel::Critical);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let hint = CoachingHint::new(
            HintCategory::Danger,
            "stack high".to_owned(),
            1.5,
            1.0,
            now,
            Duration::from_secs(10),
        );
        assert!((hint.urgency - 1.0).abs() < f32::EPSILON);
        assert!(!hint.is_expired(now + chrono::Duration::seconds(9)));
        assert!(hint.is_expired(now + chrono::Duration::seconds(10)));
    }

    #[test]
    fn test_serializes_snake_case() {
        let hint = CoachingHint::new(
            HintCategory::Opportunity,
            "clear".to_owned(),
            0.4,
            1.0,
            Utc::now(),
            Duration::from_secs(1),
        );
        let json = serde_json::to_value(&hint).unwrap();
        assert_eq!(json["category"], "opportunity");
        assert_eq!(json["message"], "clear");
    }
}
