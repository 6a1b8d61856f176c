//! Enumerated column values (tiers, platforms, lifecycle states).

use std::str::FromStr;

/// Error type for parsing a stored enum value from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl std::fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Subscription tier of an organization
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionTier {
    Free,
    Premium,
}

string_enum!(SubscriptionTier, "subscription tier", {
    Free => "FREE",
    Premium => "PREMIUM",
});

/// Social network a post was published on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Platform {
    X,
    Linkedin,
    Threads,
    Facebook,
}

string_enum!(Platform, "platform", {
    X => "X",
    Linkedin => "LINKEDIN",
    Threads => "THREADS",
    Facebook => "FACEBOOK",
});

impl Platform {
    /// Marker a post must carry in front of the referral keyword.
    ///
    /// X and Threads use mention-style tags, LinkedIn and Facebook hashtags.
    pub fn keyword_marker(&self) -> char {
        match self {
            Platform::X | Platform::Threads => '@',
            Platform::Linkedin | Platform::Facebook => '#',
        }
    }

    /// The full token (marker + keyword) a post on this platform must contain.
    pub fn required_keyword(&self, keyword: &str) -> String {
        format!("{}{}", self.keyword_marker(), keyword)
    }
}

/// Lifecycle state of a social submission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubmissionStatus {
    Verifying,
    Verified,
    Failed,
    Revoked,
}

string_enum!(SubmissionStatus, "submission status", {
    Verifying => "VERIFYING",
    Verified => "VERIFIED",
    Failed => "FAILED",
    Revoked => "REVOKED",
});

/// Why a submission ended up FAILED
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureReason {
    KeywordMissing,
    DuplicateCaption,
    VerificationError,
}

string_enum!(FailureReason, "failure reason", {
    KeywordMissing => "KEYWORD_MISSING",
    DuplicateCaption => "DUPLICATE_CAPTION",
    VerificationError => "VERIFICATION_ERROR",
});

impl FailureReason {
    /// User-facing explanation.
    pub fn message(&self) -> &'static str {
        match self {
            FailureReason::KeywordMissing => "The post does not contain the required tag.",
            FailureReason::DuplicateCaption => {
                "The caption is nearly identical to one of your recent posts."
            }
            FailureReason::VerificationError => {
                "We could not check the post right now. Please submit it again later."
            }
        }
    }
}

/// Connection state of an account slot. Anything but DISABLED counts as active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotStatus {
    Disabled,
    Registered,
    Connecting,
    Connected,
}

string_enum!(SlotStatus, "slot status", {
    Disabled => "DISABLED",
    Registered => "REGISTERED",
    Connecting => "CONNECTING",
    Connected => "CONNECTED",
});

impl SlotStatus {
    pub fn is_active(&self) -> bool {
        !matches!(self, SlotStatus::Disabled)
    }
}

/// Scheduling state of a durable workflow task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
}

string_enum!(TaskStatus, "task status", {
    Pending => "PENDING",
    Running => "RUNNING",
    Completed => "COMPLETED",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip_and_markers() {
        for p in [
            Platform::X,
            Platform::Linkedin,
            Platform::Threads,
            Platform::Facebook,
        ] {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
        assert_eq!(Platform::X.required_keyword("shoutout"), "@shoutout");
        assert_eq!(Platform::Threads.required_keyword("shoutout"), "@shoutout");
        assert_eq!(Platform::Linkedin.required_keyword("shoutout"), "#shoutout");
        assert_eq!(Platform::Facebook.required_keyword("shoutout"), "#shoutout");
    }

    #[test]
    fn test_parse_error_names_kind() {
        let err = "BLUESKY".parse::<Platform>().unwrap_err();
        assert_eq!(err.to_string(), "invalid platform: BLUESKY");
    }

    #[test]
    fn test_slot_activity() {
        assert!(!SlotStatus::Disabled.is_active());
        assert!(SlotStatus::Registered.is_active());
        assert!(SlotStatus::Connecting.is_active());
        assert!(SlotStatus::Connected.is_active());
    }
}
