//! Submission lifecycle rules and post URL normalization.
//!
//! ```text
//! VERIFYING ──> VERIFIED ──> REVOKED
//!     │  ^
//!     v  │ (resubmission)
//!   FAILED
//! ```

use chrono::{DateTime, Duration, Utc};
use shoutout_storage::{FailureReason, Platform, PostMetrics, SubmissionStatus};
use url::Url;

use crate::error::EngineError;

/// Whether a submission may move from `from` to `to`.
pub fn can_transition(from: SubmissionStatus, to: SubmissionStatus) -> bool {
    use SubmissionStatus::*;
    matches!(
        (from, to),
        (Verifying, Verified) | (Verifying, Failed) | (Verified, Revoked) | (Failed, Verifying)
    )
}

/// Result of the initial scan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitialScan {
    Verified,
    Failed(FailureReason),
}

/// Decide VERIFIED vs FAILED for a post whose content was fetched.
///
/// `near_duplicate` is only meaningful when the keyword is present; a duplicate
/// keeps `contains_keyword = true` on the failed record.
pub fn evaluate_initial_scan(metrics: &PostMetrics, near_duplicate: bool) -> InitialScan {
    if !metrics.contains_keyword {
        InitialScan::Failed(FailureReason::KeywordMissing)
    } else if near_duplicate {
        InitialScan::Failed(FailureReason::DuplicateCaption)
    } else {
        InitialScan::Verified
    }
}

/// When the scan after `scan_number` is due, or `None` once scanning is complete.
pub fn next_scan_at(
    scan_number: i32,
    total_scans: i32,
    now: DateTime<Utc>,
    delay: Duration,
) -> Option<DateTime<Utc>> {
    (scan_number < total_scans).then(|| now + delay)
}

/// Parse a platform name, accepting any case and the legacy "twitter".
pub fn parse_platform(s: &str) -> Result<Platform, EngineError> {
    let upper = s.trim().to_ascii_uppercase();
    if upper == "TWITTER" {
        return Ok(Platform::X);
    }
    upper
        .parse()
        .map_err(|_| EngineError::UnsupportedPlatform(s.to_string()))
}

fn platform_hosts(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::X => &["x.com"],
        Platform::Linkedin => &["linkedin.com"],
        Platform::Threads => &["threads.net", "threads.com"],
        Platform::Facebook => &["facebook.com", "fb.com"],
    }
}

/// Canonical `host/path` form of a post URL, used as the global dedup key.
///
/// Scheme, `www.`/`m.`/`mobile.` prefixes, query, fragment and trailing slashes are
/// dropped and `twitter.com` folds into `x.com`. The host must belong to `platform`.
/// X and Threads handles are case-insensitive, so they are lowercased.
pub fn normalize_post_url(raw: &str, platform: Platform) -> Result<String, EngineError> {
    let parsed =
        Url::parse(raw.trim()).map_err(|e| EngineError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(EngineError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| EngineError::InvalidUrl(format!("{}: missing host", raw)))?
        .to_ascii_lowercase();
    let host = ["www.", "mobile.", "m."]
        .iter()
        .find_map(|prefix| host.strip_prefix(prefix))
        .unwrap_or(host.as_str());
    let host = if host == "twitter.com" { "x.com" } else { host };

    if !platform_hosts(platform).contains(&host) {
        return Err(EngineError::InvalidUrl(format!(
            "{} is not a {} host",
            host, platform
        )));
    }

    let path = parsed.path().trim_end_matches('/');
    if path.is_empty() {
        return Err(EngineError::InvalidUrl(format!("{}: missing post path", raw)));
    }

    Ok(format!("{}{}", host, canonical_path(platform, path)))
}

/// Fold the parts of a post path that the platform treats case-insensitively.
/// X paths are handle plus numeric id; Threads post codes keep their case.
fn canonical_path(platform: Platform, path: &str) -> String {
    match platform {
        Platform::X => path.to_ascii_lowercase(),
        Platform::Threads => path
            .split('/')
            .map(|segment| {
                if segment.starts_with('@') {
                    segment.to_ascii_lowercase()
                } else {
                    segment.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("/"),
        Platform::Linkedin | Platform::Facebook => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(contains_keyword: bool) -> PostMetrics {
        PostMetrics {
            contains_keyword,
            post_text: "loving it @shoutout".into(),
            likes: 1,
            comments: 0,
            shares: 0,
        }
    }

    #[test]
    fn test_transitions() {
        use SubmissionStatus::*;
        assert!(can_transition(Verifying, Verified));
        assert!(can_transition(Verifying, Failed));
        assert!(can_transition(Verified, Revoked));
        assert!(can_transition(Failed, Verifying));
        assert!(!can_transition(Verified, Failed));
        assert!(!can_transition(Failed, Verified));
        assert!(!can_transition(Revoked, Verified));
        assert!(!can_transition(Verifying, Revoked));
    }

    #[test]
    fn test_evaluate_initial_scan() {
        assert_eq!(
            evaluate_initial_scan(&metrics(true), false),
            InitialScan::Verified
        );
        assert_eq!(
            evaluate_initial_scan(&metrics(false), false),
            InitialScan::Failed(FailureReason::KeywordMissing)
        );
        assert_eq!(
            evaluate_initial_scan(&metrics(true), true),
            InitialScan::Failed(FailureReason::DuplicateCaption)
        );
        // Keyword check wins over duplicate detection
        assert_eq!(
            evaluate_initial_scan(&metrics(false), true),
            InitialScan::Failed(FailureReason::KeywordMissing)
        );
    }

    #[test]
    fn test_next_scan_at() {
        let now = Utc::now();
        let delay = Duration::hours(24);
        assert_eq!(next_scan_at(1, 3, now, delay), Some(now + delay));
        assert_eq!(next_scan_at(2, 3, now, delay), Some(now + delay));
        assert_eq!(next_scan_at(3, 3, now, delay), None);
    }

    #[test]
    fn test_parse_platform() {
        assert_eq!(parse_platform("x").unwrap(), Platform::X);
        assert_eq!(parse_platform("Twitter").unwrap(), Platform::X);
        assert_eq!(parse_platform("linkedin").unwrap(), Platform::Linkedin);
        assert!(matches!(
            parse_platform("myspace"),
            Err(EngineError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn test_normalize_folds_variants() {
        let expected = "x.com/acme/status/123";
        for raw in [
            "https://x.com/acme/status/123",
            "https://twitter.com/acme/status/123",
            "http://www.twitter.com/acme/status/123/",
            "https://mobile.twitter.com/acme/status/123?s=20#top",
            " https://X.com/acme/status/123 ",
            "https://x.com/Acme/status/123",
            "https://twitter.com/ACME/Status/123",
        ] {
            assert_eq!(normalize_post_url(raw, Platform::X).unwrap(), expected, "{raw}");
        }
    }

    #[test]
    fn test_normalize_other_platforms() {
        assert_eq!(
            normalize_post_url(
                "https://www.linkedin.com/posts/acme_launch-activity-1?utm=x",
                Platform::Linkedin
            )
            .unwrap(),
            "linkedin.com/posts/acme_launch-activity-1"
        );
        assert_eq!(
            normalize_post_url("https://m.facebook.com/acme/posts/9", Platform::Facebook).unwrap(),
            "facebook.com/acme/posts/9"
        );
        assert_eq!(
            normalize_post_url("https://www.threads.net/@acme/post/C1", Platform::Threads)
                .unwrap(),
            "threads.net/@acme/post/C1"
        );
    }

    #[test]
    fn test_normalize_folds_handle_case_only() {
        assert_eq!(
            normalize_post_url("https://www.threads.net/@AcmeHQ/post/C1xY", Platform::Threads)
                .unwrap(),
            "threads.net/@acmehq/post/C1xY"
        );
        assert_ne!(
            normalize_post_url("https://threads.net/@acme/post/AbC", Platform::Threads).unwrap(),
            normalize_post_url("https://threads.net/@acme/post/abc", Platform::Threads).unwrap()
        );
        // LinkedIn and Facebook paths are left as written
        assert_eq!(
            normalize_post_url("https://facebook.com/AcmeCo/posts/9", Platform::Facebook)
                .unwrap(),
            "facebook.com/AcmeCo/posts/9"
        );
    }

    #[test]
    fn test_normalize_rejects_wrong_platform_and_garbage() {
        assert!(matches!(
            normalize_post_url("https://x.com/acme/status/1", Platform::Linkedin),
            Err(EngineError::InvalidUrl(_))
        ));
        assert!(normalize_post_url("not a url", Platform::X).is_err());
        assert!(normalize_post_url("ftp://x.com/acme", Platform::X).is_err());
        assert!(normalize_post_url("https://x.com/", Platform::X).is_err());
    }
}
