//! Caption near-duplicate detection.

use std::collections::HashSet;

/// Scores how alike two captions are, in `[0, 1]`.
pub trait CaptionScorer: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Jaccard similarity over lower-cased alphanumeric word sets.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenSetScorer;

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl CaptionScorer for TokenSetScorer {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a = tokens(a);
        let b = tokens(b);
        let union = a.union(&b).count();
        if union == 0 {
            return 0.0;
        }
        a.intersection(&b).count() as f64 / union as f64
    }
}

/// True if `caption` scores strictly above `threshold` against any of `others`.
pub fn is_near_duplicate<S: CaptionScorer + ?Sized>(
    scorer: &S,
    caption: &str,
    others: &[String],
    threshold: f64,
) -> bool {
    others
        .iter()
        .any(|other| scorer.similarity(caption, other) > threshold)
}
