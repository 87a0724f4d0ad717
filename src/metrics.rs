//! Numeric signal extraction from free-text state descriptions.
//!
//! Prediction oracles answer in prose. The beam needs a number, so we pull
//! the first revenue and funding figures out of the text and degrade to zero
//! when a field is absent or malformed. This is deliberately light-touch:
//! first match per field only, no aggregation across repeated mentions.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// Field name, then a short run of non-numeric filler ("of", ":", "at"),
// then an optional currency symbol, a decimal number, and an optional
// magnitude letter. The filler stops at clause punctuation so a bare field
// mention never captures a figure that belongs to the other field.
static REVENUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)revenue[^0-9$€£.,;]{0,32}[$€£]?\s*([0-9]+(?:\.[0-9]+)?)\s*([KMB])?").unwrap()
});

static FUNDING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)funding[^0-9$€£.,;]{0,32}[$€£]?\s*([0-9]+(?:\.[0-9]+)?)\s*([KMB])?").unwrap()
});

/// Metrics derived from one state description.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusinessMetrics {
    pub revenue: f64,
    pub funding: f64,
}

impl BusinessMetrics {
    /// Ranking signal used by the beam: revenue and funding weighted equally.
    pub fn score(&self) -> f64 {
        self.revenue + self.funding
    }
}

/// Derives `(revenue, funding)` from a state description. Never fails; a
/// missing or malformed field reads as zero.
pub fn extract(text: &str) -> BusinessMetrics {
    BusinessMetrics {
        revenue: first_amount(&REVENUE_RE, text),
        funding: first_amount(&FUNDING_RE, text),
    }
}

fn first_amount(re: &Regex, text: &str) -> f64 {
    let Some(caps) = re.captures(text) else {
        return 0.0;
    };
    let Ok(value) = caps[1].parse::<f64>() else {
        return 0.0;
    };
    value * magnitude(caps.get(2).map(|m| m.as_str()))
}

fn magnitude(suffix: Option<&str>) -> f64 {
    match suffix.map(str::to_ascii_uppercase).as_deref() {
        Some("K") => 1e3,
        Some("M") => 1e6,
        Some("B") => 1e9,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_revenue_and_funding_with_magnitudes() {
        let metrics = extract("revenue: $2.5M, funding: $500K");
        assert_eq!(metrics.revenue, 2_500_000.0);
        assert_eq!(metrics.funding, 500_000.0);
        assert_eq!(metrics.score(), 3_000_000.0);
    }

    #[test]
    fn missing_fields_degrade_to_zero() {
        let metrics = extract("no numbers here");
        assert_eq!(metrics.revenue, 0.0);
        assert_eq!(metrics.funding, 0.0);
    }

    #[test]
    fn field_names_are_case_insensitive() {
        let metrics = extract("Monthly Revenue of $30K. FUNDING secured: 1.2b");
        assert_eq!(metrics.revenue, 30_000.0);
        assert_eq!(metrics.funding, 1_200_000_000.0);
    }

    #[test]
    fn plain_numbers_have_no_multiplier() {
        let metrics = extract("revenue 1200, funding 0");
        assert_eq!(metrics.revenue, 1200.0);
        assert_eq!(metrics.funding, 0.0);
    }

    #[test]
    fn only_first_mention_counts() {
        let metrics = extract("revenue: $10K grew from revenue: $2K");
        assert_eq!(metrics.revenue, 10_000.0);
    }

    #[test]
    fn bare_mention_does_not_steal_the_other_fields_figure() {
        let metrics = extract("revenue grew; later, funding: $1M");
        assert_eq!(metrics.revenue, 0.0);
        assert_eq!(metrics.funding, 1_000_000.0);

        let metrics = extract("funding round closed, revenue: $2M");
        assert_eq!(metrics.funding, 0.0);
        assert_eq!(metrics.revenue, 2_000_000.0);
    }

    #[test]
    fn field_without_nearby_number_reads_zero() {
        let metrics = extract(
            "revenue is expected to improve substantially over the coming quarters somehow",
        );
        assert_eq!(metrics.revenue, 0.0);
    }
}
