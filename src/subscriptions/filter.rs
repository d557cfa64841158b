//! Filter derivation and change detection.
//!
//! [`FilterPayload::derive`] is a pure mapping from user-facing settings to
//! the canonical payload sent to the transport. Two settings values that
//! select the same data produce byte-identical payloads, so the SHA-256 of
//! the payload's JSON is a stable fingerprint for detecting no-op changes.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Inclusive bounds on one metric (market cap, volume, holders...).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl MetricRange {
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Settings as edited by the user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub chains: Vec<String>,
    pub protocols: Vec<String>,
    pub keywords: Vec<String>,
    pub ranges: BTreeMap<String, MetricRange>,
}

/// Canonical filter sent to the transport.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FilterPayload {
    pub chains: Vec<String>,
    pub protocols: Vec<String>,
    pub keywords: Vec<String>,
    pub ranges: BTreeMap<String, MetricRange>,
}

impl FilterPayload {
    /// Canonicalize settings: trimmed, lower-cased, sorted, deduplicated
    /// lists; unbounded ranges dropped. Inverted or non-finite ranges are
    /// a misconfiguration.
    pub fn derive(settings: &FeedSettings) -> Result<Self> {
        let mut ranges = BTreeMap::new();
        for (metric, range) in &settings.ranges {
            let metric = metric.trim().to_lowercase();
            if metric.is_empty() || range.is_unbounded() {
                continue;
            }
            for bound in [range.min, range.max].into_iter().flatten() {
                if !bound.is_finite() {
                    return Err(SyncError::Misconfiguration(format!(
                        "non-finite bound for {metric}"
                    )));
                }
            }
            if let (Some(min), Some(max)) = (range.min, range.max) {
                if min > max {
                    return Err(SyncError::Misconfiguration(format!(
                        "{metric}: min {min} exceeds max {max}"
                    )));
                }
            }
            ranges.insert(metric, *range);
        }

        Ok(Self {
            chains: canonical_list(&settings.chains),
            protocols: canonical_list(&settings.protocols),
            keywords: canonical_list(&settings.keywords),
            ranges,
        })
    }

    /// SHA-256 of the payload's JSON. Field and map order are fixed, so
    /// equal payloads always hash alike.
    pub fn fingerprint(&self) -> Result<FilterFingerprint> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(self)?);
        Ok(FilterFingerprint(hex::encode(hasher.finalize())))
    }
}

fn canonical_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Hex SHA-256 of a payload's canonical JSON.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FilterFingerprint(pub String);

impl fmt::Display for FilterFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

/// A payload together with its fingerprint.
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedFilter {
    pub payload: FilterPayload,
    pub fingerprint: FilterFingerprint,
}

impl DerivedFilter {
    pub fn derive(settings: &FeedSettings) -> Result<Self> {
        let payload = FilterPayload::derive(settings)?;
        let fingerprint = payload.fingerprint()?;
        Ok(Self {
            payload,
            fingerprint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(chains: &[&str]) -> FeedSettings {
        FeedSettings {
            chains: chains.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_equivalent_settings_share_fingerprint() {
        let a = DerivedFilter::derive(&settings(&["sol", "base"])).unwrap();
        let b = DerivedFilter::derive(&settings(&[" BASE", "sol", "sol", ""])).unwrap();
        assert_eq!(a.payload.chains, vec!["base", "sol"]);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint.0.len(), 64);

        let c = DerivedFilter::derive(&settings(&["sol"])).unwrap();
        assert_ne!(a.fingerprint, c.fingerprint);
    }

    #[test]
    fn test_unbounded_ranges_dropped() {
        let mut s = settings(&[]);
        s.ranges.insert("MarketCap".into(), MetricRange::default());
        let with_empty = DerivedFilter::derive(&s).unwrap();
        let without = DerivedFilter::derive(&settings(&[])).unwrap();
        assert!(with_empty.payload.ranges.is_empty());
        assert_eq!(with_empty.fingerprint, without.fingerprint);

        s.ranges.insert("MarketCap".into(), MetricRange { min: Some(1000.0), max: None });
        let bounded = DerivedFilter::derive(&s).unwrap();
        assert_eq!(
            bounded.payload.ranges.get("marketcap"),
            Some(&MetricRange { min: Some(1000.0), max: None })
        );
    }

    #[test]
    fn test_invalid_ranges() {
        let mut s = settings(&[]);
        s.ranges.insert("volume".into(), MetricRange::between(10.0, 1.0));
        assert!(matches!(
            FilterPayload::derive(&s),
            Err(SyncError::Misconfiguration(_))
        ));

        s.ranges.insert("volume".into(), MetricRange { min: None, max: Some(f64::NAN) });
        assert!(FilterPayload::derive(&s).is_err());
    }
}
