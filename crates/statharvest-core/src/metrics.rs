//! Flat metric mapping handed from collectors to the plugin runner.

use std::collections::BTreeMap;

/// Metric key → absolute (non-differenced) value.
///
/// `BTreeMap` keeps iteration order stable so output and tests are deterministic.
pub type MetricMap = BTreeMap<String, f64>;

/// Merges metric maps left to right. On key collision the later map wins.
pub fn merge_metrics<I>(sources: I) -> MetricMap
where
    I: IntoIterator<Item = MetricMap>,
{
    sources.into_iter().fold(MetricMap::new(), |mut acc, src| {
        acc.extend(src);
        acc
    })
}
