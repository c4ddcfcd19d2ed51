//! Logarithmic amount buckets and the historical fraud rate attached to each bucket edge.

use crate::config::FraudShareEntry;

/// Share returned when the table is empty.
pub const DEFAULT_FRAUD_SHARE: f64 = 0.01;

/// `count` edges spaced evenly in log10 between `min` and `max`, both inclusive.
pub fn log_bucket_edges(min: f64, max: f64, count: usize) -> Vec<f64> {
    if count == 0 || !(min > 0.0 && max > 0.0) {
        return Vec::new();
    }
    if count == 1 {
        return vec![min];
    }
    let lo = min.log10();
    let hi = max.log10();
    let step = (hi - lo) / (count - 1) as f64;
    (0..count).map(|i| 10f64.powf(lo + step * i as f64)).collect()
}

/// Bucket value for `amount`: the first edge strictly above it, clamped to the first and last
/// edge. Non-positive amounts land in bucket 0.
pub fn bucket_for(amount: f64, edges: &[f64]) -> f64 {
    if amount <= 0.0 || edges.is_empty() {
        return 0.0;
    }
    let idx = edges.partition_point(|e| *e <= amount);
    if idx == 0 {
        edges[0]
    } else if idx < edges.len() {
        edges[idx]
    } else {
        edges[edges.len() - 1]
    }
}

/// Fraud rate by bucket edge, kept sorted so lookups are a binary search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FraudShareTable {
    entries: Vec<FraudShareEntry>,
}

impl FraudShareTable {
    pub fn new(entries: impl IntoIterator<Item = FraudShareEntry>) -> Self {
        let mut table = Self::default();
        table.update(entries);
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FraudShareEntry] {
        &self.entries
    }

    /// Merge entries: equal bucket keys are replaced, new keys inserted in order.
    /// Non-finite keys or shares are skipped.
    pub fn update(&mut self, entries: impl IntoIterator<Item = FraudShareEntry>) -> usize {
        let mut applied = 0;
        for entry in entries {
            if !entry.bucket.is_finite() || !entry.share.is_finite() {
                continue;
            }
            match self
                .entries
                .binary_search_by(|e| e.bucket.total_cmp(&entry.bucket))
            {
                Ok(i) => self.entries[i].share = entry.share,
                Err(i) => self.entries.insert(i, entry),
            }
            applied += 1;
        }
        applied
    }

    /// Share of the key nearest to `bucket`; ties go to the lower key.
    pub fn nearest_share(&self, bucket: f64) -> f64 {
        let idx = self.entries.partition_point(|e| e.bucket < bucket);
        let below = idx.checked_sub(1).map(|i| &self.entries[i]);
        let above = self.entries.get(idx);
        match (below, above) {
            (Some(b), Some(a)) => {
                if (a.bucket - bucket).abs() < (bucket - b.bucket).abs() {
                    a.share
                } else {
                    b.share
                }
            }
            (Some(b), None) => b.share,
            (None, Some(a)) => a.share,
            (None, None) => DEFAULT_FRAUD_SHARE,
        }
    }
}
