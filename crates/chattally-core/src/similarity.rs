//! Cosine similarity between participants' usage vectors

use rayon::prelude::*;
use serde::Serialize;

use crate::counter::{CounterRecord, UsageKind};
use crate::timerange::TimeRangeCount;

pub const EVERYONE_LABEL: &str = "everyone";
const EXCLUDED_SUFFIX: &str = " else";

/// Row labels, the row × row similarity matrix, the items forming each
/// vector and the raw (un-normalized) usage vectors per row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityMatrix {
    pub kind: &'static str,
    pub min_count: u64,
    pub labels: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
    pub items: Vec<String>,
    pub usage: Vec<Vec<u64>>,
}

impl SimilarityMatrix {
    /// Similarity between two labelled rows.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == a)?;
        let j = self.labels.iter().position(|l| l == b)?;
        Some(self.matrix[i][j])
    }
}

/// Sticker usage similarity.
pub fn sticker_similarity(
    trc: &TimeRangeCount,
    min_count: u64,
    exclude_self: bool,
) -> SimilarityMatrix {
    usage_similarity(trc, UsageKind::Sticker, min_count, exclude_self)
}

/// Similarity of `kind` usage between the everyone row and each participant.
///
/// Only items used at least `min_count` times overall form the vectors.
/// With `exclude_self`, a participant compared against everyone is compared
/// against everyone *else*: their own usage is subtracted from the everyone
/// row first.
pub fn usage_similarity(
    trc: &TimeRangeCount,
    kind: UsageKind,
    min_count: u64,
    exclude_self: bool,
) -> SimilarityMatrix {
    let items: Vec<String> = kind
        .table(&trc.everyone)
        .ranked()
        .into_iter()
        .take_while(|(_, count)| *count >= min_count)
        .map(|(item, _)| item.to_string())
        .collect();

    let mut labels = vec![EVERYONE_LABEL.to_string()];
    let mut rows: Vec<&CounterRecord> = vec![&trc.everyone];
    for (name, record) in trc.participants.iter() {
        labels.push(name.to_string());
        rows.push(record);
    }

    let usage: Vec<Vec<u64>> = rows
        .iter()
        .map(|record| {
            let table = kind.table(record);
            items.iter().map(|item| table.get(item)).collect()
        })
        .collect();

    tracing::debug!(
        kind = kind.name(),
        items = items.len(),
        min_count,
        "computing usage similarity"
    );

    let n = usage.len();
    let matrix: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| pair_similarity(&usage[i], &usage[j], i == 0, j == 0, exclude_self))
                .collect()
        })
        .collect();

    if exclude_self {
        labels[0].push_str(EXCLUDED_SUFFIX);
    }

    SimilarityMatrix {
        kind: kind.name(),
        min_count,
        labels,
        matrix,
        items,
        usage,
    }
}

fn pair_similarity(a: &[u64], b: &[u64], a_all: bool, b_all: bool, exclude_self: bool) -> f64 {
    let mut va: Vec<f64> = a.iter().map(|&x| x as f64).collect();
    let mut vb: Vec<f64> = b.iter().map(|&x| x as f64).collect();

    if exclude_self {
        match (a_all, b_all) {
            (true, true) => {
                let (da, db) = (difference(&va, &vb), difference(&vb, &va));
                va = da;
                vb = db;
            }
            (true, false) => va = difference(&va, &vb),
            (false, true) => vb = difference(&vb, &va),
            (false, false) => {}
        }
    }

    normalize(&mut va);
    normalize(&mut vb);

    let divisor = norm(&va) * norm(&vb);
    let divisor = if divisor == 0.0 { 1.0 } else { divisor };
    dot(&va, &vb) / divisor
}

fn difference(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

fn normalize(v: &mut [f64]) {
    let n = norm(v);
    if n != 0.0 {
        v.iter_mut().for_each(|x| *x /= n);
    }
}
