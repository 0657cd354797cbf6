//! Feed a whole chat log through a fresh divider

use crate::classifier::{Classifier, Diagnostic};
use crate::divider::{TimeDivider, TimePeriod};
use crate::message::ChatLog;

const CHECKPOINTS: usize = 10;

#[derive(Debug, Clone)]
pub struct Analysis {
    pub divider: TimeDivider,
    pub diagnostics: Vec<Diagnostic>,
}

/// Ingest every message of `chat` in order.
///
/// `progress(done, total)` is called at each tenth of the way through and once
/// more when finished.
pub fn analyze(
    chat: &ChatLog,
    period: TimePeriod,
    classifier: Classifier,
    mut progress: impl FnMut(usize, usize),
) -> Analysis {
    let total = chat.messages.len();
    let step = total / CHECKPOINTS;

    let mut divider = TimeDivider::with_classifier(period, classifier);
    let mut diagnostics = Vec::new();

    for (done, msg) in chat.messages.iter().enumerate() {
        if step > 0 && done > 0 && done % step == 0 && done / step < CHECKPOINTS {
            progress(done, total);
        }
        diagnostics.extend(divider.ingest(msg));
    }
    progress(total, total);

    tracing::debug!(
        messages = total,
        buckets = divider.len(),
        diagnostics = diagnostics.len(),
        period = %period,
        "analysis finished"
    );

    Analysis {
        divider,
        diagnostics,
    }
}
