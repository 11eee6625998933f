//! Contest history filter.

use crate::source::ExternalRatingChange;

/// Keep entries strictly newer than `watermark` (Unix ms), in judge order.
///
/// There is no boundary or regression check here: the rating history always
/// arrives complete.
pub fn select_new_contests(
    history: Vec<ExternalRatingChange>,
    watermark: i64,
) -> Vec<ExternalRatingChange> {
    history
        .into_iter()
        .filter(|entry| entry.contest_time() > watermark)
        .collect()
}
