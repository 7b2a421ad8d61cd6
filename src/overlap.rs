use std::collections::BTreeMap;

use tracing::debug;

use crate::error::OverlapError;
use crate::models::{OverlapCounts, StayWindow};
use crate::store::{GroupBy, GuestStore};

pub const UNKNOWN_HOSTEL: &str = "UNKNOWN";

/// Distinct guests whose stay touches `year`.
///
/// Records with a blank email are not guests for this count and are left out
/// of both the total and the per-hostel buckets, rather than collapsing into a
/// single empty-string guest.
///
/// The per-hostel breakdown is a separate distinct count, so its buckets need
/// not add up to the total when one email stayed in several hostels.
pub async fn count_guests<S: GuestStore>(
    store: &mut S,
    year: i32,
    per_hostel: bool,
) -> Result<OverlapCounts, OverlapError> {
    let window = StayWindow::for_year(year).ok_or(OverlapError::InvalidYear(year))?;

    let total = store
        .count_distinct(window, None)
        .await?
        .into_iter()
        .map(|(_, count)| count)
        .sum();

    let per_hostel = if per_hostel {
        let mut buckets: BTreeMap<String, i64> = BTreeMap::new();
        for (hostel, count) in store.count_distinct(window, Some(GroupBy::Hostel)).await? {
            let key = hostel.unwrap_or_else(|| UNKNOWN_HOSTEL.to_string());
            *buckets.entry(key).or_insert(0) += count;
        }
        Some(buckets)
    } else {
        None
    };

    debug!(year, total, "overlap counted");
    Ok(OverlapCounts {
        year,
        total,
        per_hostel,
    })
}

/// Hostels ordered by guest count, largest first.
pub fn ranked(per_hostel: &BTreeMap<String, i64>) -> Vec<(&str, i64)> {
    let mut rows: Vec<(&str, i64)> = per_hostel.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    rows
}
