use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{IngestError, StoreError};
use crate::models::{IngestReport, RawGuestRow, RowFailure};
use crate::normalize::{Disposition, RecordNormalizer};
use crate::store::GuestStore;

/// Terminal state of a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted(i64),
    DuplicateSkipped,
    Rejected(String),
    Incomplete,
    Filtered,
}

/// Normalizes and inserts every row, then commits once.
///
/// No single row aborts the run: uniqueness collisions are skipped and any
/// other store error rejects only that row. Only the final commit can fail
/// the run as a whole.
pub async fn ingest<S, I>(
    store: &mut S,
    normalizer: &RecordNormalizer,
    rows: I,
    cancel: &CancellationToken,
) -> Result<IngestReport, IngestError>
where
    S: GuestStore,
    I: IntoIterator<Item = RawGuestRow>,
{
    let run_id = Uuid::new_v4();
    let span = info_span!("ingest", %run_id);
    run(store, normalizer, rows, cancel, IngestReport::new(run_id))
        .instrument(span)
        .await
}

async fn run<S, I>(
    store: &mut S,
    normalizer: &RecordNormalizer,
    rows: I,
    cancel: &CancellationToken,
    mut report: IngestReport,
) -> Result<IngestReport, IngestError>
where
    S: GuestStore,
    I: IntoIterator<Item = RawGuestRow>,
{
    for row in rows {
        if cancel.is_cancelled() {
            warn!(processed = report.processed, "import cancelled, committing processed rows");
            report.cancelled = true;
            break;
        }

        report.processed += 1;
        let outcome = process_row(store, normalizer, &row, &mut report).await;
        match outcome {
            RowOutcome::Inserted(id) => {
                report.inserted += 1;
                debug!(row = row.row_number, id, "inserted");
            }
            RowOutcome::DuplicateSkipped => {
                report.duplicate_skipped += 1;
                info!(row = row.row_number, "duplicate email skipped");
            }
            RowOutcome::Rejected(message) => {
                report.rejected += 1;
                warn!(row = row.row_number, %message, "row rejected");
                report.failures.push(RowFailure {
                    row_number: row.row_number,
                    email: row.email.clone().unwrap_or_default(),
                    message,
                });
            }
            RowOutcome::Incomplete => {
                report.incomplete += 1;
                debug!(row = row.row_number, "missing identifying fields");
            }
            RowOutcome::Filtered => {
                report.filtered += 1;
                debug!(row = row.row_number, "flagged email filtered");
            }
        }
    }

    if let Err(source) = store.commit().await {
        return Err(IngestError::Commit {
            report: Box::new(report),
            source,
        });
    }

    info!(
        processed = report.processed,
        inserted = report.inserted,
        duplicates = report.duplicate_skipped,
        rejected = report.rejected,
        "import committed"
    );
    Ok(report)
}

async fn process_row<S: GuestStore>(
    store: &mut S,
    normalizer: &RecordNormalizer,
    row: &RawGuestRow,
    report: &mut IngestReport,
) -> RowOutcome {
    let normalized = normalizer.normalize(row);
    if normalized.disposition == Disposition::Incomplete {
        return RowOutcome::Incomplete;
    }

    let flags = normalized.flags;
    if !flags.is_clean() {
        debug!(row = row.row_number, ?flags, "quality flags raised");
    }
    report.email_invalid += usize::from(flags.email_invalid);
    report.fake_domain += usize::from(flags.email_is_fake_domain);
    report.date_missing += usize::from(flags.date_missing);

    if normalized.disposition == Disposition::Filtered {
        return RowOutcome::Filtered;
    }

    match store.insert(&normalized.guest).await {
        Ok(id) => RowOutcome::Inserted(id),
        Err(StoreError::UniqueViolation { .. }) => RowOutcome::DuplicateSkipped,
        Err(err) => RowOutcome::Rejected(err.to_string()),
    }
}
