use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::CleanupConfig;
use crate::email::normalize_key;
use crate::error::ResolveError;
use crate::models::{CleanupReport, DuplicateGroup, GuestRecord};
use crate::store::{GuestStore, RecordFilter};

/// Groups records by normalized email and keeps only groups with more than one member.
///
/// Members are ordered by identifier so the first one is the survivor. Groups
/// come back in the order their survivor was first seen.
pub fn find_duplicates<'a, I>(records: I) -> Vec<DuplicateGroup>
where
    I: IntoIterator<Item = (i64, &'a str)>,
{
    let mut sorted: Vec<(i64, &str)> = records
        .into_iter()
        .filter(|(_, email)| !email.trim().is_empty())
        .collect();
    sorted.sort_by_key(|(id, _)| *id);

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    for (id, email) in sorted {
        let key = normalize_key(email);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(DuplicateGroup {
                email_key: key,
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].members.push((id, email.to_string()));
    }

    groups.retain(|group| group.members.len() > 1);
    groups
}

/// Every non-survivor, group by group.
pub fn deletion_list(groups: &[DuplicateGroup]) -> Vec<i64> {
    groups.iter().flat_map(|group| group.losers()).collect()
}

pub struct DuplicateResolver {
    config: CleanupConfig,
}

impl DuplicateResolver {
    pub fn new(config: CleanupConfig) -> Self {
        Self { config }
    }

    /// Removes every record whose normalized email already belongs to a lower identifier.
    ///
    /// The table is copied first when backups are enabled, and nothing is deleted if
    /// that copy fails. Deletion runs in bounded batches; a failing batch stops the run
    /// and earlier batches stay deleted.
    pub async fn resolve<S: GuestStore>(
        &self,
        store: &mut S,
        cancel: &CancellationToken,
    ) -> Result<CleanupReport, ResolveError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("dedupe", %run_id, dry_run = self.config.dry_run);
        self.run(store, cancel, run_id).instrument(span).await
    }

    async fn run<S: GuestStore>(
        &self,
        store: &mut S,
        cancel: &CancellationToken,
        run_id: Uuid,
    ) -> Result<CleanupReport, ResolveError> {
        let records: Vec<GuestRecord> = store
            .list(RecordFilter::WithEmail)
            .await
            .map_err(ResolveError::Load)?;
        let groups = find_duplicates(records.iter().map(|r| (r.id, r.email.as_str())));
        let ids = deletion_list(&groups);

        for group in &groups {
            info!(
                email = %group.email_key,
                copies = group.members.len(),
                keep = group.survivor(),
                "duplicate group"
            );
        }
        info!(planned = ids.len(), groups = groups.len(), "duplicates found");

        let mut report = CleanupReport {
            run_id,
            dry_run: self.config.dry_run,
            groups,
            planned: ids.len(),
            deleted: 0,
            batches: 0,
            backup_table: None,
            cancelled: false,
        };

        if self.config.dry_run || ids.is_empty() {
            return Ok(report);
        }

        if self.config.backup {
            let snapshot = store.copy_table().await.map_err(ResolveError::Backup)?;
            info!(%snapshot, "backup created");
            report.backup_table = Some(snapshot);
        }

        let batch_size = self.config.batch_size.max(1);
        for batch in ids.chunks(batch_size) {
            if cancel.is_cancelled() {
                warn!(deleted = report.deleted, planned = report.planned, "cleanup cancelled");
                report.cancelled = true;
                break;
            }
            match store.delete_by_ids(batch).await {
                Ok(deleted) => {
                    report.batches += 1;
                    report.deleted += deleted;
                    info!(batch = report.batches, deleted, "batch deleted");
                }
                Err(source) => {
                    warn!(batch = report.batches + 1, error = %source, "batch delete failed");
                    return Err(ResolveError::PartialDeletion {
                        report: Box::new(report),
                        source,
                    });
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn executing(batch_size: usize) -> DuplicateResolver {
        DuplicateResolver::new(CleanupConfig {
            batch_size,
            dry_run: false,
            backup: true,
        })
    }

    #[test]
    fn keeps_lowest_identifier_per_email() {
        let groups = find_duplicates([(1, "a@x.com"), (2, "A@X.COM"), (3, "b@y.com")]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].email_key, "a@x.com");
        assert_eq!(groups[0].survivor(), Some(1));
        assert_eq!(deletion_list(&groups), vec![2]);
    }

    #[test]
    fn survivor_does_not_depend_on_input_order() {
        let groups = find_duplicates([(9, " a@x.com"), (4, "a@x.com "), (7, "A@x.com")]);
        assert_eq!(groups[0].survivor(), Some(4));
        assert_eq!(deletion_list(&groups), vec![7, 9]);
    }

    #[test]
    fn deletion_list_follows_group_order() {
        let groups = find_duplicates([
            (1, "b@y.com"),
            (2, "a@x.com"),
            (3, "a@x.com"),
            (4, "b@y.com"),
            (5, ""),
            (6, ""),
        ]);
        assert_eq!(deletion_list(&groups), vec![4, 3]);
    }

    #[tokio::test]
    async fn dry_run_leaves_store_untouched() {
        let mut store = MemoryStore::new();
        store.seed(&["a@x.com", "A@X.COM", "b@y.com"]);
        let resolver = DuplicateResolver::new(CleanupConfig::default());

        let report = resolver.resolve(&mut store, &CancellationToken::new()).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.planned, 1);
        assert_eq!(deletion_list(&report.groups), vec![2]);
        assert_eq!(report.deleted, 0);
        assert_eq!(store.committed().len(), 3);
        assert!(store.snapshots.is_empty());
        assert!(store.delete_batches.is_empty());
    }

    #[tokio::test]
    async fn second_run_finds_nothing() {
        let mut store = MemoryStore::new();
        store.seed(&["a@x.com", "A@X.COM", "b@y.com", "b@y.com "]);
        let resolver = executing(1000);
        let cancel = CancellationToken::new();

        let first = resolver.resolve(&mut store, &cancel).await.unwrap();
        assert_eq!(first.deleted, 2);
        assert_eq!(first.backup_table.as_deref(), Some("guests_backup_1"));
        let ids: Vec<i64> = store.committed().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);

        let second = resolver.resolve(&mut store, &cancel).await.unwrap();
        assert_eq!(second.planned, 0);
        assert_eq!(second.deleted, 0);
        assert_eq!(store.snapshots.len(), 1);
    }

    #[tokio::test]
    async fn deletes_in_bounded_batches() {
        let mut store = MemoryStore::new();
        let emails: Vec<&str> = std::iter::repeat("same@x.com").take(2501).collect();
        store.seed(&emails);

        let report = executing(1000)
            .resolve(&mut store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.delete_batches, vec![1000, 1000, 500]);
        assert_eq!(report.batches, 3);
        assert_eq!(report.deleted, 2500);
        assert_eq!(store.committed().len(), 1);
    }

    #[tokio::test]
    async fn failed_batch_reports_what_was_deleted() {
        let mut store = MemoryStore::new();
        let emails: Vec<&str> = std::iter::repeat("same@x.com").take(2501).collect();
        store.seed(&emails);
        store.fail_delete_call = Some(1);

        let err = executing(1000)
            .resolve(&mut store, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ResolveError::PartialDeletion { report, .. } => {
                assert_eq!(report.planned, 2500);
                assert_eq!(report.deleted, 1000);
                assert_eq!(report.batches, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.delete_batches, vec![1000, 1000]);
        assert_eq!(store.committed().len(), 1501);
    }

    #[tokio::test]
    async fn backup_failure_prevents_deletion() {
        let mut store = MemoryStore::new();
        store.seed(&["a@x.com", "a@x.com"]);
        store.fail_backup = true;

        let err = executing(1000)
            .resolve(&mut store, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Backup(_)));
        assert!(store.delete_batches.is_empty());
        assert_eq!(store.committed().len(), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_batch() {
        let mut store = MemoryStore::new();
        store.seed(&["a@x.com", "a@x.com"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = executing(1000).resolve(&mut store, &cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.deleted, 0);
        assert_eq!(store.committed().len(), 2);
    }
}
