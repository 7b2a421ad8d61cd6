use crate::error::StoreError;
use crate::models::{GuestRecord, NewGuest, StayWindow, TableStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    /// Only records whose email is non-blank.
    WithEmail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Hostel,
}

/// Capability set the pipeline needs from the guest table.
///
/// Inserts are staged until [`GuestStore::commit`]; every other mutation is
/// durable when the call returns.
#[allow(async_fn_in_trait)]
pub trait GuestStore {
    async fn insert(&mut self, guest: &NewGuest) -> Result<i64, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Records ordered by identifier ascending.
    async fn list(&mut self, filter: RecordFilter) -> Result<Vec<GuestRecord>, StoreError>;

    /// Newest records first.
    async fn list_recent(&mut self, limit: usize) -> Result<Vec<GuestRecord>, StoreError>;

    async fn delete_by_ids(&mut self, ids: &[i64]) -> Result<u64, StoreError>;

    /// Full point-in-time copy of the table; returns the snapshot name.
    async fn copy_table(&mut self) -> Result<String, StoreError>;

    /// Distinct normalized emails among records whose stay overlaps `window`.
    /// Ungrouped queries return a single `(None, count)` entry; grouped queries
    /// use `None` for records without a group value.
    async fn count_distinct(
        &mut self,
        window: StayWindow,
        group_by: Option<GroupBy>,
    ) -> Result<Vec<(Option<String>, i64)>, StoreError>;

    async fn table_stats(&mut self) -> Result<TableStats, StoreError>;
}

#[cfg(test)]
pub mod memory {
    use std::collections::{BTreeMap, HashSet};

    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::email::normalize_key;

    /// A missing check-in is open towards the past, a missing check-out towards the future.
    pub fn overlaps(
        window: &StayWindow,
        checkin: Option<NaiveDate>,
        checkout: Option<NaiveDate>,
    ) -> bool {
        let before = checkout.is_some_and(|out| out < window.start);
        let after = checkin.is_some_and(|inn| inn > window.end);
        !(before || after)
    }

    /// In-process store with the same uniqueness rule as the Postgres schema
    /// and switches for injecting failures.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        committed: Vec<GuestRecord>,
        pending: Vec<GuestRecord>,
        next_id: i64,
        pub enforce_unique_email: bool,
        pub failing_emails: HashSet<String>,
        /// Zero-based index of the delete call that should fail.
        pub fail_delete_call: Option<usize>,
        pub fail_backup: bool,
        pub fail_commit: bool,
        pub delete_batches: Vec<usize>,
        pub snapshots: Vec<(String, usize)>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self {
                enforce_unique_email: true,
                ..Self::default()
            }
        }

        /// Seeds committed rows directly, bypassing the uniqueness rule, the way
        /// legacy imports did before the index existed.
        pub fn seed(&mut self, emails: &[&str]) {
            for email in emails {
                let record = self.build(&NewGuest {
                    first_name: String::new(),
                    last_name: String::new(),
                    email: email.to_string(),
                    phone: String::new(),
                    checkin: None,
                    checkout: None,
                    country: String::new(),
                    city: String::new(),
                    postal_code: None,
                    consent: true,
                    hostel: None,
                });
                self.committed.push(record);
            }
        }

        pub fn push(&mut self, guest: NewGuest) -> i64 {
            let record = self.build(&guest);
            let id = record.id;
            self.committed.push(record);
            id
        }

        pub fn committed(&self) -> &[GuestRecord] {
            &self.committed
        }

        pub fn pending_len(&self) -> usize {
            self.pending.len()
        }

        fn build(&mut self, guest: &NewGuest) -> GuestRecord {
            self.next_id += 1;
            let now = Utc::now();
            GuestRecord {
                id: self.next_id,
                first_name: guest.first_name.clone(),
                last_name: guest.last_name.clone(),
                email: guest.email.clone(),
                phone: guest.phone.clone(),
                checkin: guest.checkin,
                checkout: guest.checkout,
                country: guest.country.clone(),
                city: guest.city.clone(),
                postal_code: guest.postal_code.clone(),
                consent: guest.consent,
                hostel: guest.hostel.clone(),
                created_at: now,
                updated_at: now,
            }
        }

        fn visible(&self) -> impl Iterator<Item = &GuestRecord> {
            self.committed.iter().chain(self.pending.iter())
        }
    }

    impl GuestStore for MemoryStore {
        async fn insert(&mut self, guest: &NewGuest) -> Result<i64, StoreError> {
            if self.failing_emails.contains(&guest.email) {
                return Err(StoreError::Rejected(format!("insert refused for {}", guest.email)));
            }
            let key = normalize_key(&guest.email);
            if self.enforce_unique_email
                && !key.is_empty()
                && self.visible().any(|r| normalize_key(&r.email) == key)
            {
                return Err(StoreError::UniqueViolation {
                    email: guest.email.clone(),
                });
            }
            let record = self.build(guest);
            let id = record.id;
            self.pending.push(record);
            Ok(id)
        }

        async fn commit(&mut self) -> Result<(), StoreError> {
            if self.fail_commit {
                self.pending.clear();
                return Err(StoreError::Rejected("commit refused".to_string()));
            }
            self.committed.append(&mut self.pending);
            Ok(())
        }

        async fn list(&mut self, filter: RecordFilter) -> Result<Vec<GuestRecord>, StoreError> {
            let mut records: Vec<GuestRecord> = self
                .committed
                .iter()
                .filter(|r| filter == RecordFilter::All || !r.email.trim().is_empty())
                .cloned()
                .collect();
            records.sort_by_key(|r| r.id);
            Ok(records)
        }

        async fn list_recent(&mut self, limit: usize) -> Result<Vec<GuestRecord>, StoreError> {
            let mut records = self.committed.clone();
            records.sort_by_key(|r| std::cmp::Reverse(r.id));
            records.truncate(limit);
            Ok(records)
        }

        async fn delete_by_ids(&mut self, ids: &[i64]) -> Result<u64, StoreError> {
            let call = self.delete_batches.len();
            self.delete_batches.push(ids.len());
            if self.fail_delete_call == Some(call) {
                return Err(StoreError::Rejected(format!("delete batch {call} refused")));
            }
            let doomed: HashSet<i64> = ids.iter().copied().collect();
            let before = self.committed.len();
            self.committed.retain(|r| !doomed.contains(&r.id));
            Ok((before - self.committed.len()) as u64)
        }

        async fn copy_table(&mut self) -> Result<String, StoreError> {
            if self.fail_backup {
                return Err(StoreError::Rejected("backup refused".to_string()));
            }
            let name = format!("guests_backup_{}", self.snapshots.len() + 1);
            self.snapshots.push((name.clone(), self.committed.len()));
            Ok(name)
        }

        async fn count_distinct(
            &mut self,
            window: StayWindow,
            group_by: Option<GroupBy>,
        ) -> Result<Vec<(Option<String>, i64)>, StoreError> {
            let mut groups: BTreeMap<Option<String>, HashSet<String>> = BTreeMap::new();
            for record in self.committed.iter() {
                let key = normalize_key(&record.email);
                if key.is_empty() || !overlaps(&window, record.checkin, record.checkout) {
                    continue;
                }
                let group = match group_by {
                    Some(GroupBy::Hostel) => record
                        .hostel
                        .as_deref()
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .map(str::to_string),
                    None => None,
                };
                groups.entry(group).or_default().insert(key);
            }
            if group_by.is_none() && groups.is_empty() {
                return Ok(vec![(None, 0)]);
            }
            Ok(groups
                .into_iter()
                .map(|(group, emails)| (group, emails.len() as i64))
                .collect())
        }

        async fn table_stats(&mut self) -> Result<TableStats, StoreError> {
            let with_email: Vec<String> = self
                .committed
                .iter()
                .map(|r| normalize_key(&r.email))
                .filter(|key| !key.is_empty())
                .collect();
            let unique = with_email.iter().collect::<HashSet<_>>().len() as i64;
            let records_with_email = with_email.len() as i64;
            Ok(TableStats {
                total_records: self.committed.len() as i64,
                records_with_email,
                unique_emails: unique,
                duplicates: records_with_email - unique,
            })
        }
    }
}
