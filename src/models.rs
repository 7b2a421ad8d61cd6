use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One spreadsheet row as read, before any normalization.
#[derive(Debug, Clone, Default)]
pub struct RawGuestRow {
    pub row_number: usize,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub nights: Option<String>,
    pub last_stay: Option<String>,
}

/// Canonical guest as persisted by the store.
#[derive(Debug, Clone, Serialize)]
pub struct GuestRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub checkin: Option<NaiveDate>,
    pub checkout: Option<NaiveDate>,
    pub country: String,
    pub city: String,
    pub postal_code: Option<String>,
    pub consent: bool,
    pub hostel: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A normalized guest that has not been assigned an identifier yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGuest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub checkin: Option<NaiveDate>,
    pub checkout: Option<NaiveDate>,
    pub country: String,
    pub city: String,
    pub postal_code: Option<String>,
    pub consent: bool,
    pub hostel: Option<String>,
}

/// Reporting-only annotations produced while normalizing a row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QualityFlags {
    pub email_invalid: bool,
    pub email_is_fake_domain: bool,
    pub date_missing: bool,
}

impl QualityFlags {
    pub fn is_clean(&self) -> bool {
        !(self.email_invalid || self.email_is_fake_domain || self.date_missing)
    }

    pub fn email_flagged(&self) -> bool {
        self.email_invalid || self.email_is_fake_domain
    }
}

/// Records sharing one normalized email, lowest identifier first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub email_key: String,
    pub members: Vec<(i64, String)>,
}

impl DuplicateGroup {
    pub fn survivor(&self) -> Option<i64> {
        self.members.first().map(|(id, _)| *id)
    }

    pub fn losers(&self) -> impl Iterator<Item = i64> + '_ {
        self.members.iter().skip(1).map(|(id, _)| *id)
    }
}

/// Inclusive calendar-year window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StayWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl StayWindow {
    pub fn for_year(year: i32) -> Option<Self> {
        Some(Self {
            start: NaiveDate::from_ymd_opt(year, 1, 1)?,
            end: NaiveDate::from_ymd_opt(year, 12, 31)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub row_number: usize,
    pub email: String,
    pub message: String,
}

/// Aggregate outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub processed: usize,
    pub inserted: usize,
    pub duplicate_skipped: usize,
    pub rejected: usize,
    pub incomplete: usize,
    pub filtered: usize,
    pub email_invalid: usize,
    pub fake_domain: usize,
    pub date_missing: usize,
    pub cancelled: bool,
    pub failures: Vec<RowFailure>,
}

impl IngestReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            processed: 0,
            inserted: 0,
            duplicate_skipped: 0,
            rejected: 0,
            incomplete: 0,
            filtered: 0,
            email_invalid: 0,
            fake_domain: 0,
            date_missing: 0,
            cancelled: false,
            failures: Vec::new(),
        }
    }
}

/// Outcome of a duplicate cleanup, dry or executed.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub groups: Vec<DuplicateGroup>,
    pub planned: usize,
    pub deleted: u64,
    pub batches: usize,
    pub backup_table: Option<String>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub total_records: i64,
    pub records_with_email: i64,
    pub unique_emails: i64,
    pub duplicates: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlapCounts {
    pub year: i32,
    pub total: i64,
    pub per_hostel: Option<BTreeMap<String, i64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub total_records: usize,
    pub exported: usize,
    pub invalid_email: usize,
    pub fake_domain: usize,
    pub path: String,
}

impl ExportReport {
    pub fn success_rate(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            self.exported as f64 / self.total_records as f64 * 100.0
        }
    }
}
