use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ExportConfig;
use crate::email::{EmailClassifier, EmailVerdict};
use crate::models::{ExportReport, GuestRecord};
use crate::store::{GuestStore, RecordFilter};

pub const HEADER: [&str; 15] = [
    "CONTACT ID",
    "EMAIL",
    "FIRSTNAME",
    "LASTNAME",
    "SMS",
    "LANDLINE_NUMBER",
    "WHATSAPP",
    "INTERESTS",
    "HOSTEL",
    "POSTAL",
    "CITY",
    "COUNTRY",
    "CHECKIN",
    "CHECKOUT",
    "OPT-IN",
];

/// Field order must match [`HEADER`].
#[derive(Debug, Serialize)]
struct BrevoRow<'a> {
    contact_id: usize,
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    sms: &'a str,
    landline_number: &'a str,
    whatsapp: &'a str,
    interests: &'a str,
    hostel: &'a str,
    postal: &'a str,
    city: &'a str,
    country: &'a str,
    checkin: String,
    checkout: String,
    opt_in: &'a str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportCounts {
    pub exported: usize,
    pub invalid_email: usize,
    pub fake_domain: usize,
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

/// Writes every record whose trimmed email passes both checks; the rest are
/// skipped and counted by reason. Contact ids number exported rows only.
pub fn write_contacts<W: Write>(
    records: &[GuestRecord],
    classifier: &EmailClassifier,
    output: W,
) -> anyhow::Result<ExportCounts> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(output);
    writer.write_record(HEADER)?;

    let mut counts = ExportCounts::default();
    for record in records {
        let email = record.email.trim();
        match classifier.classify(email) {
            EmailVerdict::InvalidSyntax => {
                counts.invalid_email += 1;
                debug!(id = record.id, email, "invalid email skipped");
                continue;
            }
            EmailVerdict::FakeDomain => {
                counts.fake_domain += 1;
                debug!(id = record.id, email, "booking email skipped");
                continue;
            }
            EmailVerdict::Valid => {}
        }

        counts.exported += 1;
        writer.serialize(BrevoRow {
            contact_id: counts.exported,
            email,
            first_name: record.first_name.trim(),
            last_name: record.last_name.trim(),
            sms: record.phone.trim(),
            landline_number: "",
            whatsapp: "",
            interests: "",
            hostel: record.hostel.as_deref().unwrap_or_default().trim(),
            postal: record.postal_code.as_deref().unwrap_or_default().trim(),
            city: record.city.trim(),
            country: record.country.trim(),
            checkin: format_date(record.checkin),
            checkout: format_date(record.checkout),
            opt_in: if record.consent { "1" } else { "0" },
        })?;
    }

    writer.flush()?;
    Ok(counts)
}

pub fn timestamped_path(config: &ExportConfig) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    config
        .output_dir
        .join(format!("{}_{stamp}.csv", config.filename_prefix))
}

pub fn export_to_file(
    records: &[GuestRecord],
    config: &ExportConfig,
    path: &Path,
) -> anyhow::Result<ExportReport> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let classifier = EmailClassifier::new(config.fake_domains.iter().cloned());
    let counts = write_contacts(records, &classifier, file)?;
    info!(
        exported = counts.exported,
        invalid = counts.invalid_email,
        fake = counts.fake_domain,
        path = %path.display(),
        "export written"
    );

    Ok(ExportReport {
        total_records: records.len(),
        exported: counts.exported,
        invalid_email: counts.invalid_email,
        fake_domain: counts.fake_domain,
        path: path.display().to_string(),
    })
}

/// Exports every stored record. Blank emails are read too, so they show up in
/// the invalid count instead of vanishing from the totals.
pub async fn export_guests<S: GuestStore>(
    store: &mut S,
    config: &ExportConfig,
    path: &Path,
) -> anyhow::Result<ExportReport> {
    let records = store.list(RecordFilter::All).await?;
    export_to_file(&records, config, path)
}
