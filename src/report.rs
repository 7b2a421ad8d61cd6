use std::fmt::Write;

use crate::analysis::{self, EmailAnalysis};
use crate::models::{CleanupReport, ExportReport, GuestRecord, IngestReport, OverlapCounts, TableStats};
use crate::{dedupe, overlap};

const SHOWN_IDS: usize = 20;

pub fn build_ingest_report(report: &IngestReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Guest Import Report");
    let _ = writeln!(output, "Run {}", report.run_id);
    if report.cancelled {
        let _ = writeln!(output, "Cancelled before the end of the file; processed rows were committed.");
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Outcomes");
    let _ = writeln!(output, "- processed: {}", report.processed);
    let _ = writeln!(output, "- inserted: {}", report.inserted);
    let _ = writeln!(output, "- duplicate emails skipped: {}", report.duplicate_skipped);
    let _ = writeln!(output, "- rejected by the database: {}", report.rejected);
    let _ = writeln!(output, "- missing identifying fields: {}", report.incomplete);
    if report.filtered > 0 {
        let _ = writeln!(output, "- filtered for email quality: {}", report.filtered);
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Data Quality");
    let _ = writeln!(output, "- invalid email formats: {}", report.email_invalid);
    let _ = writeln!(output, "- booking/fake emails: {}", report.fake_domain);
    let _ = writeln!(output, "- date parsing issues: {}", report.date_missing);

    if !report.failures.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Rejected Rows");
        for failure in report.failures.iter() {
            let _ = writeln!(
                output,
                "- row {} ({}): {}",
                failure.row_number, failure.email, failure.message
            );
        }
    }

    output
}

pub fn build_recent_records(records: &[GuestRecord]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Latest Records");

    if records.is_empty() {
        let _ = writeln!(output, "No guest records stored yet.");
        return output;
    }

    for record in records {
        let location = if record.city.is_empty() || record.country.is_empty() {
            "no location".to_string()
        } else {
            format!("{}, {}", record.city, record.country)
        };
        let dates = match (record.checkin, record.checkout) {
            (Some(checkin), Some(checkout)) => format!("{checkin} to {checkout}"),
            (None, Some(checkout)) => format!("checkout {checkout}"),
            _ => "no dates".to_string(),
        };
        let _ = writeln!(
            output,
            "- {} {} - {} | {} | {}",
            record.first_name, record.last_name, record.email, location, dates
        );
    }

    output
}

pub fn build_stats(label: &str, stats: &TableStats) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## {label}");
    let _ = writeln!(output, "- total records: {}", stats.total_records);
    let _ = writeln!(output, "- records with email: {}", stats.records_with_email);
    let _ = writeln!(output, "- unique emails: {}", stats.unique_emails);
    let _ = writeln!(output, "- duplicate records: {}", stats.duplicates);
    output
}

pub fn build_cleanup_report(report: &CleanupReport) -> String {
    let mut output = String::new();
    let mode = if report.dry_run { " (dry run)" } else { "" };

    let _ = writeln!(output, "# Duplicate Cleanup{mode}");
    let _ = writeln!(output, "Run {}", report.run_id);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Duplicate Groups");

    if report.groups.is_empty() {
        let _ = writeln!(output, "No duplicate emails found.");
    } else {
        for group in report.groups.iter().take(SHOWN_IDS) {
            let losers: Vec<String> = group.losers().map(|id| id.to_string()).collect();
            let _ = writeln!(
                output,
                "- {}: {} copies, keep {}, delete {}",
                group.email_key,
                group.members.len(),
                group.survivor().unwrap_or_default(),
                losers.join(", ")
            );
        }
        if report.groups.len() > SHOWN_IDS {
            let _ = writeln!(output, "- ... and {} more groups", report.groups.len() - SHOWN_IDS);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Deletion");
    if report.dry_run {
        let ids = dedupe::deletion_list(&report.groups);
        let shown: Vec<String> = ids.iter().take(SHOWN_IDS).map(|id| id.to_string()).collect();
        let more = if ids.len() > SHOWN_IDS { ", ..." } else { "" };
        let _ = writeln!(output, "Would delete {} records: [{}{more}]", report.planned, shown.join(", "));
    } else {
        if let Some(backup) = &report.backup_table {
            let _ = writeln!(output, "- backup: {backup}");
        }
        let _ = writeln!(output, "- planned: {}", report.planned);
        let _ = writeln!(output, "- deleted: {} in {} batches", report.deleted, report.batches);
        if report.cancelled {
            let _ = writeln!(output, "- cancelled before all batches ran");
        }
    }

    output
}

pub fn build_export_report(report: &ExportReport, fake_domains: &[String]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Brevo Export");
    let _ = writeln!(output, "- records read: {}", report.total_records);
    let _ = writeln!(output, "- exported: {}", report.exported);
    let _ = writeln!(output, "- invalid email formats skipped: {}", report.invalid_email);
    let _ = writeln!(output, "- booking/fake emails skipped: {}", report.fake_domain);
    let _ = writeln!(output, "- filtered domains: {}", fake_domains.join(", "));
    let _ = writeln!(output, "- success rate: {:.1}%", report.success_rate());
    let _ = writeln!(output, "- file: {}", report.path);
    output
}

pub fn build_overlap_report(counts: &OverlapCounts) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Guests Overlapping {}", counts.year);
    let _ = writeln!(output, "Total distinct emails: {}", counts.total);

    if let Some(per_hostel) = &counts.per_hostel {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Per Hostel");
        for (hostel, count) in overlap::ranked(per_hostel) {
            let _ = writeln!(output, "- {hostel}: {count}");
        }
    }

    output
}

pub fn build_analysis_report(analysis: &EmailAnalysis, configured_filters: &[String]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Email Analysis");
    let _ = writeln!(output, "- total email records: {}", analysis.total);
    let _ = writeln!(output, "- unique emails: {}", analysis.unique);
    let _ = writeln!(output, "- duplicate records: {}", analysis.duplicate_records);
    let _ = writeln!(output, "- valid format: {}", analysis.valid_format);
    let _ = writeln!(output, "- invalid format: {}", analysis.invalid_format());
    let _ = writeln!(output, "- uniqueness rate: {:.1}%", analysis.uniqueness_rate());
    let _ = writeln!(output, "- valid format rate: {:.1}%", analysis.valid_rate());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Duplicate Emails");
    if analysis.top_duplicates.is_empty() {
        let _ = writeln!(output, "No duplicate emails found.");
    } else {
        for duplicate in analysis.top_duplicates.iter() {
            let ids: Vec<String> = duplicate.ids.iter().map(|id| id.to_string()).collect();
            let _ = writeln!(
                output,
                "- {} - {} times (ids: {})",
                duplicate.email,
                duplicate.count,
                ids.join(", ")
            );
        }
        let hidden = analysis.duplicate_emails - analysis.top_duplicates.len();
        if hidden > 0 {
            let _ = writeln!(output, "- ... and {hidden} more duplicates");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Extensions");
    for (extension, count) in analysis.extensions.iter() {
        let _ = writeln!(
            output,
            "- .{extension}: {count} ({:.1}%)",
            analysis.share(*count)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Domains");
    for domain in analysis.domains.iter() {
        let examples: Vec<&str> = domain.examples.iter().take(3).map(String::as_str).collect();
        let _ = writeln!(
            output,
            "- {}: {} ({:.1}%) e.g. {}",
            domain.domain,
            domain.count,
            analysis.share(domain.count),
            examples.join(", ")
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Suspicious Domains");
    if analysis.suspicious_domains.is_empty() {
        let _ = writeln!(output, "No obviously suspicious domains found.");
    } else {
        for (domain, count) in analysis.suspicious_domains.iter() {
            let _ = writeln!(output, "- {domain}: {count}");
        }
    }

    let suggestions = analysis::new_filters(analysis, configured_filters);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Suggested Fake-Domain Filters");
    if suggestions.is_empty() {
        let _ = writeln!(output, "No fake domains detected beyond current filters.");
    } else {
        let _ = writeln!(output, "GUEST_FAKE_DOMAINS={}", suggestions.join(","));
    }

    if !analysis.malformed.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Malformed Addresses ({})", analysis.malformed.len());
        for email in analysis.malformed.iter().take(10) {
            let _ = writeln!(output, "- {email}");
        }
    }

    output
}
