use tracing::{debug, warn};

use crate::config::{AcceptancePolicy, PipelineConfig};
use crate::dates;
use crate::email::EmailClassifier;
use crate::models::{NewGuest, QualityFlags, RawGuestRow};

/// What the pipeline should do with a normalized row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Store,
    /// Fails the acceptance policy.
    Incomplete,
    /// Flagged email while the operator opted into filtering.
    Filtered,
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub guest: NewGuest,
    pub flags: QualityFlags,
    pub disposition: Disposition,
}

pub struct RecordNormalizer {
    config: PipelineConfig,
    classifier: EmailClassifier,
}

impl RecordNormalizer {
    pub fn new(config: PipelineConfig) -> Self {
        let classifier = EmailClassifier::new(config.fake_domains.iter().cloned());
        Self { config, classifier }
    }

    pub fn normalize(&self, row: &RawGuestRow) -> Normalized {
        let first_name = clean(row.first_name.as_deref());
        let last_name = clean(row.last_name.as_deref());
        let email = clean(row.email.as_deref());

        let checkout = match row.last_stay.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => match dates::parse(text, &self.config.date_format) {
                Ok(date) => Some(date),
                Err(err) => {
                    warn!(row = row.row_number, "{err}");
                    None
                }
            },
            None => None,
        };
        let nights = row.nights.as_deref().and_then(dates::parse_nights);
        let checkin = dates::derive_checkin(checkout, nights);
        if checkout.is_some() && nights.is_some() && checkin.is_none() {
            debug!(row = row.row_number, ?nights, "no check-in derived from stay length");
        }

        let flags = QualityFlags {
            email_invalid: !self.classifier.is_valid(&email),
            email_is_fake_domain: self.classifier.is_fake_domain(&email),
            date_missing: checkout.is_none(),
        };

        let disposition = if !accepts(self.config.policy, &first_name, &last_name, &email) {
            Disposition::Incomplete
        } else if self.config.filter_flagged && flags.email_flagged() {
            Disposition::Filtered
        } else {
            Disposition::Store
        };

        let hostel = Some(self.config.hostel.trim().to_string()).filter(|h| !h.is_empty());

        Normalized {
            guest: NewGuest {
                first_name,
                last_name,
                email,
                phone: clean(row.phone.as_deref()),
                checkin,
                checkout,
                country: clean(row.country.as_deref()),
                city: clean(row.city.as_deref()),
                postal_code: postal_code(row.postal_code.as_deref()),
                consent: self.config.consent,
                hostel,
            },
            flags,
            disposition,
        }
    }
}

pub fn accepts(policy: AcceptancePolicy, first_name: &str, last_name: &str, email: &str) -> bool {
    match policy {
        AcceptancePolicy::AnyIdentifier => {
            !(first_name.is_empty() && last_name.is_empty() && email.is_empty())
        }
        AcceptancePolicy::NameAndEmail => !first_name.is_empty() && !email.is_empty(),
    }
}

fn clean(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

/// The postal column carries a literal "None" placeholder for unknown codes.
fn postal_code(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "None")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row() -> RawGuestRow {
        RawGuestRow {
            row_number: 2,
            first_name: Some(" Lucia ".to_string()),
            last_name: Some("Perez".to_string()),
            email: Some("lucia@example.com".to_string()),
            phone: Some("+34 600 000 000".to_string()),
            city: Some("La Laguna".to_string()),
            country: Some("Spain".to_string()),
            postal_code: Some("None".to_string()),
            nights: Some("3".to_string()),
            last_stay: Some("10/03/2024".to_string()),
        }
    }

    #[test]
    fn normalizes_clean_row() {
        let normalizer = RecordNormalizer::new(PipelineConfig::default());
        let result = normalizer.normalize(&row());

        assert_eq!(result.disposition, Disposition::Store);
        assert!(result.flags.is_clean());
        assert_eq!(result.guest.first_name, "Lucia");
        assert_eq!(result.guest.checkout, NaiveDate::from_ymd_opt(2024, 3, 10));
        assert_eq!(result.guest.checkin, NaiveDate::from_ymd_opt(2024, 3, 7));
        assert_eq!(result.guest.postal_code, None);
        assert_eq!(result.guest.hostel.as_deref(), Some("Aguere"));
        assert!(result.guest.consent);
    }

    #[test]
    fn none_placeholder_only_blanks_postal_code() {
        let normalizer = RecordNormalizer::new(PipelineConfig::default());
        let mut raw = row();
        raw.first_name = Some("None".to_string());
        raw.city = Some(" None ".to_string());
        let result = normalizer.normalize(&raw);

        assert_eq!(result.guest.first_name, "None");
        assert_eq!(result.guest.city, "None");
        assert_eq!(result.guest.postal_code, None);

        raw.postal_code = Some(" 38200 ".to_string());
        let result = normalizer.normalize(&raw);
        assert_eq!(result.guest.postal_code.as_deref(), Some("38200"));
    }

    #[test]
    fn bad_date_degrades_to_missing() {
        let normalizer = RecordNormalizer::new(PipelineConfig::default());
        let mut raw = row();
        raw.last_stay = Some("2024-03-10".to_string());
        let result = normalizer.normalize(&raw);

        assert!(result.flags.date_missing);
        assert_eq!(result.guest.checkout, None);
        assert_eq!(result.guest.checkin, None);
        assert_eq!(result.disposition, Disposition::Store);
    }

    #[test]
    fn flags_do_not_block_by_default() {
        let normalizer = RecordNormalizer::new(PipelineConfig::default());
        let mut raw = row();
        raw.email = Some("123@guest.booking.com".to_string());
        let result = normalizer.normalize(&raw);

        assert!(result.flags.email_is_fake_domain);
        assert!(!result.flags.email_invalid);
        assert_eq!(result.disposition, Disposition::Store);
    }

    #[test]
    fn opt_in_filter_drops_flagged_rows() {
        let normalizer = RecordNormalizer::new(PipelineConfig {
            filter_flagged: true,
            ..PipelineConfig::default()
        });
        let mut raw = row();
        raw.email = Some("not-an-email".to_string());
        let result = normalizer.normalize(&raw);

        assert!(result.flags.email_invalid);
        assert_eq!(result.disposition, Disposition::Filtered);
    }

    #[test]
    fn acceptance_policies_differ_on_partial_rows() {
        assert!(accepts(AcceptancePolicy::AnyIdentifier, "", "Perez", ""));
        assert!(!accepts(AcceptancePolicy::AnyIdentifier, "", "", ""));
        assert!(!accepts(AcceptancePolicy::NameAndEmail, "", "Perez", "a@b.com"));
        assert!(accepts(AcceptancePolicy::NameAndEmail, "Lucia", "", "a@b.com"));
    }

    #[test]
    fn strict_policy_marks_row_incomplete() {
        let normalizer = RecordNormalizer::new(PipelineConfig {
            policy: AcceptancePolicy::NameAndEmail,
            ..PipelineConfig::default()
        });
        let mut raw = row();
        raw.first_name = None;
        assert_eq!(normalizer.normalize(&raw).disposition, Disposition::Incomplete);
    }
}
