use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::email::{domain_parts, normalize_key, validate_syntax};
use crate::error::StoreError;
use crate::store::{GuestStore, RecordFilter};

const SUSPICIOUS_KEYWORDS: &[&str] = &["guest", "booking", "noemail", "temp", "fake", "test", "example"];
const FAKE_INDICATORS: &[&str] = &["guest.booking", "expedia", "noemail", "airbnb", ".booking", "temp", "fake"];

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub examples_per_domain: usize,
    pub min_domain_count: usize,
    pub top_duplicates: usize,
    pub top_extensions: usize,
    pub top_domains: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            examples_per_domain: 5,
            min_domain_count: 2,
            top_duplicates: 20,
            top_extensions: 15,
            top_domains: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DuplicateSummary {
    pub email: String,
    pub count: usize,
    pub ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DomainSummary {
    pub domain: String,
    pub count: usize,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailAnalysis {
    pub total: usize,
    pub unique: usize,
    pub duplicate_records: usize,
    pub valid_format: usize,
    pub duplicate_emails: usize,
    pub top_duplicates: Vec<DuplicateSummary>,
    pub extensions: Vec<(String, usize)>,
    pub domains: Vec<DomainSummary>,
    pub suspicious_domains: Vec<(String, usize)>,
    pub suggested_filters: Vec<String>,
    pub malformed: Vec<String>,
}

impl EmailAnalysis {
    pub fn invalid_format(&self) -> usize {
        self.total - self.valid_format
    }

    pub fn uniqueness_rate(&self) -> f64 {
        percent(self.unique, self.total)
    }

    pub fn valid_rate(&self) -> f64 {
        percent(self.valid_format, self.total)
    }

    pub fn share(&self, count: usize) -> f64 {
        percent(count, self.total)
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Largest count first, then alphabetical.
fn most_common(counts: HashMap<String, usize>) -> Vec<(String, usize)> {
    let mut rows: Vec<(String, usize)> = counts.into_iter().collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

/// Every stored `(id, email)` pair, blank addresses included so they count as malformed.
pub async fn load_emails<S: GuestStore>(
    store: &mut S,
) -> Result<Vec<(i64, String)>, StoreError> {
    Ok(store
        .list(RecordFilter::All)
        .await?
        .into_iter()
        .map(|record| (record.id, record.email))
        .collect())
}

/// Profiles `(id, email)` pairs: duplicates, domain mix and likely booking-platform domains.
pub fn analyze(emails: &[(i64, String)], options: &AnalysisOptions) -> EmailAnalysis {
    let mut ids_by_email: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    let mut domains: HashMap<String, usize> = HashMap::new();
    let mut extensions: HashMap<String, usize> = HashMap::new();
    let mut examples: HashMap<String, Vec<String>> = HashMap::new();
    let mut malformed = Vec::new();
    let mut valid_format = 0;
    let mut blank = 0;

    for (id, email) in emails {
        let key = normalize_key(email);
        if key.is_empty() {
            blank += 1;
        } else {
            ids_by_email.entry(key).or_default().push(*id);
        }
        if validate_syntax(email.trim()) {
            valid_format += 1;
        }
        match domain_parts(email) {
            Some((domain, extension)) => {
                *domains.entry(domain.clone()).or_insert(0) += 1;
                *extensions.entry(extension).or_insert(0) += 1;
                let bucket = examples.entry(domain).or_default();
                if bucket.len() < options.examples_per_domain {
                    bucket.push(email.clone());
                }
            }
            None => malformed.push(email.clone()),
        }
    }

    let unique = ids_by_email.len();
    let mut duplicates: Vec<DuplicateSummary> = ids_by_email
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(email, ids)| DuplicateSummary {
            email,
            count: ids.len(),
            ids,
        })
        .collect();
    duplicates.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.email.cmp(&b.email)));
    let duplicate_emails = duplicates.len();
    duplicates.truncate(options.top_duplicates);

    let ranked_domains = most_common(domains);
    let suspicious_domains = ranked_domains
        .iter()
        .filter(|(domain, _)| SUSPICIOUS_KEYWORDS.iter().any(|k| domain.contains(k)))
        .cloned()
        .collect();
    let suggested_filters = ranked_domains
        .iter()
        .filter(|(domain, _)| FAKE_INDICATORS.iter().any(|k| domain.contains(k)))
        .map(|(domain, _)| format!("@{domain}"))
        .collect();
    let domain_rows = ranked_domains
        .iter()
        .take(options.top_domains)
        .filter(|(_, count)| *count >= options.min_domain_count)
        .map(|(domain, count)| DomainSummary {
            domain: domain.clone(),
            count: *count,
            examples: examples.remove(domain).unwrap_or_default(),
        })
        .collect();

    let mut extension_rows = most_common(extensions);
    extension_rows.truncate(options.top_extensions);

    EmailAnalysis {
        total: emails.len(),
        unique,
        duplicate_records: emails.len() - blank - unique,
        valid_format,
        duplicate_emails,
        top_duplicates: duplicates,
        extensions: extension_rows,
        domains: domain_rows,
        suspicious_domains,
        suggested_filters,
        malformed,
    }
}

/// Suggested suffixes not already covered by the configured filter list.
pub fn new_filters<'a>(analysis: &'a EmailAnalysis, configured: &[String]) -> Vec<&'a str> {
    let known: HashSet<String> = configured.iter().map(|d| d.to_lowercase()).collect();
    analysis
        .suggested_filters
        .iter()
        .map(String::as_str)
        .filter(|suffix| !known.contains(*suffix))
        .collect()
}
