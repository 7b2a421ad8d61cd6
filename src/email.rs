use std::sync::LazyLock;

use regex::Regex;

static EMAIL_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern compiles")
});

/// Why an address would be refused by a zero-tolerance consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailVerdict {
    Valid,
    InvalidSyntax,
    FakeDomain,
}

/// Checks `local@domain.tld` shape. The input is matched as given, without trimming.
pub fn validate_syntax(email: &str) -> bool {
    EMAIL_SYNTAX.is_match(email)
}

/// Suffixes are expected to carry their leading `@`.
pub fn is_fake_domain<S: AsRef<str>>(email: &str, fake_domain_suffixes: &[S]) -> bool {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return false;
    }
    fake_domain_suffixes
        .iter()
        .any(|suffix| email.ends_with(&suffix.as_ref().to_lowercase()))
}

/// Grouping key used for duplicate detection and distinct counts.
pub fn normalize_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Returns the lower-cased domain and its last label, e.g. `("mail.example.com", "com")`.
pub fn domain_parts(email: &str) -> Option<(String, String)> {
    let (_, domain) = email.split_once('@')?;
    let domain = domain.trim().to_lowercase();
    let extension = match domain.rsplit_once('.') {
        Some((_, ext)) => ext.to_string(),
        None => domain.clone(),
    };
    Some((domain, extension))
}

/// Syntax check plus the configured booking-intermediary suffixes.
#[derive(Debug, Clone)]
pub struct EmailClassifier {
    fake_domains: Vec<String>,
}

impl EmailClassifier {
    pub fn new<I, S>(fake_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fake_domains: fake_domains
                .into_iter()
                .map(|suffix| suffix.into().trim().to_lowercase())
                .filter(|suffix| !suffix.is_empty())
                .collect(),
        }
    }

    pub fn is_valid(&self, email: &str) -> bool {
        validate_syntax(email)
    }

    pub fn is_fake_domain(&self, email: &str) -> bool {
        is_fake_domain(email, &self.fake_domains)
    }

    /// Syntax is checked first, so a malformed fake address reports `InvalidSyntax`.
    pub fn classify(&self, email: &str) -> EmailVerdict {
        if !self.is_valid(email) {
            EmailVerdict::InvalidSyntax
        } else if self.is_fake_domain(email) {
            EmailVerdict::FakeDomain
        } else {
            EmailVerdict::Valid
        }
    }
}
