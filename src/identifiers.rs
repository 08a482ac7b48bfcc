use crate::constants::HASH_CSV_HEADER;
use crate::models::HashedIdentifier;
use csv::{ReaderBuilder, Trim};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// How candidates that are not already hex digests are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawPolicy {
    /// Only pre-hashed identifiers are accepted.
    #[default]
    HashedOnly,
    /// Non-hex candidates are normalized as phone numbers and hashed.
    HashPhones,
}

/// Outcome of normalizing an input list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    pub identifiers: BTreeSet<HashedIdentifier>,
    pub accepted: usize,
    pub rejected: usize,
}

impl NormalizeReport {
    pub fn total_lines(&self) -> usize {
        self.accepted + self.rejected
    }

    pub fn duplicates(&self) -> usize {
        self.accepted - self.identifiers.len()
    }
}

/// Normalizes one candidate identifier per line.
///
/// Each line is read as a CSV record: records with two or more fields
/// contribute their second field, single-field records the field itself.
/// Quoted fields may contain commas. Lines that cannot be turned into an
/// identifier are counted in `rejected` and skipped; nothing here aborts
/// the whole list.
pub fn normalize<I, S>(lines: I, policy: RawPolicy) -> NormalizeReport
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut report = NormalizeReport::default();
    let mut reader = ReaderBuilder::new();
    reader.has_headers(false).flexible(true).trim(Trim::All);

    for (index, line) in lines.into_iter().enumerate() {
        match normalize_line(&reader, line.as_ref(), policy) {
            Some(id) => {
                report.accepted += 1;
                report.identifiers.insert(id);
            }
            None => {
                debug!(line = index + 1, "skipping identifier line");
                report.rejected += 1;
            }
        }
    }

    if report.rejected > 0 {
        warn!(
            accepted = report.accepted,
            rejected = report.rejected,
            "some identifier lines were rejected"
        );
    }
    info!(
        distinct = report.identifiers.len(),
        duplicates = report.duplicates(),
        "identifiers normalized"
    );

    report
}

fn normalize_line(
    reader: &ReaderBuilder,
    line: &str,
    policy: RawPolicy,
) -> Option<HashedIdentifier> {
    let candidate = candidate_field(reader, line)?;
    let candidate = candidate.as_str();
    if candidate.is_empty() {
        return None;
    }

    if candidate.eq_ignore_ascii_case(HASH_CSV_HEADER) {
        return None;
    }

    if let Some(id) = HashedIdentifier::parse(candidate) {
        return Some(id);
    }

    match policy {
        RawPolicy::HashedOnly => None,
        RawPolicy::HashPhones => normalize_phone(candidate).map(|digits| hash_phone(&digits)),
    }
}

fn candidate_field(reader: &ReaderBuilder, line: &str) -> Option<String> {
    let record = match reader.from_reader(line.as_bytes()).records().next()? {
        Ok(record) => record,
        Err(e) => {
            debug!(error = %e, "unreadable csv record");
            return None;
        }
    };
    let field = if record.len() > 1 {
        record.get(1)
    } else {
        record.get(0)
    };
    field.map(str::to_string)
}

/// Reduces a phone number to its digits with the country code and without
/// a leading `+` or international zeros. Returns `None` unless the result
/// has between 7 and 15 digits.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let allowed = |c: char| c.is_ascii_digit() || " +-().".contains(c);
    if raw.is_empty() || !raw.chars().all(allowed) {
        return None;
    }

    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = digits.trim_start_matches('0');

    if (7..=15).contains(&digits.len()) {
        Some(digits.to_string())
    } else {
        None
    }
}

pub fn hash_phone(normalized: &str) -> HashedIdentifier {
    let mut h = Sha256::new();
    h.update(normalized.as_bytes());
    HashedIdentifier::from_digest(&h.finalize())
}
