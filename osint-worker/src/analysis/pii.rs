//! Detection of personally identifiable information in free text.
//!
//! Detection is pattern based and runs in two passes over the text:
//!
//! 1. Whitespace separated tokens are checked for email addresses and IBANs
//!    (compact or printed in groups of four).
//! 2. Runs of digits and phone punctuation are checked for IPv4 addresses,
//!    US social security numbers, credit card numbers (Luhn checked) and
//!    phone numbers. Runs overlapping a match of the first pass are skipped.
//!
//! Identical values are merged into one [`PiiEntity`] that keeps a count and
//! the surrounding text of every occurrence.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::AnalysisError;

/// Bytes of surrounding text kept on each side of a match.
const CONTEXT_RADIUS: usize = 30;

/// Characters stripped from the edges of a token before matching.
const TOKEN_PUNCTUATION: &[char] = &[
    '(', ')', '[', ']', '{', '}', '<', '>', '"', '\'', ',', ';', ':', '!', '?', '.',
];

/// Kind of detected information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Email,
    Phone,
    CreditCard,
    Ssn,
    IpAddress,
    Iban,
    Other,
}

impl PiiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiType::Email => "email",
            PiiType::Phone => "phone",
            PiiType::CreditCard => "credit_card",
            PiiType::Ssn => "ssn",
            PiiType::IpAddress => "ip_address",
            PiiType::Iban => "iban",
            PiiType::Other => "other",
        }
    }
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One distinct detected value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiEntity {
    #[serde(rename = "type")]
    pub pii_type: PiiType,
    pub value: String,
    /// Number of occurrences
    pub count: usize,
    /// Surrounding text of each occurrence
    pub contexts: Vec<String>,
}

/// Outcome of one extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PiiResult {
    /// Occurrences across all entities
    pub total: usize,
    /// Distinct values in order of first appearance
    pub entities: Vec<PiiEntity>,
    /// Occurrences per type name
    pub stats: BTreeMap<String, usize>,
}

impl PiiResult {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn has_type(&self, pii_type: PiiType) -> bool {
        self.entities.iter().any(|e| e.pii_type == pii_type)
    }

    pub fn by_type(&self, pii_type: PiiType) -> Vec<&PiiEntity> {
        self.entities
            .iter()
            .filter(|e| e.pii_type == pii_type)
            .collect()
    }

    pub fn emails(&self) -> Vec<&PiiEntity> {
        self.by_type(PiiType::Email)
    }

    pub fn phones(&self) -> Vec<&PiiEntity> {
        self.by_type(PiiType::Phone)
    }

    pub fn credit_cards(&self) -> Vec<&PiiEntity> {
        self.by_type(PiiType::CreditCard)
    }

    pub fn ip_addresses(&self) -> Vec<&PiiEntity> {
        self.by_type(PiiType::IpAddress)
    }
}

/// Something that finds PII in text.
pub trait PiiExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Result<PiiResult, AnalysisError>;
}

/// Pattern based extractor used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternPiiExtractor;

impl PatternPiiExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl PiiExtractor for PatternPiiExtractor {
    fn extract(&self, text: &str) -> Result<PiiResult, AnalysisError> {
        let mut matches = scan_tokens(text);
        let numeric = scan_numeric_runs(text)
            .into_iter()
            .filter(|m| !matches.iter().any(|t| t.overlaps(m)))
            .collect::<Vec<_>>();
        matches.extend(numeric);
        matches.sort_by_key(|m| m.start);

        Ok(aggregate(text, &matches))
    }
}

#[derive(Debug)]
struct Match {
    pii_type: PiiType,
    start: usize,
    end: usize,
}

impl Match {
    fn overlaps(&self, other: &Match) -> bool {
        self.start < other.end && other.start < self.end
    }
}

fn aggregate(text: &str, matches: &[Match]) -> PiiResult {
    let mut result = PiiResult::default();
    let mut index: HashMap<(PiiType, &str), usize> = HashMap::new();

    for m in matches {
        let value = &text[m.start..m.end];
        let context = context_around(text, m.start, m.end);

        match index.get(&(m.pii_type, value)) {
            Some(&i) => {
                let entity = &mut result.entities[i];
                entity.count += 1;
                entity.contexts.push(context);
            }
            None => {
                index.insert((m.pii_type, value), result.entities.len());
                result.entities.push(PiiEntity {
                    pii_type: m.pii_type,
                    value: value.to_string(),
                    count: 1,
                    contexts: vec![context],
                });
            }
        }

        result.total += 1;
        *result.stats.entry(m.pii_type.to_string()).or_insert(0) += 1;
    }

    result
}

fn context_around(text: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(CONTEXT_RADIUS);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + CONTEXT_RADIUS).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Token pass: emails and IBANs
// ---------------------------------------------------------------------------

/// Whitespace separated tokens with their byte offsets, edge punctuation trimmed.
fn tokens(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                let raw: &str = &text[s..i];
                let lead = raw.len() - raw.trim_start_matches(TOKEN_PUNCTUATION).len();
                let trimmed = raw.trim_matches(TOKEN_PUNCTUATION);
                if !trimmed.is_empty() {
                    out.push((s + lead, trimmed));
                }
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }

    out
}

fn scan_tokens(text: &str) -> Vec<Match> {
    let tokens = tokens(text);
    let mut matches = Vec::new();
    let mut k = 0;

    while k < tokens.len() {
        let (start, token) = tokens[k];

        if is_email(token) {
            matches.push(Match {
                pii_type: PiiType::Email,
                start,
                end: start + token.len(),
            });
            k += 1;
            continue;
        }

        if is_iban(token) {
            matches.push(Match {
                pii_type: PiiType::Iban,
                start,
                end: start + token.len(),
            });
            k += 1;
            continue;
        }

        if let Some(last) = grouped_iban_end(&tokens, k) {
            let (last_start, last_token) = tokens[last];
            matches.push(Match {
                pii_type: PiiType::Iban,
                start,
                end: last_start + last_token.len(),
            });
            k = last + 1;
            continue;
        }

        k += 1;
    }

    matches
}

fn is_email(token: &str) -> bool {
    let Some((local, domain)) = token.split_once('@') else {
        return false;
    };

    if local.is_empty()
        || local.starts_with('.')
        || local.ends_with('.')
        || !local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c))
    {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let labels_ok = labels.iter().all(|l| {
        !l.is_empty()
            && !l.starts_with('-')
            && !l.ends_with('-')
            && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    let tld = labels[labels.len() - 1];
    labels_ok && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

fn is_iban(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    if !(15..=34).contains(&bytes.len())
        || !bytes[..2].iter().all(u8::is_ascii_uppercase)
        || !bytes[2..4].iter().all(u8::is_ascii_digit)
        || !bytes
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return false;
    }

    let mut remainder: u32 = 0;
    for &b in bytes[4..].iter().chain(&bytes[..4]) {
        let value = if b.is_ascii_digit() {
            u32::from(b - b'0')
        } else {
            u32::from(b - b'A') + 10
        };
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }

    remainder == 1
}

/// IBAN printed in groups of four, e.g. `GB82 WEST 1234 5698 7654 32`.
/// Returns the index of the last token of the longest valid grouping.
fn grouped_iban_end(tokens: &[(usize, &str)], first: usize) -> Option<usize> {
    let (_, head) = tokens[first];
    let head_bytes = head.as_bytes();
    if head_bytes.len() != 4
        || !head_bytes[..2].iter().all(u8::is_ascii_uppercase)
        || !head_bytes[2..].iter().all(u8::is_ascii_digit)
    {
        return None;
    }

    let mut compact = head.to_string();
    let mut candidates = Vec::new();

    for (offset, (_, group)) in tokens.iter().enumerate().skip(first + 1).take(8) {
        let valid_group = (1..=4).contains(&group.len())
            && group
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !valid_group {
            break;
        }
        compact.push_str(group);
        candidates.push((offset, compact.clone()));
        if group.len() < 4 {
            break;
        }
    }

    candidates
        .into_iter()
        .rev()
        .find(|(_, c)| is_iban(c))
        .map(|(last, _)| last)
}

// ---------------------------------------------------------------------------
// Numeric pass: IPv4, SSN, credit cards, phones
// ---------------------------------------------------------------------------

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '@'
}

fn is_run_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, ' ' | '-' | '.' | '(' | ')')
}

fn scan_numeric_runs(text: &str) -> Vec<Match> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut matches = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i].1;
        let next_is_digit = chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit());
        let starts = c.is_ascii_digit() || (matches!(c, '+' | '(') && next_is_digit);
        let boundary_before = i == 0 || !is_word_char(chars[i - 1].1);

        if !(starts && boundary_before) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && is_run_char(chars[j].1) {
            j += 1;
        }

        let run_start = chars[i].0;
        let run_end = chars.get(j).map_or(text.len(), |(b, _)| *b);
        classify_run(text, run_start, run_end, &mut matches);

        i = j;
    }

    matches
}

/// Try the longest space separated windows of a run first, left to right.
fn classify_run(text: &str, run_start: usize, run_end: usize, matches: &mut Vec<Match>) {
    let mut pieces: Vec<(usize, usize)> = Vec::new();
    let mut offset = run_start;
    for piece in text[run_start..run_end].split(' ') {
        if !piece.is_empty() {
            pieces.push((offset, offset + piece.len()));
        }
        offset += piece.len() + 1;
    }

    let mut i = 0;
    'outer: while i < pieces.len() {
        for j in (i..pieces.len()).rev() {
            let start = pieces[i].0;
            let mut end = pieces[j].1;
            while end > start && !text[..end].ends_with(|c: char| c.is_ascii_digit()) {
                end -= 1;
            }
            if end == start {
                continue;
            }

            let boundary_after = !text[end..].starts_with(is_word_char);
            if !boundary_after {
                continue;
            }

            if let Some(pii_type) = classify_numeric(&text[start..end]) {
                matches.push(Match {
                    pii_type,
                    start,
                    end,
                });
                i = j + 1;
                continue 'outer;
            }
        }
        i += 1;
    }
}

fn classify_numeric(candidate: &str) -> Option<PiiType> {
    let digits: Vec<u8> = candidate
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| b - b'0')
        .collect();

    if is_ipv4(candidate) {
        Some(PiiType::IpAddress)
    } else if is_ssn(candidate) {
        Some(PiiType::Ssn)
    } else if is_credit_card(candidate, &digits) {
        Some(PiiType::CreditCard)
    } else if is_phone(candidate, &digits) {
        Some(PiiType::Phone)
    } else {
        None
    }
}

fn is_ipv4(candidate: &str) -> bool {
    let parts: Vec<&str> = candidate.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|p| {
            (1..=3).contains(&p.len())
                && p.bytes().all(|b| b.is_ascii_digit())
                && p.parse::<u8>().is_ok()
        })
}

fn is_ssn(candidate: &str) -> bool {
    let parts: Vec<&str> = candidate.split('-').collect();
    if parts.len() != 3
        || parts.iter().any(|p| !p.bytes().all(|b| b.is_ascii_digit()))
        || parts[0].len() != 3
        || parts[1].len() != 2
        || parts[2].len() != 4
    {
        return false;
    }

    parts[0] != "000"
        && parts[0] != "666"
        && !parts[0].starts_with('9')
        && parts[1] != "00"
        && parts[2] != "0000"
}

fn is_credit_card(candidate: &str, digits: &[u8]) -> bool {
    if !(13..=19).contains(&digits.len())
        || !matches!(digits[0], 2..=6)
        || !candidate
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
        || candidate.contains("  ")
        || candidate.contains("--")
    {
        return false;
    }

    luhn_valid(digits)
}

fn luhn_valid(digits: &[u8]) -> bool {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            let d = u32::from(d);
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

fn is_phone(candidate: &str, digits: &[u8]) -> bool {
    let international = candidate.starts_with('+');
    if candidate[1..].contains('+') {
        return false;
    }

    let opens = candidate.matches('(').count();
    let closes = candidate.matches(')').count();
    if opens != closes || opens > 1 {
        return false;
    }
    if opens == 1 {
        let (Some(open), Some(close)) = (candidate.find('('), candidate.find(')')) else {
            return false;
        };
        let inside = &candidate[open + 1..close.max(open + 1)];
        if close < open || !(1..=4).contains(&inside.len()) {
            return false;
        }
    }

    if international {
        (8..=15).contains(&digits.len())
    } else {
        digits.len() == 10 || (digits.len() == 11 && digits[0] == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> PiiResult {
        PatternPiiExtractor::new().extract(text).unwrap()
    }

    fn values(result: &PiiResult, pii_type: PiiType) -> Vec<String> {
        result
            .by_type(pii_type)
            .into_iter()
            .map(|e| e.value.clone())
            .collect()
    }

    #[test]
    fn test_empty_text() {
        let result = extract("");
        assert!(result.is_empty());
        assert!(result.entities.is_empty());
        assert!(result.stats.is_empty());
    }

    #[test]
    fn test_no_pii() {
        let result = extract("The quick brown fox jumps over 3 lazy dogs in 2024.");
        assert!(result.is_empty());
    }

    #[test]
    fn test_emails() {
        let result = extract("Contact john.doe@example.com or (sales@acme.co.uk).");
        assert_eq!(
            values(&result, PiiType::Email),
            vec!["john.doe@example.com", "sales@acme.co.uk"]
        );
        assert!(result.has_type(PiiType::Email));
        assert_eq!(result.emails().len(), 2);
    }

    #[test]
    fn test_invalid_emails_ignored() {
        let result = extract("user@localhost @handle a@b.c foo@bar..com");
        assert!(result.emails().is_empty());
    }

    #[test]
    fn test_phones() {
        let result = extract("Call 555-123-4567, (555) 987-6543 or +44 20 7946 0958 today.");
        assert_eq!(
            values(&result, PiiType::Phone),
            vec!["555-123-4567", "(555) 987-6543", "+44 20 7946 0958"]
        );
    }

    #[test]
    fn test_phone_next_to_other_numbers() {
        let result = extract("Room 12 555.123.4567 ext");
        assert_eq!(values(&result, PiiType::Phone), vec!["555.123.4567"]);
    }

    #[test]
    fn test_credit_cards_require_luhn() {
        let result = extract("Visa 4111 1111 1111 1111 and bogus 4111 1111 1111 1112.");
        assert_eq!(
            values(&result, PiiType::CreditCard),
            vec!["4111 1111 1111 1111"]
        );
    }

    #[test]
    fn test_ssn() {
        let result = extract("SSN: 123-45-6789, invalid 000-12-3456");
        assert_eq!(values(&result, PiiType::Ssn), vec!["123-45-6789"]);
    }

    #[test]
    fn test_ip_addresses() {
        let result = extract("Server at 192.168.1.10, see http://10.0.0.1/admin and 999.1.1.1");
        assert_eq!(
            values(&result, PiiType::IpAddress),
            vec!["192.168.1.10", "10.0.0.1"]
        );
        assert_eq!(result.ip_addresses().len(), 2);
    }

    #[test]
    fn test_iban_compact_and_grouped() {
        let result = extract("Pay DE89370400440532013000 or GB82 WEST 1234 5698 7654 32 now");
        assert_eq!(
            values(&result, PiiType::Iban),
            vec!["DE89370400440532013000", "GB82 WEST 1234 5698 7654 32"]
        );
        assert!(result.credit_cards().is_empty());
        assert!(result.phones().is_empty());
    }

    #[test]
    fn test_repeated_values_are_merged() {
        let text = "Mail bob@example.com today. Again: bob@example.com";
        let result = extract(text);

        assert_eq!(result.total, 2);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].count, 2);
        assert_eq!(result.entities[0].contexts.len(), 2);
        assert_eq!(result.stats.get("email"), Some(&2));
    }

    #[test]
    fn test_context_surrounds_match() {
        let result = extract("Please reach out to alice@example.org for details");
        let context = &result.entities[0].contexts[0];
        assert!(context.contains("reach out to alice@example.org for details"));
    }

    #[test]
    fn test_context_respects_char_boundaries() {
        let text = "ééééééééééééééééééééé carol@example.net ééééééééééééééééééé";
        let result = extract(text);
        assert_eq!(result.emails().len(), 1);
        assert!(result.entities[0].contexts[0].contains("carol@example.net"));
    }

    #[test]
    fn test_mixed_text_stats() {
        let text = "Email a@example.com, phone 555-123-4567, card 5555 5555 5555 4444, ip 8.8.8.8";
        let result = extract(text);

        assert_eq!(result.total, 4);
        assert_eq!(result.stats.get("email"), Some(&1));
        assert_eq!(result.stats.get("phone"), Some(&1));
        assert_eq!(result.stats.get("credit_card"), Some(&1));
        assert_eq!(result.stats.get("ip_address"), Some(&1));
        let order: Vec<PiiType> = result.entities.iter().map(|e| e.pii_type).collect();
        assert_eq!(
            order,
            vec![
                PiiType::Email,
                PiiType::Phone,
                PiiType::CreditCard,
                PiiType::IpAddress
            ]
        );
    }

    #[test]
    fn test_entity_serializes_type_name() {
        let result = extract("x@example.com");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["entities"][0]["type"], "email");
        assert_eq!(json["total"], 1);
    }
}
