//! Vendor string canonicalization.
//!
//! Raw statement descriptors for the same merchant vary wildly: store
//! numbers, POS prefixes, unicode accents, corporate suffixes. Evidence
//! keyed on "the same vendor" only unions correctly when all variants
//! normalize to one key. The default pipeline applies:
//!
//! 1. NFKD Unicode decomposition + combining-mark removal (ASCII fold)
//! 2. Lowercasing
//! 3. POS/transaction prefix stripping (`POS PURCHASE`, `WEB AUTH`, ...)
//! 4. Store/location designator stripping (`#1234`, `STORE 42`, trailing digits)
//! 5. Corporate stopword removal (`inc`, `llc`, `corp`, `co`, `ltd`)
//! 6. Whitespace collapse
//!
//! Normalization is pure and deterministic. Holdout evaluation relies on
//! disjoint vendor sets producing disjoint key sets; both under-merging
//! (missed evidence) and over-merging (cross-vendor leakage) are bugs.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::types::VendorKey;

/// Trait for vendor string normalization.
///
/// Custom implementations can add tenant-specific preprocessing
/// (e.g. franchise naming schemes, bank-specific descriptor formats).
pub trait VendorNormalizer: Send + Sync {
    /// Canonicalize a raw vendor descriptor into an aggregation key.
    fn normalize(&self, raw: &str) -> VendorKey;
}

/// Multi-token POS/transaction prefixes stripped from the front, longest
/// first so `"pos purchase"` wins over `"pos"`.
const POS_PREFIXES: &[&[&str]] = &[
    &["pos", "purchase"],
    &["card", "transaction"],
    &["web", "auth"],
    &["pos"],
    &["debit"],
    &["ach"],
    &["chk"],
];

/// Tokens preceding a number that designate a store or location.
const STORE_DESIGNATORS: &[&str] = &["store", "location", "unit"];

/// Corporate suffix tokens dropped wherever they appear standalone.
const CORPORATE_STOPWORDS: &[&str] = &["inc", "llc", "corp", "co", "ltd"];

/// Default normalization pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNormalizer;

impl DefaultNormalizer {
    /// NFKD decomposition, combining-mark removal, ASCII projection,
    /// lowercasing. Non-ASCII characters with no decomposed ASCII base are
    /// dropped; punctuation becomes whitespace except `#` (store-number
    /// marker, handled during tokenization).
    fn fold(raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        for c in raw.nfkd() {
            if is_combining_mark(c) {
                continue;
            }
            if !c.is_ascii() {
                continue;
            }
            if c.is_ascii_alphanumeric() || c == '#' {
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(' ');
            }
        }
        out
    }

    /// Strip leading POS/transaction prefixes, repeatedly, so stacked
    /// descriptors like `"DEBIT POS PURCHASE ..."` fully unwrap.
    fn strip_pos_prefixes(tokens: &mut Vec<String>) {
        loop {
            let matched = POS_PREFIXES.iter().find(|prefix| {
                prefix.len() <= tokens.len()
                    && prefix
                        .iter()
                        .zip(tokens.iter())
                        .all(|(expected, actual)| *expected == actual)
            });
            match matched {
                Some(prefix) => {
                    tokens.drain(..prefix.len());
                }
                None => break,
            }
        }
    }

    /// Drop store/location designators: `#123` anywhere, `store 42` and
    /// `store #42` pairs, and trailing bare digit runs (`"starbucks 01234"`).
    fn strip_store_numbers(tokens: &mut Vec<String>) {
        fn is_number_token(token: &str) -> bool {
            let digits = token.strip_prefix('#').unwrap_or(token);
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }

        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            let is_hash_number = token.starts_with('#') && is_number_token(token);
            if is_hash_number {
                tokens.remove(i);
                continue;
            }
            let designates_store = STORE_DESIGNATORS.contains(&token.as_str())
                && tokens.get(i + 1).is_some_and(|next| is_number_token(next));
            if designates_store {
                tokens.drain(i..=i + 1);
                continue;
            }
            i += 1;
        }
        // Trailing bare digit runs are store numbers; leading or interior
        // digits ("7 eleven", "365 market") are part of the name.
        while tokens
            .last()
            .is_some_and(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
            && tokens.len() > 1
        {
            tokens.pop();
        }
    }
}

impl VendorNormalizer for DefaultNormalizer {
    fn normalize(&self, raw: &str) -> VendorKey {
        let folded = Self::fold(raw);
        let mut tokens: Vec<String> = folded
            .split_whitespace()
            // A '#' only means anything as a store-number marker ("#123");
            // stray hashes fold away.
            .filter(|token| token.chars().any(|c| c != '#'))
            .map(ToOwned::to_owned)
            .collect();

        Self::strip_pos_prefixes(&mut tokens);
        Self::strip_store_numbers(&mut tokens);
        tokens.retain(|token| !CORPORATE_STOPWORDS.contains(&token.as_str()));

        VendorKey::new(tokens.join(" "))
    }
}
