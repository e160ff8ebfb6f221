use crate::types::DocumentKind;

re!(re_receipt_label, r"(?i)F[İIıi1]?[İIıi1]?[İIıi1]?[ŞşsS5]");

/// Whether a transcript carries a receipt ("fiş") label, tolerating the
/// usual i/ş misreadings. Deliberately weak: a single pass is only one vote.
pub fn classify_document_kind(transcript: &str) -> bool {
    re_receipt_label().is_match(transcript)
}

/// Combines per-mode votes. Any receipt vote wins, so uncertain documents
/// are treated as receipts.
pub fn combine_votes<I: IntoIterator<Item = bool>>(votes: I) -> DocumentKind {
    DocumentKind::from_is_receipt(votes.into_iter().any(|v| v))
}
