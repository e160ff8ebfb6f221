use makbuz_core::Money;

use crate::normalize::normalize;

/// Parses an amount whose thousand and decimal separators are ambiguous.
///
/// When both `.` and `,` occur the one appearing last is the decimal point;
/// a lone `,` is a decimal point; a lone `.` is left as-is. Trailing
/// non-digits are dropped. Only spaces are stripped, so a capture that ran
/// onto the next line fails to parse. Returns `None` for empty or unparsable
/// input, which is an expected outcome for noisy captures.
pub fn parse_amount(raw: &str) -> Option<Money> {
    let mut s: String = normalize(raw).chars().filter(|&c| c != ' ').collect();

    match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) if dot > comma => s = s.replace(',', ""),
        (Some(_), Some(_)) => s = s.replace('.', "").replace(',', "."),
        (None, Some(_)) => s = s.replace(',', "."),
        _ => {}
    }

    let trimmed = s.trim_end_matches(|c: char| !c.is_ascii_digit());
    if trimmed.is_empty() {
        return None;
    }
    Money::parse(trimmed)
}
