use makbuz_core::ExtractionSettings;
use regex::Captures;

use crate::date::repair_date;
use crate::normalize::normalize;
use crate::numeric::parse_amount;
use crate::types::{DocumentKind, FieldName, FieldRecord, FieldValue, TaxRate};

// ── Compiled regex cache ─────────────────────────────────────────────────────

re!(re_date,
    r"\b(\d{2}[./-]\d{2}[./-]\d{4})\b");
re!(re_total,
    r"(?i)\btoplam(?:\s+tutar)?\b[^\d]{0,3}[*x»:/-]?\s*([\dOolIıİi.,\s]{1,20}\d)");
re!(re_total_tax,
    r"(?i)(?:toplam\s+kdv|topkdv|topkdu|topvp|topkov|topkdy|topkdi|tooopkdv|topküv|topkdw|topkdı|topkvu|topkd|topkdvı)[^\dO]{0,3}[*x»]?\s*([\dOolIıİi.,\s]{1,15}\d)");

re!(re_receipt_number,
    r"(?i)(?:f[ıiİl1|][şs5]\s*no|fiş\s*no|fişno)[^\d\n]{0,5}\s*(\d{1,4})\b");

re!(re_invoice_number,
    r"(?i)(?:fatura\s*(?:no|nu|n[o0])|fat\s*no)[^\w\d]{0,4}[:\-]?\s*((?-i:[A-ZİŞĞÜÇÖ]{1,4})[\s\-]?\d{10,16})");
re!(re_invoice_number_bare,
    r"\b[İIı]?\s*([A-ZİŞĞÜÇÖ]{3}\d{13})\b");
re!(re_tax_rate,
    r"(?i)kdv\s*oran[ıiİl1][^0-9\n]{0,40}(?:\n[^0-9\n]{0,40}){0,3}[^0-9]{0,10}(\d{1,2})\b");

re!(re_trade_registry,
    r"(?i)(?:ticaret\s*sicil\s*no|t\.?\s*s\.?\s*no|tic\s*sic\s*no|tsn|sicil\s*no)[^\d]{0,3}[*x»:]?\s*([\dOolIıİi]{6})\b");
re!(re_mersis,
    r"(?i)(?:mersis\s*no|mersis\s*number|mersis\s*nu|mers\s*no)[^\d]{0,3}[*x»:]?\s*(\d{16})\b");
re!(re_ettn,
    r"(?i)[ef][\s.:,;_-]*[t1İil][\s.:,;_-]*[t1İil][\s.:,;_-]*[nhm][\s.:,;_-]*[:\-]?\s*([a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12})");
re!(re_tax_id,
    r"(?i)(?:vergi\s*kimlik\s*no|vkn)[^\dOolIıİ]{0,3}[*x»:]?\s*([0-9OolIıİ]{10})\b");

/// Words that, when they sit right before "toplam" (separated by one
/// whitespace character), mark a subtotal or tax line instead of the grand
/// total. Includes the recognizer's usual misreadings of "ara" and "kdv".
pub const TOTAL_FALSE_TRIGGERS: &[&str] = &[
    "ara", "4ra", "afa",
    "kdv", "kdv'l", "kdv'li", "kdv’l", "kdv’li", "kdv`l", "kdv`li", "kdv´l", "kdv´li",
    "kdu", "kdy", "kdi", "kdw", "kdn", "kdx",
];

fn preceded_by_false_trigger(text: &str, start: usize) -> bool {
    let mut before = text[..start].chars().rev();
    if !before.next().is_some_and(char::is_whitespace) {
        return false;
    }
    let mut word: Vec<char> = before
        .take(8)
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect();
    word.reverse();
    let word: String = word.into_iter().collect();
    TOTAL_FALSE_TRIGGERS.iter().any(|t| word.ends_with(t))
}

/// First "toplam" match that is not a subtotal or tax line.
fn find_total(text: &str) -> Option<Captures<'_>> {
    let mut at = 0;
    while at <= text.len() {
        let caps = re_total().captures_at(text, at)?;
        let start = caps.get(0)?.start();
        if !preceded_by_false_trigger(text, start) {
            return Some(caps);
        }
        at = start + text[start..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

fn group<'t>(caps: Option<Captures<'t>>) -> Option<&'t str> {
    caps.and_then(|c| c.get(1)).map(|m| m.as_str())
}

// ── Public extraction API ─────────────────────────────────────────────────────

/// Pulls the field vocabulary out of one transcript.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    settings: ExtractionSettings,
}

impl Extractor {
    pub fn new(settings: ExtractionSettings) -> Self {
        Self { settings }
    }

    /// Extract fields from raw OCR text. Fields only appear when a pattern
    /// matched and the captured value survived its post-processing.
    pub fn extract(&self, text: &str, kind: DocumentKind) -> FieldRecord {
        let mut fields = FieldRecord::new();

        if let Some(raw) = group(re_date().captures(text)) {
            fields.insert(FieldName::Date, FieldValue::Date(repair_date(&normalize(raw))));
        }
        if let Some(total) = group(find_total(text)).and_then(parse_amount) {
            fields.insert(FieldName::Total, FieldValue::Amount(total));
        }
        if let Some(tax) = group(re_total_tax().captures(text)).and_then(parse_amount) {
            fields.insert(FieldName::TotalTax, FieldValue::Amount(tax));
        }

        match kind {
            DocumentKind::Receipt => {
                if let Some(raw) = group(re_receipt_number().captures(text)) {
                    fields.insert(FieldName::DocumentNumber, FieldValue::Text(normalize(raw)));
                }
            }
            DocumentKind::Invoice => {
                let number = group(re_invoice_number().captures(text))
                    .or_else(|| group(re_invoice_number_bare().captures(text)));
                if let Some(raw) = number {
                    fields.insert(FieldName::DocumentNumber, FieldValue::Text(normalize(raw)));
                }
                if let Some(rate) = group(re_tax_rate().captures(text)).and_then(parse_tax_rate) {
                    fields.insert(FieldName::TaxRate, FieldValue::Rate(rate));
                }
            }
        }

        if self.settings.extended_fields {
            self.extract_identifiers(text, &mut fields);
        }

        fields.insert(FieldName::DocumentKind, FieldValue::Kind(kind));
        fields
    }

    // ── Registry identifiers ─────────────────────────────────────────────────

    fn extract_identifiers(&self, text: &str, fields: &mut FieldRecord) {
        if let Some(raw) = group(re_trade_registry().captures(text)) {
            fields.insert(FieldName::TradeRegistryNumber, FieldValue::Text(normalize(raw)));
        }
        if let Some(raw) = group(re_mersis().captures(text)) {
            fields.insert(FieldName::MersisNumber, FieldValue::Text(raw.to_string()));
        }
        // UUIDs contain letters the digit normalizer would corrupt.
        if let Some(raw) = group(re_ettn().captures(text)) {
            fields.insert(FieldName::Ettn, FieldValue::Text(raw.to_lowercase()));
        }
        if let Some(raw) = group(re_tax_id().captures(text)) {
            let digits: String = normalize(raw).chars().filter(char::is_ascii_digit).collect();
            if !self.settings.excluded_tax_ids.iter().any(|own| *own == digits) {
                fields.insert(FieldName::TaxId, FieldValue::Text(digits));
            }
        }
    }
}

fn parse_tax_rate(raw: &str) -> Option<TaxRate> {
    normalize(raw).parse::<u8>().ok().and_then(TaxRate::new)
}

/// Extract with default settings.
pub fn extract_fields(transcript: &str, is_receipt: bool) -> FieldRecord {
    Extractor::default().extract(transcript, DocumentKind::from_is_receipt(is_receipt))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use makbuz_core::Money;

    fn total_of(text: &str) -> Option<Money> {
        extract_fields(text, true).get(FieldName::Total).and_then(FieldValue::as_amount)
    }

    fn text_of(record: &FieldRecord, name: FieldName) -> Option<String> {
        record.get(name).map(|v| v.to_string())
    }

    // ── Date ─────────────────────────────────────────────────────────────────

    #[test]
    fn date_with_any_separator_is_dotted() {
        let r = extract_fields("TARIH: 01/10/2019 SAAT 12:30", true);
        assert_eq!(r.get(FieldName::Date), Some(&FieldValue::Date("01.10.2019".into())));
        let r = extract_fields("18-05-2023", true);
        assert_eq!(text_of(&r, FieldName::Date).as_deref(), Some("18.05.2023"));
    }

    #[test]
    fn date_is_repaired() {
        let r = extract_fields("TARIH 02.10.2072", true);
        assert_eq!(text_of(&r, FieldName::Date).as_deref(), Some("02.10.2022"));
    }

    // ── Total ────────────────────────────────────────────────────────────────

    #[test]
    fn total_with_label_and_marker() {
        assert_eq!(total_of("TOPLAM TUTAR *145,67"), Some(Money::from_cents(14567)));
        assert_eq!(total_of("TOPLAM *45,67"), Some(Money::from_cents(4567)));
        assert_eq!(total_of("Toplam: 1.195,39"), Some(Money::from_cents(119539)));
    }

    #[test]
    fn total_skips_subtotal_and_takes_grand_total() {
        let text = "ARA TOPLAM *40,00\nTOPKDV *3,38\nTOPLAM *45,67\nNAKIT";
        assert_eq!(total_of(text), Some(Money::from_cents(4567)));
    }

    #[test]
    fn total_tutari_is_not_a_total_label() {
        assert_eq!(total_of("TOPLAM TUTARI 45,67"), None);
    }

    #[test]
    fn total_tax_is_not_total() {
        let r = extract_fields("TOPLAM KDV *3,38", true);
        assert!(!r.contains(FieldName::Total));
        assert_eq!(r.get(FieldName::TotalTax).and_then(FieldValue::as_amount), Some(Money::from_cents(338)));
    }

    #[test]
    fn total_dropped_when_unparsable() {
        // The capture swallows the next line's date and no longer parses.
        assert_eq!(total_of("TOPLAM *45,67\n12.10.2019"), None);
    }

    #[test]
    fn total_does_not_borrow_digits_from_next_line() {
        assert_eq!(total_of("TOPLAM *45,67\n8 ADET"), None);
    }

    #[test]
    fn total_tax_misreadings() {
        for label in ["TOPKDV", "topkdu", "TOPKÜV", "topkdy"] {
            let r = extract_fields(&format!("{label} *9,33"), true);
            assert_eq!(
                r.get(FieldName::TotalTax).and_then(FieldValue::as_amount),
                Some(Money::from_cents(933)),
                "label {label}"
            );
        }
    }

    macro_rules! false_trigger_fixtures {
        ($($name:ident: $prefix:expr,)*) => {
            $(
                #[test]
                fn $name() {
                    let line = format!("{} TOPLAM *12,34", $prefix);
                    assert_eq!(total_of(&line), None, "{line:?} must not be a total");
                    let lower = format!("{}\ttoplam 12,34", $prefix.to_lowercase());
                    assert_eq!(total_of(&lower), None, "{lower:?} must not be a total");
                }
            )*
        };
    }

    false_trigger_fixtures! {
        excludes_ara: "ARA",
        excludes_4ra: "4RA",
        excludes_afa: "AFA",
        excludes_kdv: "KDV",
        excludes_kdv_l: "KDV'L",
        excludes_kdv_li: "KDV'LI",
        excludes_kdv_curly_li: "KDV’LI",
        excludes_kdv_backtick_li: "KDV`LI",
        excludes_kdv_acute_l: "KDV´L",
        excludes_kdu: "KDU",
        excludes_kdy: "KDY",
        excludes_kdi: "KDI",
        excludes_kdw: "KDW",
        excludes_kdn: "KDN",
        excludes_kdx: "KDX",
    }

    #[test]
    fn every_false_trigger_is_excluded() {
        for term in TOTAL_FALSE_TRIGGERS {
            let line = format!("{term} toplam 12,34");
            assert_eq!(total_of(&line), None, "{line:?}");
        }
    }

    #[test]
    fn dotted_capital_i_in_trigger() {
        assert_eq!(total_of("KDV'Lİ TOPLAM *12,34"), None);
    }

    #[test]
    fn trigger_needs_the_separating_whitespace() {
        assert_eq!(total_of("ARA\n\nTOPLAM *10,00"), Some(Money::from_cents(1000)));
    }

    // ── Receipt number ───────────────────────────────────────────────────────

    #[test]
    fn receipt_number_fuzzy_label() {
        for text in ["FİŞ NO:0042", "FIS NO 42", "F1Ş NO: 0042", "fişno 7"] {
            let r = extract_fields(text, true);
            assert!(r.contains(FieldName::DocumentNumber), "{text}");
        }
        let r = extract_fields("FİŞ NO:0042", true);
        assert_eq!(text_of(&r, FieldName::DocumentNumber).as_deref(), Some("0042"));
    }

    #[test]
    fn receipt_number_rejects_long_numbers() {
        let r = extract_fields("FİŞ NO: 123456", true);
        assert!(!r.contains(FieldName::DocumentNumber));
    }

    #[test]
    fn receipt_only_fields_not_extracted_for_invoice() {
        let r = extract_fields("FİŞ NO:0042", false);
        assert!(!r.contains(FieldName::DocumentNumber));
    }

    // ── Invoice ──────────────────────────────────────────────────────────────

    #[test]
    fn invoice_number_labeled() {
        let r = extract_fields("FATURA NO: KRL2023000000123\nKDV ORANI %18", false);
        assert_eq!(text_of(&r, FieldName::DocumentNumber).as_deref(), Some("KRL2023000000123"));
        assert_eq!(r.get(FieldName::TaxRate), Some(&FieldValue::Rate(TaxRate::new(18).unwrap())));
    }

    #[test]
    fn invoice_number_bare_fallback() {
        let r = extract_fields("e-Arşiv\nKRL2023000000123\n", false);
        assert_eq!(text_of(&r, FieldName::DocumentNumber).as_deref(), Some("KRL2023000000123"));
    }

    #[test]
    fn invoice_number_needs_uppercase_prefix() {
        let r = extract_fields("fatura no: krl2023000000123", false);
        assert!(!r.contains(FieldName::DocumentNumber));
    }

    #[test]
    fn tax_rate_on_following_lines() {
        let text = "KDV ORANI\nMAL HIZMET\nTUTAR\n%20 ";
        let r = extract_fields(text, false);
        assert_eq!(r.get(FieldName::TaxRate), Some(&FieldValue::Rate(TaxRate::new(20).unwrap())));
    }

    #[test]
    fn tax_rate_outside_set_is_dropped() {
        let r = extract_fields("KDV ORANI %5", false);
        assert!(!r.contains(FieldName::TaxRate));
    }

    #[test]
    fn tax_rate_too_far_away_is_ignored() {
        let r = extract_fields("KDV ORANI\nSATIR\nSATIR\nSATIR\nUZUN BIR SATIR\n18", false);
        assert!(!r.contains(FieldName::TaxRate));
    }

    // ── Kind / no fabrication ────────────────────────────────────────────────

    #[test]
    fn kind_always_set_and_nothing_else_on_empty_text() {
        let r = extract_fields("", true);
        assert_eq!(r.len(), 1);
        assert_eq!(r.get(FieldName::DocumentKind), Some(&FieldValue::Kind(DocumentKind::Receipt)));
        let r = extract_fields("!@#$%^&*()\n\0\x01\x02", false);
        assert_eq!(r.len(), 1);
        assert_eq!(r.get(FieldName::DocumentKind), Some(&FieldValue::Kind(DocumentKind::Invoice)));
    }

    // ── Extended identifiers ─────────────────────────────────────────────────

    #[test]
    fn identifiers_only_with_extended_fields() {
        let text = "MERSIS NO: 0123456789012345\nVKN: 1234567890";
        let plain = extract_fields(text, true);
        assert!(!plain.contains(FieldName::MersisNumber));

        let ext = Extractor::new(ExtractionSettings { extended_fields: true, ..Default::default() })
            .extract(text, DocumentKind::Receipt);
        assert_eq!(text_of(&ext, FieldName::MersisNumber).as_deref(), Some("0123456789012345"));
        assert_eq!(text_of(&ext, FieldName::TaxId).as_deref(), Some("1234567890"));
    }

    #[test]
    fn own_tax_id_is_filtered() {
        let settings = ExtractionSettings {
            extended_fields: true,
            excluded_tax_ids: vec!["5240008809".into()],
        };
        let r = Extractor::new(settings).extract("VKN: 524OOO88O9", DocumentKind::Invoice);
        assert!(!r.contains(FieldName::TaxId));
    }

    #[test]
    fn ettn_and_registry_number() {
        let settings = ExtractionSettings { extended_fields: true, ..Default::default() };
        let text = "ETTN: 3F2504E0-4F89-11D3-9A0C-0305E82C3301\nTICARET SICIL NO: 12345O";
        let r = Extractor::new(settings).extract(text, DocumentKind::Invoice);
        assert_eq!(
            text_of(&r, FieldName::Ettn).as_deref(),
            Some("3f2504e0-4f89-11d3-9a0c-0305e82c3301")
        );
        assert_eq!(text_of(&r, FieldName::TradeRegistryNumber).as_deref(), Some("123450"));
    }
}
