//! Per-pass extraction and the final per-document merge.

use std::collections::BTreeMap;

use makbuz_core::{Money, Settings};

use crate::classify::{classify_document_kind, combine_votes};
use crate::extract::Extractor;
use crate::fusion::Fuser;
use crate::items::parse_line_items;
use crate::reconcile::{closest_sum, most_recurring_sum};
use crate::types::{items_total, DocumentKind, FieldName, FieldRecord, FieldValue, FinalRecord, LineItem};

/// What one recognition pass contributed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutput {
    pub fields: FieldRecord,
    /// `None` when the pass is not used for line items.
    pub items: Option<Vec<LineItem>>,
}

/// The pure half of document processing: everything after text recognition.
#[derive(Debug, Clone, Default)]
pub struct DocumentEngine {
    extractor: Extractor,
    fuser: Fuser,
}

impl DocumentEngine {
    pub fn new(settings: &Settings) -> Self {
        Self {
            extractor: Extractor::new(settings.extraction.clone()),
            fuser: Fuser::new(settings.fusion.clone()),
        }
    }

    /// A document is a receipt when any transcript looks like one.
    pub fn classify<'a, I>(&self, transcripts: I) -> DocumentKind
    where
        I: IntoIterator<Item = &'a str>,
    {
        combine_votes(transcripts.into_iter().map(classify_document_kind))
    }

    pub fn extract_pass(&self, transcript: &str, kind: DocumentKind, use_for_items: bool) -> PassOutput {
        let items = (kind.is_receipt() && use_for_items).then(|| parse_line_items(transcript));
        PassOutput { fields: self.extractor.extract(transcript, kind), items }
    }

    pub fn assemble(&self, kind: DocumentKind, passes: &[PassOutput]) -> FinalRecord {
        let records: Vec<FieldRecord> = passes.iter().map(|p| p.fields.clone()).collect();
        let item_lists: Vec<Vec<LineItem>> = passes.iter().filter_map(|p| p.items.clone()).collect();
        assemble(kind, &records, &item_lists, &self.fuser)
    }
}

/// Fuse the per-pass records, null out missing mandatory fields and, for
/// receipts, settle on one item list.
///
/// Without a fused Total the items are chosen by recurring sum, and a
/// non-empty choice supplies the Total.
pub fn assemble(
    kind: DocumentKind,
    records: &[FieldRecord],
    item_lists: &[Vec<LineItem>],
    fuser: &Fuser,
) -> FinalRecord {
    let fused = fuser.fuse(records);
    let mut fields: BTreeMap<FieldName, Option<FieldValue>> =
        fused.iter().map(|(name, value)| (name, Some(value.clone()))).collect();
    for name in kind.mandatory_fields() {
        fields.entry(*name).or_insert(None);
    }

    let line_items = kind.is_receipt().then(|| {
        match fused.get(FieldName::Total).and_then(FieldValue::as_amount) {
            Some(total) => closest_sum(item_lists, total),
            None => {
                let items = most_recurring_sum(item_lists);
                if !items.is_empty() {
                    let derived: Money = items_total(&items);
                    fields.insert(FieldName::Total, Some(FieldValue::Amount(derived)));
                }
                items
            }
        }
    });

    FinalRecord { kind, fields, line_items }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaxRate;

    fn engine() -> DocumentEngine {
        DocumentEngine::default()
    }

    fn passes(transcripts: &[&str], kind: DocumentKind) -> Vec<PassOutput> {
        let e = engine();
        transcripts.iter().map(|t| e.extract_pass(t, kind, true)).collect()
    }

    #[test]
    fn fused_total_prefers_prefix_corrected_reading() {
        let texts = ["TOPLAM TUTAR *145,67", "TOPLAM TUTAR *45,67", "TOPLAM TUTAR *45,67"];
        let record = engine().assemble(DocumentKind::Receipt, &passes(&texts, DocumentKind::Receipt));
        assert_eq!(record.total(), Some(Money::from_cents(4567)));
    }

    #[test]
    fn classify_is_an_or_over_transcripts() {
        let e = engine();
        assert_eq!(e.classify(["FATURA", "TOPLAM 1,00"]), DocumentKind::Invoice);
        assert_eq!(e.classify(["FATURA", "FIS NO: 12"]), DocumentKind::Receipt);
        assert_eq!(e.classify(std::iter::empty::<&str>()), DocumentKind::Invoice);
    }

    #[test]
    fn mandatory_fields_become_nulls() {
        let record = engine().assemble(DocumentKind::Invoice, &passes(&["nothing useful"], DocumentKind::Invoice));
        assert_eq!(
            record.missing_mandatory(),
            vec![FieldName::Date, FieldName::DocumentNumber, FieldName::Total, FieldName::TaxRate]
        );
        assert_eq!(record.get(FieldName::DocumentKind), Some(&FieldValue::Kind(DocumentKind::Invoice)));
        assert!(record.line_items.is_none());
        assert!(!record.fields.contains_key(&FieldName::TotalTax));
    }

    #[test]
    fn no_passes_leaves_kind_null() {
        let record = engine().assemble(DocumentKind::Receipt, &[]);
        assert!(record.missing_mandatory().contains(&FieldName::DocumentKind));
        assert_eq!(record.line_items, Some(vec![]));
    }

    #[test]
    fn receipt_items_follow_the_total() {
        let near = "FIS NO: 7\nSIMIT SUSAMLI 01 *10,00\nAYRAN KUCUK 08 *7,50\nTOPLAM *17,50";
        let far = "FIS NO: 7\nSIMIT SUSAMLI 01 *10,00\nTOPLAM *17,50";
        let record = engine().assemble(DocumentKind::Receipt, &passes(&[far, near, near], DocumentKind::Receipt));
        assert_eq!(record.total(), Some(Money::from_cents(1750)));
        let items = record.line_items.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items_total(&items), Money::from_cents(1750));
    }

    #[test]
    fn missing_total_is_derived_from_recurring_items() {
        let item = |cents| LineItem {
            description: "KAHVE CEKIRDEK".into(),
            tax_rate: TaxRate::new(18).unwrap(),
            amount: Money::from_cents(cents),
        };
        let lists = vec![vec![item(8000)], vec![item(8000)], vec![item(9500)], vec![item(8000)]];
        let record = assemble(DocumentKind::Receipt, &[FieldRecord::new()], &lists, &Fuser::default());
        assert_eq!(record.total(), Some(Money::from_cents(8000)));
        assert_eq!(record.line_items, Some(vec![item(8000)]));
    }

    #[test]
    fn missing_total_stays_null_without_items() {
        let record = assemble(DocumentKind::Receipt, &[FieldRecord::new()], &[vec![]], &Fuser::default());
        assert_eq!(record.total(), None);
        assert!(record.fields.contains_key(&FieldName::Total));
        assert_eq!(record.line_items, Some(vec![]));
    }

    #[test]
    fn passes_outside_item_modes_contribute_no_items() {
        let out = engine().extract_pass("FIS NO: 7\nSIMIT SUSAMLI 01 *10,00\nTOPLAM *10,00", DocumentKind::Receipt, false);
        assert!(out.items.is_none());
        let out = engine().extract_pass("SIMIT SUSAMLI 01 *10,00", DocumentKind::Invoice, true);
        assert!(out.items.is_none());
    }
}
