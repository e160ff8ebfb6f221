use std::collections::BTreeMap;

use makbuz_core::FusionSettings;
use tracing::debug;

use crate::types::{FieldName, FieldRecord, FieldValue};

/// Distinct readings of one field with their vote counts, in first-seen order.
#[derive(Debug, Default)]
struct Tally {
    candidates: Vec<(FieldValue, usize)>,
}

impl Tally {
    fn add(&mut self, value: &FieldValue) {
        match self.candidates.iter_mut().find(|(v, _)| v == value) {
            Some((_, n)) => *n += 1,
            None => self.candidates.push((value.clone(), 1)),
        }
    }

    /// Candidates by descending count. The sort is stable, so ties keep
    /// first-seen order.
    fn ranked(&self) -> Vec<&(FieldValue, usize)> {
        let mut ranked: Vec<_> = self.candidates.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }
}

/// Merges per-pass field records by voting.
#[derive(Debug, Clone, Default)]
pub struct Fuser {
    settings: FusionSettings,
}

impl Fuser {
    pub fn new(settings: FusionSettings) -> Self {
        Self { settings }
    }

    pub fn fuse(&self, records: &[FieldRecord]) -> FieldRecord {
        let mut tallies: BTreeMap<FieldName, Tally> = BTreeMap::new();
        for record in records {
            for (name, value) in record.iter() {
                tallies.entry(name).or_default().add(value);
            }
        }

        tallies
            .into_iter()
            .filter_map(|(name, tally)| {
                let winner = self.pick(name, &tally)?;
                Some((name, winner))
            })
            .collect()
    }

    fn pick(&self, name: FieldName, tally: &Tally) -> Option<FieldValue> {
        let ranked = tally.ranked();
        let (plurality, _) = ranked.first()?;

        if let Some(corrected) = self.prefix_correction(&ranked) {
            if corrected != plurality {
                debug!(field = ?name, from = %plurality, to = %corrected, "prefix correction applied");
            }
            return Some(corrected.clone());
        }
        Some(plurality.clone())
    }

    /// An amount `V` beats the plurality when some other reading is `V` with
    /// one spurious leading digit, `V` is in the top two, and `V` was read at
    /// least twice.
    fn prefix_correction<'a>(&self, ranked: &[&'a (FieldValue, usize)]) -> Option<&'a FieldValue> {
        let top_two: Vec<&FieldValue> = ranked.iter().take(2).map(|(v, _)| v).collect();

        for &(value, count) in ranked {
            let Some(amount) = value.as_amount() else { continue };
            let shown = amount.to_string();
            let has_prefixed_twin = ranked.iter().any(|(other, _)| {
                other.as_amount().is_some_and(|o| {
                    let o = o.to_string();
                    let mut chars = o.chars();
                    chars.next().is_some_and(|c| self.settings.spurious_prefix_digits.contains(&c))
                        && chars.as_str() == shown
                })
            });
            if has_prefixed_twin && top_two.contains(&value) && *count >= 2 {
                return Some(value);
            }
        }
        None
    }
}

/// Fuse with the default prefix digits.
pub fn fuse_fields(records: &[FieldRecord]) -> FieldRecord {
    Fuser::default().fuse(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentKind, TaxRate};
    use makbuz_core::Money;

    fn totals(readings: &[(i64, usize)]) -> Vec<FieldRecord> {
        readings
            .iter()
            .flat_map(|&(cents, n)| std::iter::repeat(cents).take(n))
            .map(|cents| {
                [(FieldName::Total, FieldValue::Amount(Money::from_cents(cents)))]
                    .into_iter()
                    .collect()
            })
            .collect()
    }

    fn fused_total(records: &[FieldRecord]) -> Option<Money> {
        fuse_fields(records).get(FieldName::Total).and_then(FieldValue::as_amount)
    }

    #[test]
    fn override_beats_plurality_noise() {
        assert_eq!(fused_total(&totals(&[(4567, 3), (14567, 2)])), Some(Money::from_cents(4567)));
    }

    #[test]
    fn override_even_when_prefixed_reading_leads() {
        assert_eq!(fused_total(&totals(&[(14567, 3), (4567, 2)])), Some(Money::from_cents(4567)));
        assert_eq!(fused_total(&totals(&[(44567, 4), (4567, 2)])), Some(Money::from_cents(4567)));
    }

    #[test]
    fn override_needs_two_votes() {
        assert_eq!(fused_total(&totals(&[(14567, 3), (4567, 1)])), Some(Money::from_cents(14567)));
    }

    #[test]
    fn override_needs_top_two() {
        let records = totals(&[(2000, 4), (3000, 3), (4567, 2), (14567, 1)]);
        assert_eq!(fused_total(&records), Some(Money::from_cents(2000)));
    }

    #[test]
    fn plain_plurality() {
        assert_eq!(fused_total(&totals(&[(1000, 5), (2000, 1)])), Some(Money::from_cents(1000)));
    }

    #[test]
    fn ties_go_to_first_seen() {
        let mut records = totals(&[(2000, 1), (1000, 2)]);
        records.extend(totals(&[(2000, 1)]));
        assert_eq!(fused_total(&records), Some(Money::from_cents(2000)));
    }

    #[test]
    fn other_prefix_digits_are_not_corrected() {
        assert_eq!(fused_total(&totals(&[(74567, 3), (4567, 2)])), Some(Money::from_cents(74567)));
    }

    #[test]
    fn prefix_digits_are_configurable() {
        let fuser = Fuser::new(FusionSettings { spurious_prefix_digits: vec!['7'] });
        let fused = fuser.fuse(&totals(&[(74567, 3), (4567, 2)]));
        assert_eq!(fused.get(FieldName::Total).and_then(FieldValue::as_amount), Some(Money::from_cents(4567)));

        let fused = fuser.fuse(&totals(&[(14567, 3), (4567, 2)]));
        assert_eq!(fused.get(FieldName::Total).and_then(FieldValue::as_amount), Some(Money::from_cents(14567)));
    }

    #[test]
    fn text_fields_vote_without_override() {
        let records: Vec<FieldRecord> = ["0042", "10042", "0042", "10042", "10042"]
            .iter()
            .map(|n| [(FieldName::DocumentNumber, FieldValue::Text(n.to_string()))].into_iter().collect())
            .collect();
        assert_eq!(
            fuse_fields(&records).get(FieldName::DocumentNumber),
            Some(&FieldValue::Text("10042".into()))
        );
    }

    #[test]
    fn fields_are_fused_independently() {
        let a: FieldRecord = [
            (FieldName::Date, FieldValue::Date("01.10.2019".into())),
            (FieldName::DocumentKind, FieldValue::Kind(DocumentKind::Invoice)),
        ]
        .into_iter()
        .collect();
        let b: FieldRecord = [
            (FieldName::TaxRate, FieldValue::Rate(TaxRate::new(0).unwrap())),
            (FieldName::DocumentKind, FieldValue::Kind(DocumentKind::Invoice)),
        ]
        .into_iter()
        .collect();
        let fused = fuse_fields(&[a, b, FieldRecord::new()]);
        assert_eq!(fused.len(), 3);
        // A zero rate is a reading like any other.
        assert_eq!(fused.get(FieldName::TaxRate), Some(&FieldValue::Rate(TaxRate::new(0).unwrap())));
        assert!(!fused.contains(FieldName::Total));
    }

    #[test]
    fn no_records_no_fields() {
        assert!(fuse_fields(&[]).is_empty());
    }
}
