use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use makbuz_core::Money;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Receipt ("fiş") or invoice ("fatura").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Receipt,
    Invoice,
}

impl DocumentKind {
    pub fn from_is_receipt(is_receipt: bool) -> Self {
        if is_receipt {
            DocumentKind::Receipt
        } else {
            DocumentKind::Invoice
        }
    }

    pub fn is_receipt(self) -> bool {
        self == DocumentKind::Receipt
    }

    /// Fields that are reported as an explicit null when no pass produced them.
    pub fn mandatory_fields(self) -> &'static [FieldName] {
        match self {
            DocumentKind::Receipt => &[
                FieldName::Date,
                FieldName::DocumentNumber,
                FieldName::Total,
                FieldName::DocumentKind,
            ],
            DocumentKind::Invoice => &[
                FieldName::Date,
                FieldName::DocumentNumber,
                FieldName::Total,
                FieldName::DocumentKind,
                FieldName::TaxRate,
            ],
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Receipt => write!(f, "Fiş"),
            DocumentKind::Invoice => write!(f, "Fatura"),
        }
    }
}

/// A Turkish VAT (KDV) percentage. Only the statutory rates are representable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct TaxRate(u8);

impl TaxRate {
    pub const ALLOWED: [u8; 6] = [0, 1, 8, 10, 18, 20];

    pub fn new(percent: u8) -> Option<Self> {
        Self::ALLOWED.contains(&percent).then_some(TaxRate(percent))
    }

    pub fn percent(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for TaxRate {
    type Error = String;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        TaxRate::new(v).ok_or_else(|| format!("Unsupported tax rate: {v}"))
    }
}

impl From<TaxRate> for u8 {
    fn from(r: TaxRate) -> u8 {
        r.0
    }
}

impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed vocabulary of extractable fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Date,
    Total,
    TotalTax,
    TaxRate,
    DocumentNumber,
    DocumentKind,
    TradeRegistryNumber,
    MersisNumber,
    Ettn,
    TaxId,
}

impl FieldName {
    /// Key used in the exported record. Downstream consumers match on these
    /// exact strings, so they must never change.
    pub fn export_key(self, kind: DocumentKind) -> &'static str {
        match self {
            FieldName::Date => "Tarih",
            FieldName::Total => "Toplam",
            FieldName::TotalTax => "Toplam KDV",
            FieldName::TaxRate => "KDV Oranı",
            FieldName::DocumentNumber => match kind {
                DocumentKind::Receipt => "Fiş No",
                DocumentKind::Invoice => "Fatura No",
            },
            FieldName::DocumentKind => "Belge Türü",
            FieldName::TradeRegistryNumber => "Ticaret Sicil No",
            FieldName::MersisNumber => "Mersis No",
            FieldName::Ettn => "ETTN",
            FieldName::TaxId => "Vergi Kimlik No",
        }
    }
}

/// A typed field value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Amount(Money),
    Rate(TaxRate),
    /// `DD.MM.YYYY`, already repaired but not calendar-validated.
    Date(String),
    Kind(DocumentKind),
}

impl FieldValue {
    pub fn as_amount(&self) -> Option<Money> {
        match self {
            FieldValue::Amount(m) => Some(*m),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Date(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) | FieldValue::Date(s) => Value::String(s.clone()),
            FieldValue::Amount(m) => json!(m.to_f64()),
            FieldValue::Rate(r) => json!(r.percent()),
            FieldValue::Kind(k) => Value::String(k.to_string()),
        }
    }

    /// Rendering used when comparing against hand-written expectations.
    pub fn to_plain_string(&self) -> String {
        match self {
            FieldValue::Amount(m) => m.to_plain_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) | FieldValue::Date(s) => write!(f, "{s}"),
            FieldValue::Amount(m) => write!(f, "{m}"),
            FieldValue::Rate(r) => write!(f, "{r}"),
            FieldValue::Kind(k) => write!(f, "{k}"),
        }
    }
}

/// Fields extracted from one transcript. A key is present only when its
/// pattern matched and the value parsed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldRecord(BTreeMap<FieldName, FieldValue>);

impl FieldRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: FieldName, value: FieldValue) {
        self.0.insert(name, value);
    }

    pub fn get(&self, name: FieldName) -> Option<&FieldValue> {
        self.0.get(&name)
    }

    pub fn contains(&self, name: FieldName) -> bool {
        self.0.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &FieldValue)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }
}

impl FromIterator<(FieldName, FieldValue)> for FieldRecord {
    fn from_iter<I: IntoIterator<Item = (FieldName, FieldValue)>>(iter: I) -> Self {
        FieldRecord(iter.into_iter().collect())
    }
}

/// One itemized expense line of a receipt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    pub description: String,
    pub tax_rate: TaxRate,
    pub amount: Money,
}

impl LineItem {
    fn to_json(&self) -> Value {
        json!({
            "Masraf Açıklama": self.description,
            "KDV Oranı": self.tax_rate.percent(),
            "Harcama Tutarı": self.amount.to_f64(),
        })
    }
}

pub fn items_total(items: &[LineItem]) -> Money {
    items.iter().map(|i| i.amount).sum()
}

/// The resolved output for one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalRecord {
    pub kind: DocumentKind,
    /// `None` is an explicit null: a mandatory field that no pass produced.
    pub fields: BTreeMap<FieldName, Option<FieldValue>>,
    /// Present for receipts only.
    pub line_items: Option<Vec<LineItem>>,
}

impl FinalRecord {
    pub fn get(&self, name: FieldName) -> Option<&FieldValue> {
        self.fields.get(&name).and_then(Option::as_ref)
    }

    pub fn total(&self) -> Option<Money> {
        self.get(FieldName::Total).and_then(FieldValue::as_amount)
    }

    /// Mandatory fields that came out null.
    pub fn missing_mandatory(&self) -> Vec<FieldName> {
        self.kind
            .mandatory_fields()
            .iter()
            .copied()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }

    /// The document date as a calendar date, when it is one.
    pub fn iso_date(&self) -> Option<NaiveDate> {
        let raw = self.get(FieldName::Date)?.as_text()?;
        NaiveDate::parse_from_str(raw, "%d.%m.%Y").ok()
    }

    /// Flat map keyed by the exported field names, with explicit nulls.
    pub fn to_export(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (name, value) in &self.fields {
            let v = value.as_ref().map(FieldValue::to_json).unwrap_or(Value::Null);
            out.insert(name.export_key(self.kind).to_string(), v);
        }
        if let Some(items) = &self.line_items {
            out.insert(
                "Alt Kalemler".to_string(),
                Value::Array(items.iter().map(LineItem::to_json).collect()),
            );
        }
        out
    }

    /// Export keys mapped to their comparison strings; nulls render as `None`.
    pub fn export_strings(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|(name, value)| {
                let s = value
                    .as_ref()
                    .map(FieldValue::to_plain_string)
                    .unwrap_or_else(|| "None".to_string());
                (name.export_key(self.kind).to_string(), s)
            })
            .collect()
    }
}
