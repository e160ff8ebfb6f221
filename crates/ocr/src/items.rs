use makbuz_core::Money;

use crate::types::{LineItem, TaxRate};

re!(re_order_number, r"(?i)Sipariş\s+Numara(?:sı|si)");
re!(re_receipt_number_line, r"(?i)F[İIıi1]?[İIıi1]?[İIıi1]?[ŞşsS]?\s*NO\s*:?\s*\d+");
re!(re_total_line, r"(?i)\bToplam\b");
re!(re_quantity_line, r"^\d+\s*[Xx]\b");

// Printed rate tokens as the recognizer returns them. The `%` glyph in front
// of the rate is often read as 0, 1, 2 or 4; alternation order matters since
// the description is matched lazily.
re!(re_item,
    r"^(.+?)\s+[&x*]{0,3}\s*(1|8|01|08|10|18|101|108|110|118|28|201|208|210|218|48|401|408|410|418)\s.*?([\d.]+)\s*,\s*(\d{2})\D*$");

/// Descriptions shorter than this are truncated noise.
const MIN_DESCRIPTION_CHARS: usize = 5;

/// Effective percentage of a printed rate token: a three-digit token keeps
/// its last two digits, a two-digit token outside the statutory set drops its
/// misread `%` glyph.
fn rate_from_token(token: &str) -> Option<TaxRate> {
    let digits = if token.len() == 3 { &token[1..] } else { token };
    let value: u8 = digits.parse().ok()?;
    TaxRate::new(value).or_else(|| TaxRate::new(value % 10))
}

/// Half-open range of line indices that hold item rows.
fn item_bounds(lines: &[&str]) -> (usize, usize) {
    let start = lines
        .iter()
        .position(|l| re_order_number().is_match(l))
        .or_else(|| lines.iter().position(|l| re_receipt_number_line().is_match(l)))
        .unwrap_or(0);

    let end = lines
        .iter()
        .position(|l| re_total_line().is_match(l))
        .filter(|&end| end > start)
        .unwrap_or(lines.len());

    ((start + 1).min(end), end)
}

fn parse_item_line(line: &str) -> Option<LineItem> {
    if re_quantity_line().is_match(line) {
        return None;
    }
    let c = re_item().captures(line)?;
    let description = c.get(1)?.as_str().trim();
    if description.chars().count() < MIN_DESCRIPTION_CHARS {
        return None;
    }

    let tax_rate = rate_from_token(c.get(2)?.as_str())?;
    let int_part = c.get(3)?.as_str().replace('.', "");
    let int_part = if int_part.is_empty() { "0".to_string() } else { int_part };
    let amount = Money::parse(&format!("{int_part}.{}", c.get(4)?.as_str()))?;

    Some(LineItem { description: description.to_string(), tax_rate, amount })
}

/// Itemized expense lines of a receipt transcript, in source order.
///
/// Rows are looked for strictly between the order/receipt-number line and the
/// first line mentioning "toplam". Nothing is deduplicated here.
pub fn parse_line_items(transcript: &str) -> Vec<LineItem> {
    let lines: Vec<&str> = transcript
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let (start, end) = item_bounds(&lines);
    lines[start..end].iter().filter_map(|l| parse_item_line(l)).collect()
}
