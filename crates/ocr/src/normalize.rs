/// Maps glyphs the recognizer habitually confuses with digits.
fn substitute(c: char) -> char {
    match c {
        'O' | 'o' => '0',
        'I' | 'i' | 'İ' | 'l' => '1',
        'S' => '5',
        'B' => '8',
        other => other,
    }
}

fn is_date_separator(c: char) -> bool {
    c == '/' || c == '-'
}

/// Repairs per-character OCR confusions in a matched fragment.
///
/// Letters that look like digits become digits, then `/` and `-` sitting
/// between two digits become `.` so `12/12/2025` and `12-12-2025` both read
/// `12.12.2025`. Idempotent: the output contains no character the first step
/// would change, and separators are only rewritten into `.`.
pub fn normalize(text: &str) -> String {
    let chars: Vec<char> = text.chars().map(substitute).collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let between_digits = i > 0
                && chars[i - 1].is_ascii_digit()
                && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if is_date_separator(c) && between_digits {
                '.'
            } else {
                c
            }
        })
        .collect()
}
