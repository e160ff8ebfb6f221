/// Heuristic single-digit repair of a `DD.MM.YYYY` date.
///
/// Assumes documents from 2000 to 2029: the year is forced to start with
/// `20`, a third year digit outside `0..=2` becomes `2`, and a day tens digit
/// outside `0..=3` becomes `0`. Strings that are not exactly ten characters
/// are returned unchanged. No calendar validation is performed.
pub fn repair_date(date: &str) -> String {
    let chars: Vec<char> = date.chars().collect();
    if chars.len() != 10 {
        return date.to_string();
    }

    let mut day: Vec<char> = chars[..2].to_vec();
    let month: String = chars[3..5].iter().collect();
    let mut year: Vec<char> = chars[6..].to_vec();

    if year[..2] != ['2', '0'] {
        year[0] = '2';
        year[1] = '0';
    }
    if !matches!(year[2], '0' | '1' | '2') {
        year[2] = '2';
    }
    if !matches!(day[0], '0'..='3') {
        day[0] = '0';
    }

    let day: String = day.into_iter().collect();
    let year: String = year.into_iter().collect();
    format!("{day}.{month}.{year}")
}
