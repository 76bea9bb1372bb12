/// Locale-aware string ordering for sorting and grouping.
///
/// Approximates the default root collation used by display layers:
/// whitespace sorts before punctuation and symbols, which sort before
/// digits, which sort before letters. Letters compare case-insensitively
/// first; when two strings differ only in case, lowercase comes first.
/// Strings that are still equal fall back to code point order so that the
/// ordering is total.

use std::cmp::Ordering;

/// Compare two strings for display ordering.
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    a.chars()
        .map(primary_weight)
        .cmp(b.chars().map(primary_weight))
        .then_with(|| a.chars().map(char::is_uppercase).cmp(b.chars().map(char::is_uppercase)))
        .then_with(|| a.cmp(b))
}

fn primary_weight(c: char) -> (u8, char) {
    let class = if c.is_whitespace() {
        0
    } else if c.is_numeric() {
        2
    } else if c.is_alphabetic() {
        3
    } else {
        1
    };
    (class, c.to_lowercase().next().unwrap_or(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_primary_order() {
        assert_eq!(locale_compare("apple", "Banana"), Ordering::Less);
        assert_eq!(locale_compare("DIR EN GREY", "Deftones"), Ordering::Greater);
        assert_eq!(locale_compare("Interpol", "foxing"), Ordering::Greater);
    }

    #[test]
    fn test_lowercase_before_uppercase_on_tie() {
        assert_eq!(locale_compare("a", "A"), Ordering::Less);
        assert_eq!(locale_compare("A", "A"), Ordering::Equal);
    }

    #[test]
    fn test_character_classes() {
        assert_eq!(locale_compare("_x", "1"), Ordering::Less);
        assert_eq!(locale_compare("9", "a"), Ordering::Less);
        assert_eq!(locale_compare("a b", "ab"), Ordering::Less);
        assert_eq!(locale_compare("10", "9"), Ordering::Less);
    }
}
