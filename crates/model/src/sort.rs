use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

/// Case-insensitive, numeric-aware ordering for display labels.
///
/// Runs of ASCII digits compare by numeric value, so `Level 2` sorts before
/// `Level 10`. Letters compare case-insensitively; strings that differ only
/// in case compare equal and callers break ties themselves.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ordering = compare_numbers(&take_digits(&mut left), &take_digits(&mut right));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            },
            (Some(l), Some(r)) => {
                let ordering = l.to_lowercase().cmp(r.to_lowercase());
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left.next();
                right.next();
            },
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    digits
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Level 2", "Level 10", Ordering::Less)]
    #[case("level 10", "Level 2", Ordering::Greater)]
    #[case("apple", "Banana", Ordering::Less)]
    #[case("Sword", "sword", Ordering::Equal)]
    #[case("file007", "file7", Ordering::Equal)]
    #[case("a", "ab", Ordering::Less)]
    #[case("", "a", Ordering::Less)]
    #[case("2 goblins", "goblins", Ordering::Less)]
    #[case("x99999999999999999999999", "x100000000000000000000000", Ordering::Less)]
    fn test_natural_cmp(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(natural_cmp(a, b), expected);
    }

    #[test]
    fn test_sorting_a_list() {
        let mut labels = vec!["Tier 10", "tier 1", "Tier 2", "Armor", "armor 3"];
        labels.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(labels, vec!["Armor", "armor 3", "tier 1", "Tier 2", "Tier 10"]);
    }
}
