use regex::Regex;
use std::sync::LazyLock;

static CAMEL_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").unwrap());
static WORD_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w").unwrap());

/// Turn a raw display value into a presentable label.
///
/// `martialWeapon` becomes `Martial Weapon`, `long_sword` becomes
/// `Long Sword`. Already-presentable text passes through unchanged.
pub fn humanize(display: &str) -> String {
    let spaced = CAMEL_BOUNDARY.replace_all(display, "$1 $2");
    let spaced = spaced.replace('_', " ");
    WORD_START.replace_all(&spaced, |caps: &regex::Captures<'_>| caps[0].to_uppercase()).into_owned()
}
