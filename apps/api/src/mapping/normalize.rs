//! Merchant-name normalization. Pure functions, no side effects.

/// Transaction-type prefixes banks prepend to merchant names.
const TYPE_PREFIXES: &[&str] = &[
    "PURCHASE", "PAYMENT", "CHARGE", "DEBIT", "COMPRA", "PAGO", "CONSUMO",
];

/// Normalizes a raw merchant string into a lookup key: uppercased,
/// punctuation stripped, whitespace collapsed, transaction-type prefixes and
/// trailing numeric codes (≥4 digits) removed. Empty input → empty output.
pub fn normalize(raw: &str) -> String {
    let cleaned: String = raw
        .to_uppercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();

    while let Some(first) = tokens.first() {
        if TYPE_PREFIXES.contains(first) {
            tokens.remove(0);
        } else {
            break;
        }
    }

    while let Some(last) = tokens.last() {
        if last.len() >= 4 && last.chars().all(|c| c.is_ascii_digit()) {
            tokens.pop();
        } else {
            break;
        }
    }

    tokens.join(" ")
}

/// Generates a wildcard pattern from the first two words of length >2 in the
/// normalized key. A hint for future fuzzy matching; the lookup itself never
/// evaluates it.
pub fn wildcard_pattern(raw: &str) -> String {
    let key = normalize(raw);
    if key.is_empty() {
        return String::new();
    }

    let words: Vec<&str> = key.split_whitespace().filter(|w| w.len() > 2).collect();
    match words.as_slice() {
        [first, second, ..] => format!("{} {}*", first, second),
        _ => format!("{}*", key),
    }
}
