use serde::{Deserialize, Serialize};

/// Budget bounds in whole currency units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRange {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl BudgetRange {
    pub fn ceiling(max: u64) -> Self {
        Self { min: None, max: Some(max) }
    }

    pub fn between(min: u64, max: u64) -> Self {
        Self { min: Some(min), max: Some(max) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Amount {
    value: f64,
    multiplier: Option<f64>,
    start: usize,
    end: usize,
}

impl Amount {
    fn resolved(&self, fallback_multiplier: Option<f64>) -> u64 {
        let multiplier = self.multiplier.or(fallback_multiplier).unwrap_or(1.0);
        (self.value * multiplier).round() as u64
    }
}

const RANGE_SEPARATORS: &[&str] = &["-", "–", "—", "~", "to", "and", "or"];
const MIN_PLAUSIBLE_BUDGET: u64 = 1_000;

/// Parses a budget mentioned in free text.
///
/// `80k-100k`, `80-100k` and `between 80k and 100k` produce a range. A lone
/// figure such as `1.5M` produces a ceiling only. Bare small numbers like the
/// `2` in `2 bedrooms` are not budgets.
pub fn parse_budget(text: &str) -> Option<BudgetRange> {
    let normalized = normalize(text);
    let amounts = scan_amounts(&normalized);

    for pair in amounts.windows(2) {
        let (first, second) = (pair[0], pair[1]);
        let between = normalized[first.end..second.start].trim();
        if !RANGE_SEPARATORS.contains(&between) {
            continue;
        }
        let min = first.resolved(second.multiplier);
        let max = second.resolved(None);
        if max < MIN_PLAUSIBLE_BUDGET {
            continue;
        }
        return Some(if min <= max { BudgetRange::between(min, max) } else { BudgetRange::between(max, min) });
    }

    amounts
        .iter()
        .map(|amount| amount.resolved(None))
        .find(|value| *value >= MIN_PLAUSIBLE_BUDGET)
        .map(BudgetRange::ceiling)
}

fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let chars: Vec<char> = lowered.chars().collect();
    let mut normalized = String::with_capacity(lowered.len());
    for (index, ch) in chars.iter().enumerate() {
        let digit_before = index > 0 && chars[index - 1].is_ascii_digit();
        let digit_after = chars.get(index + 1).is_some_and(|next| next.is_ascii_digit());
        if *ch == ',' && digit_before && digit_after {
            continue;
        }
        normalized.push(*ch);
    }
    normalized
}

fn multiplier_for(word: &str) -> Option<f64> {
    match word {
        "k" | "thousand" | "grand" => Some(1_000.0),
        "m" | "mn" | "mil" | "million" | "millions" => Some(1_000_000.0),
        _ => None,
    }
}

fn scan_amounts(text: &str) -> Vec<Amount> {
    let bytes = text.as_bytes();
    let mut amounts = Vec::new();
    let mut index = 0;

    while index < bytes.len() {
        let starts_number = bytes[index].is_ascii_digit()
            && (index == 0 || !bytes[index - 1].is_ascii_alphanumeric());
        if !starts_number {
            index += 1;
            continue;
        }

        let start = index;
        while index < bytes.len() && (bytes[index].is_ascii_digit() || bytes[index] == b'.') {
            index += 1;
        }
        let Ok(value) = text[start..index].trim_end_matches('.').parse::<f64>() else {
            continue;
        };

        let mut cursor = index;
        while cursor < bytes.len() && bytes[cursor] == b' ' {
            cursor += 1;
        }
        let word_start = cursor;
        while cursor < bytes.len() && bytes[cursor].is_ascii_alphabetic() {
            cursor += 1;
        }
        let word = &text[word_start..cursor];

        if let Some(multiplier) = multiplier_for(word) {
            amounts.push(Amount { value, multiplier: Some(multiplier), start, end: cursor });
            index = cursor;
        } else if word_start == index && !word.is_empty() {
            // Glued to an unrelated word, e.g. `2br` or `3rd`.
            index = cursor;
        } else {
            amounts.push(Amount { value, multiplier: None, start, end: index });
        }
    }

    amounts
}

/// `1234567` -> `1,234,567`.
pub fn format_money(value: u64) -> String {
    let digits = value.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(ch);
    }
    formatted
}

/// `1500000` -> `1.5M`, `85000` -> `85k`.
pub fn format_compact(value: u64) -> String {
    if value >= 1_000_000 {
        trim_decimal(value as f64 / 1_000_000.0, "M")
    } else if value >= 1_000 {
        trim_decimal(value as f64 / 1_000.0, "k")
    } else {
        value.to_string()
    }
}

fn trim_decimal(value: f64, suffix: &str) -> String {
    let rendered = format!("{value:.2}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{rendered}{suffix}")
}
