//! Phrase recognition for turns that are about browsing rather than criteria.

use crate::search::MarketStatistic;

const PAGINATION_PHRASES: &[&str] = &[
    "show more",
    "more properties",
    "more listings",
    "next batch",
    "next page",
    "more results",
    "see more",
    "view more",
    "load more",
    "get more",
    "more options",
    "other properties",
    "other options",
    "show me others",
    "show others",
    "what else",
    "anything else",
    "alternatives",
    "keep going",
    // common typos
    "shoe more",
    "show mor",
    "sho more",
    "more prop",
    "next prop",
    "mroe",
];

const BARE_PAGINATION_WORDS: &[&str] = &["more", "next", "others", "continue"];

const REFERENCE_NOUNS: &[&str] = &[
    "property", "listing", "option", "one", "unit", "place", "home", "apartment", "villa",
    "flat", "penthouse", "studio", "townhouse", "duplex",
];

const ORDINAL_WORDS: &[(&str, usize)] = &[
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
    ("sixth", 6),
    ("seventh", 7),
    ("eighth", 8),
    ("ninth", 9),
    ("tenth", 10),
];

const DETAIL_LEADS: &[&str] = &["about", "details", "detail", "info", "number"];

const ROOM_WORDS: &[&str] =
    &["bed", "beds", "bedroom", "bedrooms", "br", "bhk", "bath", "baths", "bathroom", "bathrooms"];

const BUDGET_WORDS: &[&str] = &[
    "budget", "price", "aed", "dhs", "dirham", "dirhams", "thousand", "million", "cost", "k", "m",
];

// Ordered: "least expensive" must win over "expensive".
const MARKET_PHRASES: &[(&str, MarketStatistic)] = &[
    ("least expensive", MarketStatistic::Cheapest),
    ("cheapest", MarketStatistic::Cheapest),
    ("lowest price", MarketStatistic::Cheapest),
    ("lowest priced", MarketStatistic::Cheapest),
    ("most affordable", MarketStatistic::Cheapest),
    ("most expensive", MarketStatistic::MostExpensive),
    ("priciest", MarketStatistic::MostExpensive),
    ("highest price", MarketStatistic::MostExpensive),
    ("highest priced", MarketStatistic::MostExpensive),
    ("largest", MarketStatistic::Largest),
    ("biggest", MarketStatistic::Largest),
    ("smallest", MarketStatistic::Smallest),
    ("tiniest", MarketStatistic::Smallest),
    ("average price", MarketStatistic::AveragePrice),
    ("average rent", MarketStatistic::AveragePrice),
    ("mean price", MarketStatistic::AveragePrice),
    ("typical price", MarketStatistic::AveragePrice),
    ("typical rent", MarketStatistic::AveragePrice),
];

const LISTING_PLURALS: &[&str] = &[
    "properties", "listings", "options", "units", "places", "homes", "apartments", "villas",
    "flats", "penthouses", "studios", "townhouses", "duplexes",
];

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !(ch.is_alphanumeric() || ch == '#'))
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn is_pagination_request(text: &str) -> bool {
    let tokens = words(text);
    let joined = tokens.join(" ");

    let bare = !tokens.is_empty()
        && tokens.len() <= 2
        && tokens.iter().any(|token| BARE_PAGINATION_WORDS.contains(&token.as_str()))
        && tokens.iter().all(|token| {
            BARE_PAGINATION_WORDS.contains(&token.as_str())
                || matches!(token.as_str(), "please" | "pls" | "ok" | "yes")
        });
    if bare {
        return true;
    }

    PAGINATION_PHRASES
        .iter()
        .any(|phrase| format!(" {joined} ").contains(&format!(" {phrase}")))
}

/// Recognises questions about the market as a whole, e.g. "cheapest 2BR in
/// Marina" or "how many villas are there in JVC".
pub fn parse_market_question(text: &str) -> Option<MarketStatistic> {
    let tokens = words(text);
    let padded = format!(" {} ", tokens.join(" "));

    if let Some((_, statistic)) =
        MARKET_PHRASES.iter().find(|(phrase, _)| padded.contains(&format!(" {phrase} ")))
    {
        return Some(*statistic);
    }

    let asks_count = tokens.windows(2).any(|pair| pair[0] == "how" && pair[1] == "many");
    let counts_listings = tokens
        .iter()
        .any(|token| LISTING_PLURALS.contains(&token.as_str()) || token == "available");
    (asks_count && counts_listings).then_some(MarketStatistic::Count)
}

/// Returns a 1-based ordinal when the turn points at a listed property.
///
/// Figures that read as money (`2m`, `500k`, `2 million`) never count as
/// references.
pub fn parse_property_reference(text: &str) -> Option<usize> {
    let tokens = words(text);
    if tokens.is_empty() || mentions_budget(&tokens) {
        return None;
    }
    let has_noun = tokens.iter().any(|token| REFERENCE_NOUNS.contains(&token.as_str()));

    for (index, token) in tokens.iter().enumerate() {
        let previous = index.checked_sub(1).map(|i| tokens[i].as_str());

        if let Some(number) = token.strip_prefix('#').and_then(|rest| rest.parse::<usize>().ok()) {
            return positive(number);
        }
        if let Some(number) = ordinal_suffix_number(token) {
            return positive(number);
        }
        if let Ok(number) = token.parse::<usize>() {
            let next = tokens.get(index + 1).map(String::as_str);
            if next.is_some_and(|word| ROOM_WORDS.contains(&word)) {
                continue;
            }
            let after_noun = previous.is_some_and(|word| REFERENCE_NOUNS.contains(&word));
            let after_lead = previous.is_some_and(|word| DETAIL_LEADS.contains(&word));
            if after_noun || after_lead {
                return positive(number);
            }
        }
        if has_noun {
            if let Some((_, number)) = ORDINAL_WORDS.iter().find(|(word, _)| word == token) {
                return Some(*number);
            }
        }
    }
    None
}

fn positive(number: usize) -> Option<usize> {
    (1..=50).contains(&number).then_some(number)
}

fn ordinal_suffix_number(token: &str) -> Option<usize> {
    ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|suffix| token.strip_suffix(suffix))
        .filter(|digits| !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
}

fn mentions_budget(tokens: &[String]) -> bool {
    tokens.iter().enumerate().any(|(index, token)| {
        if BUDGET_WORDS.contains(&token.as_str()) {
            return !matches!(token.as_str(), "k" | "m")
                || index.checked_sub(1).is_some_and(|i| tokens[i].parse::<f64>().is_ok());
        }
        let digits_end = token.find(|ch: char| !ch.is_ascii_digit() && ch != '.').unwrap_or(token.len());
        digits_end > 0 && matches!(&token[digits_end..], "k" | "m" | "mn" | "million")
    })
}

#[cfg(test)]
mod tests {
    use super::{is_pagination_request, parse_market_question, parse_property_reference};
    use crate::search::MarketStatistic;

    #[test]
    fn recognises_pagination_phrases_and_typos() {
        for phrase in [
            "show more",
            "Show me more properties please",
            "next batch",
            "shoe more",
            "more",
            "next please",
            "what else do you have?",
            "any other options?",
        ] {
            assert!(is_pagination_request(phrase), "{phrase}");
        }
    }

    #[test]
    fn ordinary_sentences_are_not_pagination() {
        for phrase in [
            "I want 2 more bedrooms than that",
            "looking for a villa in JVC",
            "tell me about the second one",
        ] {
            assert!(!is_pagination_request(phrase), "{phrase}");
        }
    }

    #[test]
    fn resolves_common_reference_shapes() {
        assert_eq!(parse_property_reference("property 2"), Some(2));
        assert_eq!(parse_property_reference("tell me about the second one"), Some(2));
        assert_eq!(parse_property_reference("the 3rd"), Some(3));
        assert_eq!(parse_property_reference("tell me about 4"), Some(4));
        assert_eq!(parse_property_reference("#5 looks nice"), Some(5));
        assert_eq!(parse_property_reference("what about the first apartment?"), Some(1));
    }

    #[test]
    fn money_is_never_a_reference() {
        assert_eq!(parse_property_reference("2m budget"), None);
        assert_eq!(parse_property_reference("how about 500k"), None);
        assert_eq!(parse_property_reference("property under 2 million"), None);
    }

    #[test]
    fn ordinal_words_need_a_noun() {
        assert_eq!(parse_property_reference("first time buyer here"), None);
        assert_eq!(parse_property_reference("hello"), None);
        assert_eq!(parse_property_reference("a villa 3 bedrooms please"), None);
    }

    #[test]
    fn recognises_market_questions() {
        let cases = [
            ("what's the cheapest 2BR in Marina?", MarketStatistic::Cheapest),
            ("least expensive villa in Arabian Ranches", MarketStatistic::Cheapest),
            ("most expensive villa", MarketStatistic::MostExpensive),
            ("which is the biggest penthouse to buy", MarketStatistic::Largest),
            ("smallest studio in JLT", MarketStatistic::Smallest),
            ("average price in JVC", MarketStatistic::AveragePrice),
            ("how many apartments are available to rent in Downtown?", MarketStatistic::Count),
        ];
        for (text, expected) in cases {
            assert_eq!(parse_market_question(text), Some(expected), "{text}");
        }
    }

    #[test]
    fn criteria_and_property_questions_are_not_market_questions() {
        for text in [
            "2 bed apartment to rent in Dubai Marina, 80-100k",
            "how many bedrooms does it have?",
            "is it expensive?",
            "show more",
        ] {
            assert_eq!(parse_market_question(text), None, "{text}");
        }
    }
}
