use std::sync::Arc;

use async_trait::async_trait;

use proptalk_core::config::{AppConfig, ExtractorKind};
use proptalk_core::domain::budget::{parse_budget, BudgetRange};
use proptalk_core::domain::requirements::{
    PartialRequirementSet, PropertyType, RequirementField, RequirementSet, TransactionType,
};
use proptalk_core::errors::ExtractionError;
use proptalk_core::ports::RequirementExtractor;
use proptalk_core::search::AreaDirectory;

use crate::llm::{HttpLlmClient, LlmError, LlmRequirementExtractor};

/// Confidence for a field named outright ("rent", "Dubai Marina", "villa").
pub const EXPLICIT_CONFIDENCE: f64 = 0.9;
/// Confidence for a field reached through an alias or a cue ("Marina", "flat", "yearly").
pub const INFERRED_CONFIDENCE: f64 = 0.75;
/// Confidence when the turn names both transaction types.
const CONFLICTING_CONFIDENCE: f64 = 0.5;

const RENT_WORDS: &[&str] = &["rent", "rental", "renting", "lease", "leasing", "tenant"];
const BUY_WORDS: &[&str] =
    &["buy", "buying", "purchase", "purchasing", "own", "owning", "invest", "investment"];
const RENT_CUES: &[&str] = &["yearly", "annually", "monthly", "cheques", "cheque"];
const BUY_CUES: &[&str] = &["mortgage", "offplan", "freehold", "resale"];

const BEDROOM_UNITS: &[&str] = &["br", "bhk", "bed", "beds", "bedroom", "bedrooms", "room", "rooms"];
const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
];

const BUDGET_CUES: &[&str] = &[
    "budget", "aed", "dhs", "dirham", "dirhams", "price", "under", "below", "max", "maximum",
    "between", "upto", "pay", "afford",
];
const FLOOR_CUES: &[&str] = &["least", "minimum", "min", "above", "over", "from", "starting"];

/// Deterministic keyword extraction.
///
/// Reads transaction type, location, property type, bedrooms and budget from a
/// single message. It never fails; a message with no recognisable criteria
/// yields an empty set.
#[derive(Clone, Debug, Default)]
pub struct RuleBasedExtractor {
    areas: AreaDirectory,
}

impl RuleBasedExtractor {
    pub fn new(areas: AreaDirectory) -> Self {
        Self { areas }
    }

    pub fn extract_requirements(&self, text: &str) -> RequirementSet {
        let normalized_text = normalize_text(text);
        let tokens = tokenize(&normalized_text);

        let mut extracted = RequirementSet {
            transaction_type: extract_transaction_type(&normalized_text, &tokens),
            location: self.extract_location(text),
            property_type: extract_property_type(&normalized_text, &tokens),
            bedrooms: extract_bedrooms(&tokens),
            ..RequirementSet::default()
        };
        if let Some((range, confidence)) = extract_budget(text, &tokens) {
            extracted.set_budget(range, confidence);
        }
        extracted.sanitized()
    }

    fn extract_location(&self, text: &str) -> Option<RequirementField<String>> {
        self.areas.find_in_text(text).map(|(area, via_alias)| {
            let confidence = if via_alias { INFERRED_CONFIDENCE } else { EXPLICIT_CONFIDENCE };
            RequirementField::new(area, confidence)
        })
    }
}

#[async_trait]
impl RequirementExtractor for RuleBasedExtractor {
    async fn extract(
        &self,
        text: &str,
        _current: &RequirementSet,
    ) -> Result<PartialRequirementSet, ExtractionError> {
        Ok(self.extract_requirements(text))
    }
}

/// Picks the extractor named by `conversation.extractor`.
pub fn from_config(
    config: &AppConfig,
    areas: AreaDirectory,
) -> Result<Arc<dyn RequirementExtractor>, LlmError> {
    match config.conversation.extractor {
        ExtractorKind::Rules => Ok(Arc::new(RuleBasedExtractor::new(areas))),
        ExtractorKind::Llm => {
            let client = HttpLlmClient::from_config(&config.llm)?;
            Ok(Arc::new(LlmRequirementExtractor::new(Arc::new(client), areas)))
        }
    }
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase().replace("off-plan", "offplan").replace("off plan", "offplan")
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || character == '.' {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized
        .split_whitespace()
        .map(|token| token.trim_matches('.').to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn contains_any(tokens: &[String], words: &[&str]) -> bool {
    tokens.iter().any(|token| words.contains(&token.as_str()))
}

fn extract_transaction_type(
    normalized_text: &str,
    tokens: &[String],
) -> Option<RequirementField<TransactionType>> {
    let rent = contains_any(tokens, RENT_WORDS) || normalized_text.contains("to let");
    let buy = contains_any(tokens, BUY_WORDS) || normalized_text.contains("for sale");

    match (rent, buy) {
        (true, false) => Some(RequirementField::new(TransactionType::Rent, EXPLICIT_CONFIDENCE)),
        (false, true) => Some(RequirementField::new(TransactionType::Buy, EXPLICIT_CONFIDENCE)),
        (true, true) => {
            let first = if first_position(tokens, RENT_WORDS) < first_position(tokens, BUY_WORDS) {
                TransactionType::Rent
            } else {
                TransactionType::Buy
            };
            Some(RequirementField::new(first, CONFLICTING_CONFIDENCE))
        }
        (false, false) => {
            if contains_any(tokens, RENT_CUES) {
                Some(RequirementField::new(TransactionType::Rent, INFERRED_CONFIDENCE))
            } else if contains_any(tokens, BUY_CUES) {
                Some(RequirementField::new(TransactionType::Buy, INFERRED_CONFIDENCE))
            } else {
                None
            }
        }
    }
}

fn first_position(tokens: &[String], words: &[&str]) -> usize {
    tokens.iter().position(|token| words.contains(&token.as_str())).unwrap_or(usize::MAX)
}

fn extract_property_type(
    normalized_text: &str,
    tokens: &[String],
) -> Option<RequirementField<PropertyType>> {
    if normalized_text.contains("town house") {
        return Some(RequirementField::new(PropertyType::Townhouse, EXPLICIT_CONFIDENCE));
    }
    tokens.iter().find_map(|token| {
        let property_type = token.parse::<PropertyType>().ok()?;
        let via_alias = matches!(token.as_str(), "flat" | "flats" | "apt" | "apts");
        let confidence = if via_alias { INFERRED_CONFIDENCE } else { EXPLICIT_CONFIDENCE };
        Some(RequirementField::new(property_type, confidence))
    })
}

fn extract_bedrooms(tokens: &[String]) -> Option<RequirementField<u32>> {
    for (index, token) in tokens.iter().enumerate() {
        if let Some(count) = glued_bedroom_count(token) {
            return Some(RequirementField::new(count, EXPLICIT_CONFIDENCE));
        }

        let next_is_unit =
            tokens.get(index + 1).is_some_and(|next| BEDROOM_UNITS.contains(&next.as_str()));
        if !next_is_unit {
            continue;
        }
        let count = token.parse::<u32>().ok().or_else(|| {
            NUMBER_WORDS.iter().find(|(word, _)| word == token).map(|(_, value)| *value)
        });
        if let Some(count) = count.filter(|count| *count <= 20) {
            return Some(RequirementField::new(count, EXPLICIT_CONFIDENCE));
        }
    }

    if contains_any(tokens, &["studio", "studios"]) {
        return Some(RequirementField::new(0, EXPLICIT_CONFIDENCE));
    }
    None
}

/// `2br`, `3bhk`, `4bed`.
fn glued_bedroom_count(token: &str) -> Option<u32> {
    let digits_end = token.find(|ch: char| !ch.is_ascii_digit())?;
    if digits_end == 0 || !BEDROOM_UNITS.contains(&&token[digits_end..]) {
        return None;
    }
    token[..digits_end].parse::<u32>().ok().filter(|count| *count <= 20)
}

fn extract_budget(text: &str, tokens: &[String]) -> Option<(BudgetRange, f64)> {
    let mut range = parse_budget(text)?;

    // "at least 80k" / "over 2M": a lone figure after a floor cue is a minimum.
    if range.min.is_none() && has_floor_cue(tokens) {
        range = BudgetRange { min: range.max, max: None };
    }

    let cued = contains_any(tokens, BUDGET_CUES)
        || tokens.iter().any(|token| token.ends_with('k') || token.ends_with('m'))
        || contains_any(tokens, &["million", "thousand", "mn"]);
    let confidence = if cued { EXPLICIT_CONFIDENCE } else { INFERRED_CONFIDENCE };
    Some((range, confidence))
}

fn has_floor_cue(tokens: &[String]) -> bool {
    tokens.windows(2).any(|pair| {
        let (cue, next) = (pair[0].as_str(), pair[1].as_str());
        let next_is_amount = next.starts_with(|ch: char| ch.is_ascii_digit());
        FLOOR_CUES.contains(&cue) && (next_is_amount || matches!(next, "aed" | "dhs"))
    }) || tokens.windows(3).any(|triple| {
        triple[0] == "more" && triple[1] == "than" && triple[2].starts_with(|ch: char| ch.is_ascii_digit())
    })
}
