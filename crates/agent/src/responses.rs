//! Reply wording. Every user-facing sentence the runtime sends is built here.

use proptalk_core::domain::budget::format_money;
use proptalk_core::domain::property::{Property, PropertyFilter};
use proptalk_core::domain::requirements::{RequiredField, RequirementSet, TransactionType};
use proptalk_core::pagination::PropertyBatch;
use proptalk_core::search::{MarketAnswer, MarketStatistic, SearchResult, SearchTier};

pub const REPROMPT: &str = "Sorry, I didn't quite catch that. Could you tell me again what you're \
looking for? For example: \"2-bedroom apartment to rent in Dubai Marina, 80-100k\".";

pub const SEARCH_UNAVAILABLE: &str = "Property search is temporarily unavailable. Your criteria \
are saved, so just send another message in a moment and I'll try again.";

pub const MARKET_UNAVAILABLE: &str = "I can't reach the property listings right now, so I can't \
answer that. Please ask again in a moment.";

fn field_question(field: RequiredField) -> &'static str {
    match field {
        RequiredField::TransactionType => "whether you want to buy or rent",
        RequiredField::Location => "which area you have in mind (e.g. Dubai Marina, Downtown, JVC)",
        RequiredField::Budget => "your budget (e.g. 80-100k, or up to 1.5M)",
        RequiredField::PropertyType => "the property type (apartment, villa, townhouse, ...)",
    }
}

fn join_natural(parts: &[&str]) -> String {
    match parts {
        [] => String::new(),
        [only] => (*only).to_string(),
        [first, second] => format!("{first} and {second}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    }
}

/// Asks only for the fields that are still missing.
pub fn missing_fields(requirements: &RequirementSet, missing: &[RequiredField]) -> String {
    let questions: Vec<&str> = missing.iter().map(|field| field_question(*field)).collect();
    let summary = requirements.summary();
    if summary.is_empty() {
        return format!(
            "Hi! I can help you find a property in Dubai. Tell me {}.",
            join_natural(&questions)
        );
    }
    format!("Got it: {summary}. To start searching I still need {}.", join_natural(&questions))
}

/// Opening line for a fresh result set, worded after the tier that produced it.
pub fn results_intro(result: &SearchResult, requirements: &RequirementSet) -> String {
    let total = result.properties.len();
    let noun = if total == 1 { "property" } else { "properties" };
    match result.tier {
        SearchTier::Exact => {
            format!("I found {total} {noun} matching {}.", requirements.summary())
        }
        SearchTier::SingleRelax | SearchTier::MultiRelax => {
            let mut intro = result.suggestions.join(" ");
            intro.push_str(&format!(" That gives {total} {noun}."));
            intro
        }
        SearchTier::MarketIntel => market_guidance(result),
    }
}

/// Nothing fits even after relaxing; explain what the market does have.
pub fn market_guidance(result: &SearchResult) -> String {
    let mut reply = String::from("I couldn't find a match for those criteria.");
    for suggestion in &result.suggestions {
        reply.push(' ');
        reply.push_str(suggestion);
    }
    reply
}

/// Numbered listing. Numbers restart at 1 for each batch so "the third one"
/// means the third line the user can see.
pub fn batch_listing(batch: &PropertyBatch, currency: &str) -> String {
    let mut lines: Vec<String> = batch
        .properties
        .iter()
        .enumerate()
        .map(|(index, property)| format!("{}. {}", index + 1, property.headline(currency)))
        .collect();

    if batch.remaining > 0 {
        lines.push(format!(
            "{} more available. Say \"show more\" to see them, or \"tell me about the 2nd one\" for details.",
            batch.remaining
        ));
    } else if batch.first_position > 1 {
        lines.push(format!("That's the last of the {} properties.", batch.total));
    }
    lines.join("\n")
}

pub fn exhausted(total: usize) -> String {
    let noun = if total == 1 { "property" } else { "properties" };
    format!(
        "You've seen all {total} {noun} for this search. Change the area, budget or \
         property type and I'll search again."
    )
}

pub fn nothing_to_page() -> &'static str {
    "There are no results to page through yet. Tell me what you're looking for and I'll search."
}

pub fn describe_property(property: &Property, currency: &str) -> String {
    let mut lines = vec![format!("*{}*", property.headline(currency))];
    lines.push(format!("Reference: {}", property.id));
    if let Some(building) = &property.building_name {
        lines.push(format!("Building: {building}"));
    }
    if let Some(size) = property.size_sqft {
        lines.push(format!("Size: {} sq ft", format_money(u64::from(size))));
        if size > 0 {
            let per_sqft = property.price / u64::from(size);
            lines.push(format!("Price per sq ft: {} {currency}", format_money(per_sqft)));
        }
    }
    let price_line = match property.transaction_type {
        TransactionType::Rent => format!("Annual rent: {} {currency}", format_money(property.price)),
        TransactionType::Buy => format!("Asking price: {} {currency}", format_money(property.price)),
    };
    lines.push(price_line);
    lines.push("Ask about another listing by number, or say \"show more\" for other properties.".to_string());
    lines.join("\n")
}

pub fn clarify_reference(ordinal: usize, batch_len: usize) -> String {
    if batch_len == 0 {
        return "I don't have a list on screen to pick from yet. Tell me what you're looking for first."
            .to_string();
    }
    format!(
        "I can't find number {ordinal} in the current list. Pick a number between 1 and {batch_len}."
    )
}

pub fn stale_property() -> &'static str {
    "That listing is no longer available."
}

pub fn next_steps(remaining: usize) -> String {
    if remaining > 0 {
        format!(
            "There are {remaining} more properties in this search. Say \"show more\", ask about one \
             by number, or change any criterion to search again."
        )
    } else {
        "Ask about any listing by number, or change a criterion to search again.".to_string()
    }
}

/// e.g. `2BR apartments to rent in Dubai Marina`.
fn market_scope(scope: &PropertyFilter) -> String {
    let mut parts = Vec::new();
    match scope.bedrooms {
        Some(0) if scope.property_type.is_none() => parts.push("studio".to_string()),
        Some(0) | None => {}
        Some(bedrooms) => parts.push(format!("{bedrooms}BR")),
    }
    parts.push(scope.property_type.map_or("properties", |kind| kind.plural()).to_string());
    match scope.transaction_type {
        Some(TransactionType::Rent) => parts.push("to rent".to_string()),
        Some(TransactionType::Buy) => parts.push("for sale".to_string()),
        None => {}
    }
    if let Some(location) = &scope.location {
        parts.push(format!("in {location}"));
    }
    parts.join(" ")
}

/// Answers a market question in the scope it was asked about.
pub fn market_answer(answer: &MarketAnswer, currency: &str) -> String {
    let scope = market_scope(&answer.question.scope);
    let period = match answer.question.scope.transaction_type {
        Some(TransactionType::Rent) => "/yr",
        _ => "",
    };
    let matching = answer.matching;
    if matching == 0 {
        return format!("There are no {scope} listed right now.");
    }

    let lead = match answer.question.statistic {
        MarketStatistic::Count => {
            let range = match (answer.min_price, answer.max_price) {
                (Some(min), Some(max)) => format!(
                    ", priced from {} to {} {currency}{period}",
                    format_money(min),
                    format_money(max)
                ),
                _ => String::new(),
            };
            let verb = if matching == 1 { "is" } else { "are" };
            return format!("There {verb} {matching} {scope} listed{range}.");
        }
        MarketStatistic::AveragePrice => {
            let average = answer.average_price.map(format_money).unwrap_or_default();
            return format!(
                "The average price for {scope} is {average} {currency}{period}, across {matching} listings."
            );
        }
        MarketStatistic::Cheapest => "Cheapest",
        MarketStatistic::MostExpensive => "Most expensive",
        MarketStatistic::Largest => "Largest",
        MarketStatistic::Smallest => "Smallest",
    };

    if answer.highlights.is_empty() {
        return format!("None of the {matching} {scope} list a size, so I can't rank them by size.");
    }
    let mut lines = vec![format!("{lead} of {matching} {scope}:")];
    for (index, property) in answer.highlights.iter().enumerate() {
        let mut line = format!("{}. {}", index + 1, property.headline(currency));
        if let Some(size) = property.size_sqft {
            line.push_str(&format!(" · {} sq ft", format_money(u64::from(size))));
        }
        lines.push(line);
    }
    lines.push("Tell me what you're after and I'll run a full search.".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use proptalk_core::domain::property::{Property, PropertyFilter, PropertyId};
    use proptalk_core::domain::requirements::{
        PropertyType, RequiredField, RequirementField, RequirementSet, TransactionType,
    };
    use proptalk_core::pagination::PropertyBatch;
    use proptalk_core::search::{MarketAnswer, MarketQuestion, MarketStatistic, SearchResult};

    use super::{
        batch_listing, clarify_reference, describe_property, exhausted, market_answer,
        missing_fields, results_intro,
    };

    fn listing(id: &str, price: u64) -> Property {
        Property {
            id: PropertyId(id.to_string()),
            transaction_type: TransactionType::Rent,
            location: "Dubai Marina".to_string(),
            property_type: PropertyType::Apartment,
            bedrooms: 2,
            price,
            building_name: Some("Marina Gate".to_string()),
            size_sqft: Some(1_200),
        }
    }

    #[test]
    fn prompt_names_only_missing_fields() {
        let mut requirements = RequirementSet::default();
        requirements.transaction_type = Some(RequirementField::new(TransactionType::Rent, 0.9));
        requirements.location = Some(RequirementField::new("JVC".to_string(), 0.9));

        let reply = missing_fields(&requirements, &[RequiredField::Budget, RequiredField::PropertyType]);
        assert!(reply.contains("budget"));
        assert!(reply.contains("property type"));
        assert!(!reply.contains("buy or rent"));
        assert!(!reply.contains("which area"));
    }

    #[test]
    fn listing_notes_remaining_count() {
        let batch = PropertyBatch {
            properties: vec![listing("P-1", 88_000), listing("P-2", 95_000)],
            first_position: 1,
            total: 39,
            remaining: 37,
        };
        let text = batch_listing(&batch, "AED");
        assert!(text.starts_with("1. 2BR apartment in Marina Gate, Dubai Marina"));
        assert!(text.contains("37 more available"));
    }

    #[test]
    fn exact_intro_summarises_criteria() {
        let mut requirements = RequirementSet::default();
        requirements.location = Some(RequirementField::new("Dubai Marina".to_string(), 0.9));
        let result = SearchResult::exact(vec![listing("P-1", 88_000)]);
        assert_eq!(results_intro(&result, &requirements), "I found 1 property matching Dubai Marina.");
    }

    #[test]
    fn follow_up_wording() {
        let description = describe_property(&listing("P-7", 96_000), "AED");
        assert!(description.contains("Reference: P-7"));
        assert!(description.contains("Annual rent: 96,000 AED"));
        assert!(description.contains("Price per sq ft: 80 AED"));

        assert!(clarify_reference(9, 5).contains("between 1 and 5"));
        assert!(exhausted(23).contains("all 23 properties"));
    }

    fn marina_two_bed_rentals(statistic: MarketStatistic) -> MarketQuestion {
        MarketQuestion {
            statistic,
            scope: PropertyFilter {
                transaction_type: Some(TransactionType::Rent),
                location: Some("Dubai Marina".to_string()),
                property_type: Some(PropertyType::Apartment),
                bedrooms: Some(2),
                ..PropertyFilter::default()
            },
        }
    }

    #[test]
    fn market_answers_name_their_scope() {
        let cheapest = MarketAnswer {
            question: marina_two_bed_rentals(MarketStatistic::Cheapest),
            matching: 4,
            min_price: Some(88_000),
            max_price: Some(130_000),
            average_price: Some(101_000),
            highlights: vec![listing("P-1", 88_000)],
        };
        let text = market_answer(&cheapest, "AED");
        assert!(text.starts_with("Cheapest of 4 2BR apartments to rent in Dubai Marina:"));
        assert!(text.contains("1. 2BR apartment in Marina Gate, Dubai Marina · 88,000 AED/yr · 1,200 sq ft"));

        let average = MarketAnswer {
            question: marina_two_bed_rentals(MarketStatistic::AveragePrice),
            highlights: Vec::new(),
            ..cheapest.clone()
        };
        assert_eq!(
            market_answer(&average, "AED"),
            "The average price for 2BR apartments to rent in Dubai Marina is 101,000 AED/yr, across 4 listings."
        );

        let none = MarketAnswer { matching: 0, ..average };
        assert_eq!(
            market_answer(&none, "AED"),
            "There are no 2BR apartments to rent in Dubai Marina listed right now."
        );
    }
}
