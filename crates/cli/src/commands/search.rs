use std::sync::Arc;

use clap::Args;
use proptalk_core::config::LoadOptions;
use proptalk_core::domain::requirements::{PropertyType, RequirementField, RequirementSet, TransactionType};
use proptalk_core::search::{AreaDirectory, SearchResolutionEngine};
use proptalk_core::parse_budget;
use proptalk_db::repositories::SqlPropertyRepository;

use crate::commands::{block_on, exit, load_config, open_database, CommandResult};

/// Flags are taken as stated by the operator, so every field is set with
/// full confidence.
const OPERATOR_CONFIDENCE: f64 = 1.0;

#[derive(Debug, Clone, Default, Args)]
pub struct SearchArgs {
    #[arg(long, help = "buy or rent")]
    pub transaction: Option<String>,
    #[arg(long, help = "Area name or alias, e.g. \"Dubai Marina\" or \"JLT\"")]
    pub location: Option<String>,
    #[arg(long = "type", help = "apartment, villa, townhouse, penthouse, studio or duplex")]
    pub property_type: Option<String>,
    #[arg(long)]
    pub bedrooms: Option<u32>,
    #[arg(long, help = "Minimum price")]
    pub min: Option<u64>,
    #[arg(long, help = "Maximum price")]
    pub max: Option<u64>,
    #[arg(long, help = "Budget as free text, e.g. \"80-100k\" or \"under 2M\"")]
    pub budget: Option<String>,
}

impl SearchArgs {
    pub fn requirements(&self, areas: &AreaDirectory) -> Result<RequirementSet, String> {
        let mut requirements = RequirementSet::default();

        if let Some(raw) = &self.transaction {
            let parsed: TransactionType = raw.parse().map_err(|error| format!("{error}"))?;
            requirements.transaction_type = Some(RequirementField::new(parsed, OPERATOR_CONFIDENCE));
        }
        if let Some(raw) = &self.location {
            let canonical = areas.canonicalize(raw).unwrap_or_else(|| raw.trim().to_string());
            requirements.location = Some(RequirementField::new(canonical, OPERATOR_CONFIDENCE));
        }
        if let Some(raw) = &self.property_type {
            let parsed: PropertyType = raw.parse().map_err(|error| format!("{error}"))?;
            requirements.property_type = Some(RequirementField::new(parsed, OPERATOR_CONFIDENCE));
        }
        if let Some(bedrooms) = self.bedrooms {
            requirements.bedrooms = Some(RequirementField::new(bedrooms, OPERATOR_CONFIDENCE));
        }

        let (mut min, mut max) = (self.min, self.max);
        if let Some(text) = &self.budget {
            let range = parse_budget(text).ok_or_else(|| format!("could not read budget `{text}`"))?;
            min = min.or(range.min);
            max = max.or(range.max);
        }
        if let (Some(low), Some(high)) = (min, max) {
            if low > high {
                return Err(format!("minimum price {low} is above maximum price {high}"));
            }
        }
        requirements.budget_min = min.map(|value| RequirementField::new(value, OPERATOR_CONFIDENCE));
        requirements.budget_max = max.map(|value| RequirementField::new(value, OPERATOR_CONFIDENCE));
        Ok(requirements)
    }
}

pub fn run(options: &LoadOptions, args: &SearchArgs) -> CommandResult {
    let config = match load_config("search", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let requirements = match args.requirements(&AreaDirectory::default()) {
        Ok(requirements) => requirements,
        Err(message) => return CommandResult::failure("search", "search_input", message, exit::INPUT),
    };

    let result = block_on("search", async {
        let pool = open_database(&config).await?;
        let engine = SearchResolutionEngine::new(Arc::new(SqlPropertyRepository::new(pool.clone())))
            .with_settings(config.search.settings());
        let outcome = engine.resolve(&requirements).await;
        pool.close().await;
        outcome.map_err(|error| ("search_unavailable", error.to_string(), exit::SEARCH_UNAVAILABLE))
    });

    match result {
        Ok(found) => CommandResult::success_with_data(
            "search",
            format!("{} properties via {:?} tier", found.properties.len(), found.tier),
            serde_json::to_value(&found).ok(),
        ),
        Err(failure) => failure,
    }
}

#[cfg(test)]
mod tests {
    use proptalk_core::domain::requirements::{PropertyType, TransactionType};
    use proptalk_core::search::AreaDirectory;

    use super::SearchArgs;

    #[test]
    fn flags_become_fully_confident_requirements() {
        let args = SearchArgs {
            transaction: Some("rent".to_string()),
            location: Some("marina".to_string()),
            property_type: Some("apartments".to_string()),
            bedrooms: Some(2),
            budget: Some("80-100k".to_string()),
            ..SearchArgs::default()
        };

        let requirements = args.requirements(&AreaDirectory::default()).expect("valid flags");
        assert_eq!(requirements.transaction_type.map(|field| field.value), Some(TransactionType::Rent));
        assert_eq!(requirements.location.map(|field| field.value).as_deref(), Some("Dubai Marina"));
        assert_eq!(requirements.property_type.map(|field| field.value), Some(PropertyType::Apartment));
        assert_eq!(requirements.budget_min.map(|field| field.value), Some(80_000));
        assert_eq!(requirements.budget_max.map(|field| field.value), Some(100_000));
    }

    #[test]
    fn explicit_bounds_override_budget_text() {
        let args = SearchArgs {
            budget: Some("under 2M".to_string()),
            max: Some(1_500_000),
            ..SearchArgs::default()
        };
        let requirements = args.requirements(&AreaDirectory::default()).expect("valid flags");
        assert_eq!(requirements.budget_max.map(|field| field.value), Some(1_500_000));
        assert!(requirements.budget_min.is_none());
    }

    #[test]
    fn rejects_unknown_values_and_inverted_bounds() {
        let bad_type = SearchArgs { property_type: Some("castle".to_string()), ..SearchArgs::default() };
        assert!(bad_type.requirements(&AreaDirectory::default()).is_err());

        let inverted = SearchArgs { min: Some(200_000), max: Some(100_000), ..SearchArgs::default() };
        assert!(inverted.requirements(&AreaDirectory::default()).is_err());
    }
}
