use serde_json::Value;
use std::collections::HashSet;

use proptalk_core::search::AreaDirectory;

type SeedContractTestResult<T = ()> = Result<T, String>;

const INVENTORY: &str = include_str!("../../../config/fixtures/demo_inventory.json");

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

fn require_field<'a>(value: &'a Value, field_name: &str) -> SeedContractTestResult<&'a Value> {
    value.get(field_name).ok_or_else(|| format!("{field_name} should be present"))
}

fn require_str<'a>(value: &'a Value, field_name: &str) -> Result<&'a str, String> {
    require_field(value, field_name)?
        .as_str()
        .ok_or_else(|| format!("{field_name} should be a string"))
}

fn require_u64(value: &Value, field_name: &str) -> Result<u64, String> {
    require_field(value, field_name)?
        .as_u64()
        .ok_or_else(|| format!("{field_name} should be an unsigned integer"))
}

fn listings() -> SeedContractTestResult<Vec<Value>> {
    let parsed: Value = serde_json::from_str(INVENTORY).map_err(|error| error.to_string())?;
    parsed.as_array().cloned().ok_or_else(|| "inventory should be an array".to_string())
}

#[test]
fn every_listing_has_the_required_shape() -> SeedContractTestResult {
    let mut ids = HashSet::new();
    for listing in listings()? {
        let id = require_str(&listing, "id")?;
        require!(ids.insert(id.to_string()), "duplicate id {id}");

        let transaction = require_str(&listing, "transaction_type")?;
        require!(matches!(transaction, "buy" | "rent"), "{id}: bad transaction {transaction}");

        let property_type = require_str(&listing, "property_type")?;
        require!(
            matches!(
                property_type,
                "apartment" | "penthouse" | "studio" | "villa" | "townhouse" | "duplex"
            ),
            "{id}: bad property type {property_type}"
        );

        let bedrooms = require_u64(&listing, "bedrooms")?;
        require!(
            property_type != "studio" || bedrooms == 0,
            "{id}: studios should have zero bedrooms"
        );
        require!(require_u64(&listing, "price")? > 0, "{id}: price should be positive");
    }
    require!(ids.len() >= 40, "inventory should hold at least 40 listings");
    Ok(())
}

#[test]
fn every_location_is_a_known_canonical_area() -> SeedContractTestResult {
    let areas = AreaDirectory::dubai();
    for listing in listings()? {
        let location = require_str(&listing, "location")?;
        let canonical = areas.canonicalize(location);
        require!(
            canonical.as_deref() == Some(location),
            "{location} should be a canonical area name"
        );
    }
    Ok(())
}

#[test]
fn inventory_covers_the_documented_walkthrough() -> SeedContractTestResult {
    let listings = listings()?;
    let matches_walkthrough = listings.iter().any(|listing| {
        listing["transaction_type"] == "rent"
            && listing["location"] == "Dubai Marina"
            && listing["property_type"] == "apartment"
            && listing["bedrooms"] == 2
            && listing["price"].as_u64().is_some_and(|price| (80_000..=100_000).contains(&price))
    });
    require!(matches_walkthrough, "a 2BR Marina rental between 80k and 100k should exist");

    let has_sales = listings.iter().any(|listing| listing["transaction_type"] == "buy");
    require!(has_sales, "inventory should include listings for sale");
    Ok(())
}
