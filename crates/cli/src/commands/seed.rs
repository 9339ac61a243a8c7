use std::path::Path;

use proptalk_core::config::LoadOptions;
use proptalk_db::fixtures::{DemoInventory, VerificationResult};
use proptalk_db::repositories::SqlPropertyRepository;

use crate::commands::{block_on, exit, load_config, open_database, CommandResult};

/// Upserts listings. Without `--file` the demo inventory is loaded and then
/// verified against the built-in copy.
pub fn run(options: &LoadOptions, file: Option<&Path>) -> CommandResult {
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let properties = match file {
        Some(path) => DemoInventory::read_file(path),
        None => DemoInventory::properties(),
    };
    let properties = match properties {
        Ok(properties) => properties,
        Err(error) => {
            return CommandResult::failure("seed", "seed_input", error.to_string(), exit::INPUT)
        }
    };

    let result = block_on("seed", async {
        let pool = open_database(&config).await?;
        let repo = SqlPropertyRepository::new(pool.clone());

        let seeded = DemoInventory::load_properties(&repo, properties)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), exit::MIGRATION))?;

        let verification = if file.is_none() {
            let verification = DemoInventory::verify(&repo)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), exit::INPUT))?;
            if !verification.all_passed {
                return Err(("seed_verification", verification_failure(&verification), exit::INPUT));
            }
            Some(verification)
        } else {
            None
        };

        pool.close().await;
        Ok((seeded, verification))
    });

    match result {
        Ok((seeded, verification)) => CommandResult::success_with_data(
            "seed",
            format!("{} properties loaded across {} areas", seeded.inserted, seeded.locations.len()),
            Some(serde_json::json!({ "seed": seeded, "verification": verification })),
        ),
        Err(failure) => failure,
    }
}

fn verification_failure(verification: &VerificationResult) -> String {
    let failed: Vec<&str> = verification
        .checks
        .iter()
        .filter(|check| !check.passed)
        .map(|check| check.name.as_str())
        .collect();
    if failed.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use proptalk_db::fixtures::{VerificationCheck, VerificationResult};

    use super::verification_failure;

    fn check(name: &str, passed: bool) -> VerificationCheck {
        VerificationCheck { name: name.to_string(), passed, detail: String::new() }
    }

    #[test]
    fn verification_message_names_failed_checks() {
        let verification = VerificationResult {
            all_passed: false,
            checks: vec![
                check("inventory_count", true),
                check("listings_match", false),
                check("buy_inventory", false),
            ],
        };
        assert_eq!(
            verification_failure(&verification),
            "seed verification failed for checks: listings_match, buy_inventory"
        );
    }

    #[test]
    fn verification_message_falls_back_when_no_check_failed() {
        let verification =
            VerificationResult { all_passed: false, checks: vec![check("inventory_count", true)] };
        assert_eq!(verification_failure(&verification), "some seed data failed to load");
    }
}
