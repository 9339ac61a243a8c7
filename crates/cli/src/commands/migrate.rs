use proptalk_core::config::LoadOptions;
use proptalk_db::migrations;

use crate::commands::{block_on, exit, load_config, open_database, CommandResult};

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("migrate", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let result = block_on("migrate", async {
        let pool = open_database(&config).await?;
        let applied = migrations::applied_count(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), exit::MIGRATION))?;
        pool.close().await;
        Ok(applied)
    });

    match result {
        Ok(applied) => {
            CommandResult::success("migrate", format!("schema up to date ({applied} migrations applied)"))
        }
        Err(failure) => failure,
    }
}
