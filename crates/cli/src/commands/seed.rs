use feedstock_db::{connect_from_config, migrations, DemoSeedDataset, SeedRecordInfo};

use crate::commands::{
    load_config, runtime, CommandResult, StepError, EXIT_DATABASE, EXIT_MIGRATION,
    EXIT_SEED_VERIFICATION,
};

/// Loads the demo tenant dataset. Safe to rerun: existing rows are left alone.
pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED_VERIFICATION))?;

        let outcome: Result<Vec<SeedRecordInfo>, StepError> = if verification.all_present {
            Ok(seeded.records_seeded)
        } else {
            let message = failed_checks_message(&verification.checks);
            Err(("seed_verification", message, EXIT_SEED_VERIFICATION))
        };

        pool.close().await;
        outcome
    });

    match result {
        Ok(records) => CommandResult::success("seed", summary(&records)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(records: &[SeedRecordInfo]) -> String {
    let lines = records
        .iter()
        .map(|record| format!("  - {}: {} ({})", record.table, record.id, record.description))
        .collect::<Vec<_>>();
    format!(
        "demo dataset ready for tenant `{}`:\n{}",
        DemoSeedDataset::TENANT_ID,
        lines.join("\n")
    )
}

fn failed_checks_message(checks: &[(&'static str, bool)]) -> String {
    let failed = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::failed_checks_message;

    #[test]
    fn verification_message_names_failed_checks() {
        let checks = [("rate-card", true), ("intake-entries", false), ("lot-ledger", false)];

        assert_eq!(
            failed_checks_message(&checks),
            "Seed verification failed for checks: intake-entries, lot-ledger"
        );
    }

    #[test]
    fn verification_message_falls_back_to_generic_when_no_check_failed() {
        let checks = [("rate-card", true)];

        assert_eq!(failed_checks_message(&checks), "Some seed data failed to load");
    }
}
