use overtime_core::config::LoadOptions;
use overtime_db::{OrganizationSeedDataset, SeedResult};

use crate::commands::{connect_and_migrate, prepare, CommandResult, StepFailure};

pub fn run(options: &LoadOptions) -> CommandResult {
    let (config, runtime) = match prepare("seed", options) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_and_migrate(&config).await?;

        let seeded = OrganizationSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = OrganizationSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedResult, StepFailure> = if verification.all_present {
            Ok(seeded)
        } else {
            Err(("seed_verification", verification_failure_message(&verification.checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!(
                "demo organization loaded: {} facility, {} departments, {} users",
                seeded.facilities, seeded.departments, seeded.users
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_failure_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "some seed rows failed to load".to_string()
    } else {
        format!("seed verification failed for: {}", failed_checks.join(", "))
    }
}
