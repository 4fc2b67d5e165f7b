use benefitflow_db::{connect_with_config, migrations, DemoSeedDataset, SeedResult};

use crate::commands::{prepare, CommandResult};

pub fn run(reset: bool) -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let outcome = async {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;

            if reset {
                DemoSeedDataset::clean(&pool)
                    .await
                    .map_err(|error| ("seed_reset", error.to_string(), 5u8))?;
            }

            let seeded = DemoSeedDataset::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

            let verification = DemoSeedDataset::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
            if !verification.all_present {
                return Err(("seed_verification", failure_message(&verification.checks), 6u8));
            }
            Ok(seeded)
        }
        .await;

        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo dataset loaded:\n  - employees: {}\n  - properties: {}\n  - requests: {}",
        seeded.employees_seeded.join(", "),
        seeded.properties_seeded.join(", "),
        seeded.requests_seeded.join(", ")
    )
}

fn failure_message(checks: &[(&str, bool)]) -> String {
    let failed =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use benefitflow_db::SeedResult;

    use super::{failure_message, summary};

    #[test]
    fn failure_message_names_failed_checks() {
        let checks = [("EMP-HR-001", true), ("HOUSE-BAGUIO", false), ("booking-row", false)];

        assert_eq!(
            failure_message(&checks),
            "seed verification failed for checks: HOUSE-BAGUIO, booking-row"
        );
    }

    #[test]
    fn failure_message_falls_back_to_generic_text() {
        assert_eq!(failure_message(&[("EMP-HR-001", true)]), "some seed data failed to load");
    }

    #[test]
    fn summary_lists_each_seeded_group() {
        let seeded = SeedResult {
            employees_seeded: vec!["EMP-HR-001", "EMP-STAFF-001"],
            properties_seeded: vec!["HOUSE-BAGUIO"],
            requests_seeded: vec!["HB-20300510-DEMO0001"],
        };

        let text = summary(&seeded);
        assert!(text.contains("  - employees: EMP-HR-001, EMP-STAFF-001"));
        assert!(text.contains("  - properties: HOUSE-BAGUIO"));
        assert!(text.contains("  - requests: HB-20300510-DEMO0001"));
    }
}
