use std::sync::Arc;
use std::time::Instant;

use anyhow::{ensure, Context};
use chrono::{Duration, Utc};
use serde::Serialize;

use overtime_core::config::{AppConfig, LoadOptions};
use overtime_core::domain::organization::DepartmentId;
use overtime_core::domain::overtime::OvertimeStatus;
use overtime_core::domain::user::{UserId, UserRole};
use overtime_core::workflow::{Actor, NewOvertimeRequest, OvertimeWorkflowService, WorkflowSettings};
use overtime_core::ApprovalRoutingResolver;
use overtime_db::fixtures::{
    CUSTOMER_GATED, DEPARTMENT_ASSEMBLY, MANAGER, SUPERVISOR_ASSEMBLY, WORKER_ASSEMBLY,
};
use overtime_db::{
    connect_with_settings, migrations, DbPool, OrganizationSeedDataset, SqlOrganizationDirectory,
    SqlRequestStore,
};

use crate::commands::CommandResult;

const CHECKS: [&str; 5] =
    ["config_validation", "db_connectivity", "migrations", "seed_dataset", "approval_chain"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(options.clone())) {
        Ok((elapsed_ms, config)) => {
            checks.push(pass(
                "config_validation",
                elapsed_ms,
                "configuration loaded and validated",
            ));
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(fail("config_validation", elapsed_ms, error.to_string()));
            return finalize_report(checks, started);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let message = format!("failed to initialize async runtime: {error}");
            checks.push(fail("db_connectivity", 0, message));
            return finalize_report(checks, started);
        }
    };

    runtime.block_on(async {
        let db_started = Instant::now();
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => {
                checks.push(pass(
                    "db_connectivity",
                    elapsed_ms(db_started),
                    format!("connected using `{}`", config.database.url),
                ));
                pool
            }
            Err(error) => {
                checks.push(fail(
                    "db_connectivity",
                    elapsed_ms(db_started),
                    format!("failed to connect: {error}"),
                ));
                return;
            }
        };

        run_database_checks(&pool, &config, &mut checks).await;
        pool.close().await;
    });

    finalize_report(checks, started)
}

async fn run_database_checks(pool: &DbPool, config: &AppConfig, checks: &mut Vec<SmokeCheck>) {
    let migration_started = Instant::now();
    if let Err(error) = migrations::run_pending(pool).await {
        checks.push(fail(
            "migrations",
            elapsed_ms(migration_started),
            format!("migration execution failed: {error}"),
        ));
        return;
    }
    checks.push(pass("migrations", elapsed_ms(migration_started), "migrations are applied"));

    let seed_started = Instant::now();
    match OrganizationSeedDataset::load(pool).await {
        Ok(seeded) => checks.push(pass(
            "seed_dataset",
            elapsed_ms(seed_started),
            format!("demo organization present ({} users)", seeded.users),
        )),
        Err(error) => {
            checks.push(fail("seed_dataset", elapsed_ms(seed_started), error.to_string()));
            return;
        }
    }

    let chain_started = Instant::now();
    match approval_chain(pool, config).await {
        Ok(message) => checks.push(pass("approval_chain", elapsed_ms(chain_started), message)),
        Err(error) => {
            checks.push(fail("approval_chain", elapsed_ms(chain_started), format!("{error:#}")))
        }
    }
}

/// Files a request that needs every stage and walks it to `APPROVED`.
async fn approval_chain(pool: &DbPool, config: &AppConfig) -> anyhow::Result<String> {
    let directory = Arc::new(SqlOrganizationDirectory::new(pool.clone()));
    let store = Arc::new(SqlRequestStore::new(pool.clone()));
    let service = OvertimeWorkflowService::new(
        directory.clone(),
        store,
        ApprovalRoutingResolver::new(directory),
    )
    .with_settings(WorkflowSettings::from(&config.workflow));

    let start_time = Utc::now() + Duration::days(1);
    let request = service
        .create_request(NewOvertimeRequest {
            worker_id: UserId::new(WORKER_ASSEMBLY),
            department_id: Some(DepartmentId(DEPARTMENT_ASSEMBLY.to_owned())),
            customer_id: Some(UserId::new(CUSTOMER_GATED)),
            start_time,
            end_time: start_time + Duration::hours(2),
            reason: "smoke check".to_owned(),
        })
        .await
        .context("create request")?;
    ensure!(
        request.requires_manager_approval() && request.requires_customer_approval(),
        "demo routing should require manager and customer approval"
    );

    let approvers = [
        (SUPERVISOR_ASSEMBLY, UserRole::Supervisor, OvertimeStatus::PendingManager),
        (MANAGER, UserRole::Manager, OvertimeStatus::PendingCustomer),
        (CUSTOMER_GATED, UserRole::Customer, OvertimeStatus::Approved),
    ];
    for (approver, role, expected) in approvers {
        let updated = service
            .approve_request(request.id(), &Actor::new(approver, "", role), None)
            .await
            .with_context(|| format!("{role} approval"))?;
        ensure!(
            updated.status() == expected,
            "{role} approval left request in {} instead of {expected}",
            updated.status()
        );
    }

    Ok(format!("request {} approved through supervisor, manager and customer", request.id()))
}

fn pass(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message: message.into() }
}

fn fail(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message: message.into() }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed_ms(started), value)),
        Err(error) => Err((elapsed_ms(started), error)),
    }
}

fn finalize_report(mut checks: Vec<SmokeCheck>, started: Instant) -> CommandResult {
    // Checks after the first failure never ran.
    for name in CHECKS.into_iter().skip(checks.len()) {
        checks.push(SmokeCheck {
            name,
            status: SmokeStatus::Skipped,
            elapsed_ms: 0,
            message: "skipped due to previous failure".to_string(),
        });
    }

    let total_elapsed_ms = elapsed_ms(started);
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
