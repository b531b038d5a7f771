//! Plan execution: install the table/indexes if new, diff and
//! alter if not, run pending upgrades in ascending order, seed new
//! collections, and record the resulting version — all inside one
//! transaction so a failure anywhere leaves the stored version untouched.

use skibbadb_core::ddl::build_install_plan;
use skibbadb_core::{CollectionDescriptor, Driver, Result, SqlDialect};

use crate::diff::{self, ensure_non_breaking};
use crate::meta;

const DRY_RUN_ENV_VAR: &str = "SKIBBADB_MIGRATE";

fn is_dry_run() -> bool {
    std::env::var(DRY_RUN_ENV_VAR).map(|v| v == "print").unwrap_or(false)
}

/// Initialize or upgrade a single collection's backing table to its declared
/// version. Idempotent: re-running against an already-current collection is
/// a no-op beyond the install statements (all `IF NOT EXISTS`).
pub fn migrate_collection(driver: &dyn Driver, descriptor: &CollectionDescriptor, dialect: &dyn SqlDialect) -> Result<()> {
    meta::initialize_migrations_table(driver)?;
    let stored_version = meta::get_stored_version(driver, &descriptor.name)?;
    let declared_version = descriptor.version;
    let is_new = stored_version == 0;

    let install = build_install_plan(descriptor, dialect);
    let current_hash = meta::fingerprint(descriptor);
    let schema_unchanged = !is_new && meta::get_stored_schema_hash(driver, &descriptor.name)?.as_deref() == Some(current_hash.as_str());

    let schema_diff = if is_new || schema_unchanged {
        diff::SchemaDiff::default()
    } else {
        let existing_columns = diff::introspect_columns(driver, &descriptor.name)?;
        let schema_diff = diff::generate_schema_diff(descriptor, &existing_columns, dialect);
        ensure_non_breaking(&descriptor.name, &schema_diff).map_err(skibbadb_core::Error::from)?;
        schema_diff
    };

    if is_dry_run() {
        log::info!(
            "[dry-run] {} create_table: {}",
            descriptor.name,
            install.create_table
        );
        for stmt in &install.create_indexes {
            log::info!("[dry-run] {} index: {}", descriptor.name, stmt);
        }
        for stmt in &schema_diff.alters {
            log::info!("[dry-run] {} alter: {}", descriptor.name, stmt);
        }
        let pending: Vec<u32> = pending_versions(descriptor, stored_version, declared_version);
        log::info!("[dry-run] {} pending upgrades: {:?}", descriptor.name, pending);
        return Ok(());
    }

    driver.transaction(&mut || {
        driver.exec(&install.create_table, &[])?;
        for stmt in &install.create_indexes {
            driver.exec(stmt, &[])?;
        }
        for stmt in &schema_diff.alters {
            driver.exec(stmt, &[])?;
        }

        for version in pending_versions(descriptor, stored_version, declared_version) {
            if let Some(step) = descriptor.upgrades.get(&version) {
                if step.should_run() {
                    (step.migrate)()?;
                }
            }
        }

        if is_new {
            if let Some(seed) = &descriptor.seed {
                seed()?;
            }
        }

        meta::record_version(driver, &descriptor.name, declared_version, &current_hash)
    })
}

fn pending_versions(descriptor: &CollectionDescriptor, stored: u32, declared: u32) -> Vec<u32> {
    if declared <= stored {
        return Vec::new();
    }
    ((stored + 1)..=declared).filter(|v| descriptor.upgrades.contains_key(v)).collect()
}
