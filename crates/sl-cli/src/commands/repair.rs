//! Repair command implementation

use anyhow::Result;
use sl_engine::RepairAction;

use crate::cli::{GlobalArgs, RepairArgs};
use crate::commands::common::{self, build_migrator};

/// Execute the repair command
pub async fn execute(args: &RepairArgs, global: &GlobalArgs) -> Result<()> {
    let action = repair_action(args);
    let (_project, migrator, _target) = build_migrator(global).await?;

    let outcome = migrator
        .repair(action, args.dry_run)
        .await
        .map_err(|e| common::fail(&e))?;

    println!("{}", outcome.summary);
    if let Some(record) = &outcome.record {
        log::debug!(
            "History row: version={} action={} success={} checksum={}",
            record.version,
            record.action,
            record.success,
            record.checksum
        );
    }
    Ok(())
}

/// Clap guarantees exactly one action flag is present.
fn repair_action(args: &RepairArgs) -> RepairAction {
    match (args.realign, args.reset) {
        (Some(version), _) => RepairAction::Realign(version),
        (None, Some(version)) => RepairAction::Reset(version),
        (None, None) => RepairAction::ReleaseLock,
    }
}
