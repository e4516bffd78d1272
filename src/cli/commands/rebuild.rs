//! Rebuild command - archive mounts into the cache

use super::{metadata, Context};
use crate::cache::{Plan, RebuildOutcome};
use crate::cli::args::RebuildArgs;
use crate::error::StowageResult;
use console::style;
use tracing::debug;

/// Execute the rebuild command
pub async fn execute(args: RebuildArgs, ctx: &Context) -> StowageResult<()> {
    let templates = ctx.templates(&args.key);
    let plan = Plan::resolve(&ctx.resolver(), &templates, &metadata(&args.key.meta))?;
    let archive = plan.archive()?;

    debug!(
        "Mounts {:?} relative to {}",
        args.mount,
        ctx.workdir().display()
    );

    match ctx
        .cache(archive)
        .rebuild(&args.mount, &plan.key, plan.skip_if_exists)
        .await?
    {
        RebuildOutcome::Stored => println!(
            "{} Cache rebuilt at {}",
            style("✓").green(),
            style(&plan.key).cyan()
        ),
        RebuildOutcome::Skipped => println!(
            "{} Cache {} is up to date",
            style("✓").green(),
            style(&plan.key).cyan()
        ),
    }

    Ok(())
}
