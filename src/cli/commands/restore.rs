//! Restore command - unpack a cached archive into the working directory

use super::{metadata, Context};
use crate::cache::{Plan, RestoreOutcome};
use crate::cli::args::RestoreArgs;
use crate::error::{StowageError, StowageResult};
use console::style;
use tracing::warn;

/// Execute the restore command
///
/// A cache miss must not fail the build, so restore failures are only
/// warnings unless `--strict` is given. Malformed keys are always fatal.
pub async fn execute(args: RestoreArgs, ctx: &Context) -> StowageResult<()> {
    let mut templates = ctx.templates(&args.key);
    templates.fallback_path = args.fallback_path.clone();

    let plan = Plan::resolve(&ctx.resolver(), &templates, &metadata(&args.key.meta))?;
    let archive = plan.archive()?;

    match ctx
        .cache(archive)
        .restore(&plan.key, plan.fallback_key.as_deref())
        .await
    {
        Ok(RestoreOutcome::Primary) => {
            println!(
                "{} Cache restored from {}",
                style("✓").green(),
                style(&plan.key).cyan()
            );
            Ok(())
        }
        Ok(RestoreOutcome::Fallback) => {
            println!(
                "{} Cache restored from fallback {}",
                style("✓").green(),
                style(plan.fallback_key.as_deref().unwrap_or_default()).cyan()
            );
            Ok(())
        }
        Err(e) if args.strict || matches!(e, StowageError::InvalidKey(_)) => Err(e),
        Err(e) => {
            warn!("Restore failed: {}", e);
            println!("{} No cache restored: {}", style("!").yellow(), e);
            Ok(())
        }
    }
}
