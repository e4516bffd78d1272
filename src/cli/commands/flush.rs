//! Flush command - delete expired cache archives

use super::{metadata, Context};
use crate::cache::{older_than, CacheTemplates, Plan};
use crate::cli::args::FlushArgs;
use crate::error::StowageResult;
use crate::storage::format_bytes;
use chrono::Utc;
use console::style;

/// Execute the flush command
pub async fn execute(args: FlushArgs, ctx: &Context) -> StowageResult<()> {
    let plan = Plan::resolve(&ctx.resolver(), &templates(&args, ctx), &metadata(&args.meta))?;
    let days = args.age.unwrap_or(ctx.config().cache.flush_age_days);

    let report = ctx
        .cache(plan.archive()?)
        .flush(&plan.flush_prefix, older_than(days, Utc::now()))
        .await?;

    println!(
        "{} Flushed {} of {} entries under {} older than {} days ({} freed)",
        style("✓").green(),
        report.deleted.len(),
        report.examined,
        style(&plan.flush_prefix).cyan(),
        days,
        format_bytes(report.freed_bytes)
    );

    Ok(())
}

/// Templates for a flush; the prefix falls back to `--path`
fn templates(args: &FlushArgs, ctx: &Context) -> CacheTemplates {
    CacheTemplates {
        path: args.path.clone().unwrap_or_default(),
        filename: args
            .filename
            .clone()
            .unwrap_or_else(|| ctx.config().cache.filename.clone()),
        fallback_path: None,
        flush_path: args.flush_path.clone(),
    }
}
