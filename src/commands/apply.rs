//! `apply` and `healthcheck`

use anyhow::Result;
use std::path::Path;

use super::Run;
use crate::Context;
use crate::cli::{ApplyArgs, ManifestArgs};
use crate::session::{self, SessionKind, SessionRecord};
use crate::ui;

/// Apply a manifest; `Ok(false)` when any resource failed
pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<bool> {
    let run = Run::prepare(&args.manifest, SessionKind::Apply, args.noop)?;
    if !ctx.quiet {
        ui::header(&format!("Applying {}", args.manifest.display()));
        if run.noop {
            ui::warn("Noop mode - no changes will be made");
        }
    }

    let record = converge(ctx, &run, args.report.as_deref())?;
    summarize(ctx, &record);
    Ok(record.failed() == 0)
}

/// Run the health checks of a manifest without reconciling anything
pub fn healthcheck(ctx: &Context, args: ManifestArgs) -> Result<bool> {
    let run = Run::prepare(&args.manifest, SessionKind::HealthCheck, false)?;
    if !ctx.quiet {
        ui::header(&format!("Health checks for {}", args.manifest.display()));
    }

    for resource in &run.resources {
        let event = resource.healthcheck();
        show(ctx, &event);
        run.session.record(event);
    }

    let record = run.finish()?;
    summarize(ctx, &record);
    Ok(record.failed() == 0)
}

/// Apply every resource in order, recording each event
fn converge(ctx: &Context, run: &Run, report: Option<&Path>) -> Result<SessionRecord> {
    for resource in &run.resources {
        log::debug!("Applying {}", resource.reference());
        let event = resource.apply();
        show(ctx, &event);
        run.session.record(event);
    }

    let record = run.finish()?;
    if let Some(path) = report {
        session::write_report(&record, path)?;
        log::info!("Report written to {}", path.display());
    }
    Ok(record)
}

fn show(ctx: &Context, event: &declarative::TransactionEvent) {
    if !ctx.quiet || event.failed {
        ui::event(event);
    }
}

fn summarize(ctx: &Context, record: &SessionRecord) {
    let total = record.events.len();
    let failed = record.failed();
    println!();
    if failed > 0 {
        ui::error(&format!("{failed} of {total} resources failed"));
    } else if !ctx.quiet {
        ui::success(&format!(
            "{total} resources, {} changed",
            record.changed()
        ));
    }
}
