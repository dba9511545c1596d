//! `status` - probe every resource without changing anything

use anyhow::Result;
use colored::Colorize;
use declarative::{BoxedResource, ResourceInfo};
use rayon::prelude::*;
use serde::Serialize;

use super::Run;
use crate::Context;
use crate::cli::StatusArgs;
use crate::session::SessionKind;
use crate::ui;

#[derive(Debug, Serialize)]
struct Entry {
    resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<ResourceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Probe resources in parallel, keeping manifest order
fn probe(resources: &[BoxedResource]) -> Vec<Entry> {
    resources
        .par_iter()
        .map(|resource| {
            let (info, error) = match resource.info() {
                Ok(info) => (Some(info), None),
                Err(e) => (None, Some(e.to_string())),
            };
            Entry {
                resource: resource.reference(),
                info,
                error,
            }
        })
        .collect()
}

/// Show resource state; `Ok(false)` when any probe failed
pub fn run(ctx: &Context, args: StatusArgs) -> Result<bool> {
    // probes never mutate, so the run is forced into noop
    let run = Run::prepare(&args.manifest, SessionKind::Apply, true)?;
    let entries = probe(&run.resources);
    let ok = entries.iter().all(|e| e.error.is_none());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(ok);
    }

    ui::header(&format!("Status of {}", args.manifest.display()));
    for entry in &entries {
        match (&entry.info, &entry.error) {
            (Some(info), _) => {
                println!(
                    "{} {} [{}] {}",
                    "·".dimmed(),
                    entry.resource.bold(),
                    info.provider.dimmed(),
                    info.state.ensure
                );
                if ctx.verbose > 0 {
                    ui::dim(&info.state.metadata.to_string());
                }
            }
            (None, Some(error)) => {
                println!("{} {}", "✗".red(), entry.resource.bold());
                println!("  {}", error.red());
            }
            (None, None) => {}
        }
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::providers::posix;
    use std::fs;

    #[test]
    fn test_probe_keeps_order_and_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (owner, group) = posix::current_identity();
        let present = dir.path().join("present");
        fs::write(&present, "x").unwrap();

        let mut manifest = String::new();
        for name in ["present", "missing"] {
            manifest.push_str(&format!(
                "[[resources]]\ntype = \"file\"\nname = \"{}\"\nensure = \"present\"\n\
                 owner = \"{owner}\"\n\
                 group = \"{group}\"\nmode = \"0644\"\n\n",
                dir.path().join(name).display()
            ));
        }
        manifest.push_str(
            "[[resources]]\ntype = \"package\"\nname = \"zsh\"\nensure = \"present\"\n\
             provider = \"nope\"\n",
        );
        let path = dir.path().join("site.toml");
        fs::write(&path, manifest).unwrap();

        let config = AgentConfig {
            record_sessions: false,
            ..AgentConfig::default()
        };
        let run = Run::prepare_with(config, &path, SessionKind::Apply, true).unwrap();
        let entries = probe(&run.resources);

        assert_eq!(entries.len(), 3);
        let present = entries[0].info.as_ref().unwrap();
        assert_eq!(present.state.ensure, "present");
        assert_eq!(entries[1].info.as_ref().unwrap().state.ensure, "absent");
        assert!(entries[2].resource.starts_with("package#zsh"));
        assert!(entries[2].error.is_some());
    }
}
