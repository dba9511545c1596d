//! `providers` - list what this host can manage

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ArchiveProperties, ExecProperties, FileProperties, PackageProperties, Registry,
    ResourceProperties, ServiceProperties,
};

use crate::Context;
use crate::facts;
use crate::ui;

/// Minimal properties to ask a factory whether it works on this host
fn sample(type_name: &str) -> Option<ResourceProperties> {
    Some(match type_name {
        "package" => PackageProperties::new("sample", "present").into(),
        "service" => ServiceProperties::new("sample", "running").into(),
        "exec" => ExecProperties::new("true").into(),
        "archive" => {
            ArchiveProperties::new("/tmp/sample.tar.gz", "https://localhost/", "root", "root")
                .into()
        }
        "file" => FileProperties::new("/tmp/sample", "present", "root", "root", "0644").into(),
        _ => return None,
    })
}

pub fn run(_ctx: &Context) -> Result<()> {
    let registry = Registry::new();
    crate::providers::register_builtin(&registry)?;
    let facts = facts::gather();

    ui::header("Providers");
    ui::kv(
        "Host",
        &format!(
            "{} {} ({})",
            facts["os"]["id"].as_str().unwrap_or("unknown"),
            facts["os"]["version"].as_str().unwrap_or(""),
            facts["arch"].as_str().unwrap_or("unknown")
        ),
    );

    for factory in crate::providers::builtin() {
        let sample = sample(factory.type_name());
        let available = match sample.map(|p| factory.is_manageable(&facts, &p)) {
            Some(Ok(Some(priority))) => format!("available (priority {priority})").green(),
            Some(Ok(None)) | None => "unavailable".dimmed(),
            Some(Err(e)) => format!("error: {e:#}").red(),
        };
        println!(
            "  {}#{} {}",
            factory.type_name().bold(),
            factory.name(),
            available
        );
    }

    println!();
    ui::dim(&format!("Types: {}", registry.types().join(", ")));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_has_a_sample() {
        for factory in crate::providers::builtin() {
            let sample = sample(factory.type_name()).unwrap();
            assert_eq!(sample.type_name(), factory.type_name());
        }
        assert!(sample("cron").is_none());
    }
}
