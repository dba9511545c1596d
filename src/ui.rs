use colored::Colorize;
use declarative::{HealthStatus, TransactionEvent};
use std::time::Duration;

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Transaction events
// ============================================================================

/// Format a duration for humans
pub fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

/// One word describing what happened to a resource
pub fn outcome(event: &TransactionEvent) -> &'static str {
    if event.failed {
        "failed"
    } else if event.skipped {
        "skipped"
    } else if event.noop && event.noop_message.is_some() {
        "noop"
    } else if event.refreshed {
        "refreshed"
    } else if event.changed {
        "changed"
    } else {
        "ok"
    }
}

/// Print a transaction event with its errors and health checks
pub fn event(event: &TransactionEvent) {
    let reference = format!("{}#{}", event.resource_type, event.name);
    let marker = match outcome(event) {
        "failed" => "✗".red(),
        "skipped" => "↷".yellow(),
        "noop" => "~".yellow(),
        "changed" | "refreshed" => "✓".green(),
        _ => "·".dimmed(),
    };
    let provider = event
        .provider
        .as_deref()
        .map(|p| format!(" [{p}]"))
        .unwrap_or_default();

    println!(
        "{} {}{} {} {}",
        marker,
        reference.bold(),
        provider.dimmed(),
        outcome(event),
        format_duration(event.duration).dimmed()
    );

    if let Some(message) = &event.noop_message {
        dim(message);
    }
    for unmet in &event.unmet_requirements {
        dim(&format!("unmet requirement: {unmet}"));
    }
    for error in &event.errors {
        println!("  {}", error.red());
    }
    for check in &event.health_checks {
        let status = match check.status {
            HealthStatus::Ok => check.status.to_string().green(),
            HealthStatus::Warning => check.status.to_string().yellow(),
            HealthStatus::Critical | HealthStatus::Unknown => check.status.to_string().red(),
        };
        println!("  {} {} ({} tries)", status, check.name, check.tries);
        if !check.output.is_empty() {
            dim(check.output.trim());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::CommonProperties;

    fn blank() -> TransactionEvent {
        TransactionEvent::new("package", &CommonProperties::new("nginx", "present"))
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(0)), "0ms");
        assert_eq!(format_duration(Duration::from_millis(999)), "999ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
    }

    #[test]
    fn test_outcome_precedence() {
        let mut event = blank();
        assert_eq!(outcome(&event), "ok");

        event.changed = true;
        assert_eq!(outcome(&event), "changed");

        event.noop = true;
        event.noop_message = Some("Would have installed".to_string());
        assert_eq!(outcome(&event), "noop");

        event.skipped = true;
        assert_eq!(outcome(&event), "skipped");

        event.fail("boom");
        assert_eq!(outcome(&event), "failed");
    }
}
