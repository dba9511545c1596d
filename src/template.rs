//! Placeholder resolution
//!
//! `{{ facts.os.family }}` and `{{ data.version }}` are replaced with the
//! looked up value. Strings are inserted as-is, other values as JSON.

use anyhow::{Result, bail};
use declarative::{TemplateEnvironment, TemplateResolver};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("hardcoded regex pattern is valid")
});

/// Resolves `{{ path }}` placeholders against facts and data
#[derive(Debug, Default, Clone, Copy)]
pub struct Placeholders;

impl TemplateResolver for Placeholders {
    fn resolve(&self, input: &str, env: &TemplateEnvironment) -> Result<String> {
        let mut output = String::with_capacity(input.len());
        let mut last = 0;

        for captures in PLACEHOLDER.captures_iter(input) {
            let (Some(whole), Some(path)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            check_literal(&input[last..whole.start()])?;
            output.push_str(&input[last..whole.start()]);

            match env.lookup(path.as_str()) {
                Some(Value::String(s)) => output.push_str(s),
                Some(Value::Null) | None => bail!("unknown placeholder '{}'", path.as_str()),
                Some(other) => output.push_str(&other.to_string()),
            }
            last = whole.end();
        }

        check_literal(&input[last..])?;
        output.push_str(&input[last..]);
        Ok(output)
    }
}

fn check_literal(segment: &str) -> Result<()> {
    if segment.contains("{{") {
        bail!("malformed placeholder in '{segment}'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env() -> TemplateEnvironment {
        TemplateEnvironment::new(
            json!({"os": {"family": "debian"}, "cpus": 4}),
            json!({"version": "1.2.3", "ports": [80, 443]}),
        )
    }

    #[test]
    fn test_resolves_strings_and_numbers() {
        let resolved = Placeholders
            .resolve("nginx-{{ data.version }}-{{facts.os.family}}", &env())
            .unwrap();
        assert_eq!(resolved, "nginx-1.2.3-debian");

        let resolved = Placeholders
            .resolve("-j{{ facts.cpus }} :{{ data.ports.1 }}", &env())
            .unwrap();
        assert_eq!(resolved, "-j4 :443");
    }

    #[test]
    fn test_plain_input_unchanged() {
        assert_eq!(Placeholders.resolve("no placeholders", &env()).unwrap(), "no placeholders");
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = Placeholders.resolve("{{ data.missing }}", &env()).unwrap_err();
        assert_eq!(err.to_string(), "unknown placeholder 'data.missing'");
        assert!(Placeholders.resolve("{{ version }}", &env()).is_err());
    }

    #[test]
    fn test_malformed_placeholder() {
        assert!(Placeholders.resolve("{{ data.version", &env()).is_err());
        assert!(Placeholders.resolve("{{ data version }}", &env()).is_err());
    }
}
