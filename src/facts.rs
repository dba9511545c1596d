//! Host facts
//!
//! Gathered once per run and exposed to expressions and templates as
//! `facts.*`:
//!
//! - `facts.kernel` - e.g. "linux"
//! - `facts.arch` - e.g. "x86_64"
//! - `facts.hostname`
//! - `facts.os.id`, `facts.os.family`, `facts.os.version` - from `/etc/os-release`

use declarative::Facts;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs;

const OS_RELEASE: &str = "/etc/os-release";
const HOSTNAME: &str = "/proc/sys/kernel/hostname";

/// Gather facts about the running host
pub fn gather() -> Facts {
    let os_release = fs::read_to_string(OS_RELEASE)
        .map(|content| parse_os_release(&content))
        .unwrap_or_else(|e| {
            log::debug!("Could not read {OS_RELEASE}: {e}");
            HashMap::new()
        });

    let hostname = fs::read_to_string(HOSTNAME)
        .or_else(|_| fs::read_to_string("/etc/hostname"))
        .map(|h| h.trim().to_string())
        .unwrap_or_default();

    build(&os_release, std::env::consts::ARCH, &hostname)
}

fn build(os_release: &HashMap<String, String>, arch: &str, hostname: &str) -> Facts {
    let id = os_release.get("ID").cloned().unwrap_or_default();
    // ID_LIKE lists parents from closest to furthest; the last one is the family
    let family = os_release
        .get("ID_LIKE")
        .and_then(|like| like.split_whitespace().last())
        .map_or_else(|| id.clone(), str::to_string);

    json!({
        "kernel": std::env::consts::OS,
        "arch": arch,
        "hostname": hostname,
        "os": {
            "id": id,
            "family": family,
            "version": os_release.get("VERSION_ID").map_or(Value::Null, |v| json!(v)),
        },
    })
}

/// Parse the `KEY=value` lines of an os-release file
pub fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const UBUNTU: &str = r#"
PRETTY_NAME="Ubuntu 24.04 LTS"
NAME="Ubuntu"
VERSION_ID="24.04"
ID=ubuntu
ID_LIKE=debian
# comment
"#;

    #[test]
    fn test_parse_os_release() {
        let parsed = parse_os_release(UBUNTU);
        assert_eq!(parsed["ID"], "ubuntu");
        assert_eq!(parsed["VERSION_ID"], "24.04");
        assert_eq!(parsed["PRETTY_NAME"], "Ubuntu 24.04 LTS");
        assert!(!parsed.contains_key("# comment"));
    }

    #[test]
    fn test_family_from_id_like() {
        let facts = build(&parse_os_release(UBUNTU), "x86_64", "web01");
        assert_eq!(facts["os"]["id"], "ubuntu");
        assert_eq!(facts["os"]["family"], "debian");
        assert_eq!(facts["os"]["version"], "24.04");
        assert_eq!(facts["arch"], "x86_64");
        assert_eq!(facts["hostname"], "web01");
    }

    #[test]
    fn test_family_defaults_to_id() {
        let facts = build(&parse_os_release("ID=debian\n"), "aarch64", "");
        assert_eq!(facts["os"]["family"], "debian");
        assert!(facts["os"]["version"].is_null());

        let facts = build(&HashMap::new(), "x86_64", "");
        assert_eq!(facts["os"]["family"], "");
    }

    #[test]
    fn test_gather_has_arch() {
        let facts = gather();
        assert_eq!(facts["arch"], std::env::consts::ARCH);
        assert!(facts["os"].is_object());
    }
}
