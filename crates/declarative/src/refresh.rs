//! Subscribe-driven refresh signals

use crate::context::ApplyContext;
use crate::error::{Error, Result};
use crate::types::ResourceRef;

/// The first subscribed resource that changed during this session
///
/// Stops querying at the first match. Tracker failures abort the
/// reconciliation instead of being read as "no change".
pub fn triggered_by(
    ctx: &ApplyContext<'_>,
    subscribe: &[ResourceRef],
) -> Result<Option<ResourceRef>> {
    for reference in subscribe {
        let changed = ctx
            .manager
            .should_refresh(&reference.type_name, &reference.name)
            .map_err(|source| Error::Tracker {
                reference: reference.to_string(),
                source,
            })?;

        if changed {
            ctx.logger
                .debug(format_args!("refresh requested by {reference}"));
            return Ok(Some(reference.clone()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Logger;
    use crate::testing::MockManager;

    fn refs(items: &[&str]) -> Vec<ResourceRef> {
        items.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_first_changed_wins() {
        let manager = MockManager::new()
            .with_changed("file", "/etc/b")
            .with_changed("file", "/etc/c");
        let logger = Logger::new("service#app");
        let ctx = ApplyContext::new(false, &logger, &manager);

        let subscribe = refs(&["file#/etc/a", "file#/etc/b", "file#/etc/c"]);
        let found = triggered_by(&ctx, &subscribe).unwrap();
        assert_eq!(found, Some(ResourceRef::new("file", "/etc/b")));
        assert_eq!(manager.refresh_queries(), 2);
    }

    #[test]
    fn test_nothing_changed() {
        let manager = MockManager::new();
        let logger = Logger::new("service#app");
        let ctx = ApplyContext::new(false, &logger, &manager);
        assert_eq!(triggered_by(&ctx, &refs(&["package#nginx"])).unwrap(), None);
        assert_eq!(triggered_by(&ctx, &[]).unwrap(), None);
    }

    #[test]
    fn test_tracker_error_propagates() {
        let manager = MockManager::new().with_tracker_error();
        let logger = Logger::new("service#app");
        let ctx = ApplyContext::new(false, &logger, &manager);
        match triggered_by(&ctx, &refs(&["package#nginx"])) {
            Err(Error::Tracker { reference, .. }) => assert_eq!(reference, "package#nginx"),
            other => panic!("expected tracker error, got {other:?}"),
        }
    }
}
