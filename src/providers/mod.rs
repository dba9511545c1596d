//! Built-in providers
//!
//! One module per `type#provider` pair, plus the helpers they share.

pub mod apt;
pub mod archive;
pub mod debversion;
pub mod exec;
pub mod file;
pub mod posix;
pub mod systemd;

use declarative::{ProviderFactory, Registry};
use std::sync::Arc;

/// Factories shipped with the agent, in registration order
pub fn builtin() -> Vec<Arc<dyn ProviderFactory>> {
    vec![
        Arc::new(apt::AptFactory),
        Arc::new(systemd::SystemdFactory),
        Arc::new(exec::PosixExecFactory),
        Arc::new(archive::HttpArchiveFactory),
        Arc::new(file::PosixFileFactory),
    ]
}

/// Register every built-in factory
pub fn register_builtin(registry: &Registry) -> declarative::Result<()> {
    for factory in builtin() {
        registry.register(factory)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_builtin() {
        let registry = Registry::new();
        register_builtin(&registry).unwrap();
        assert_eq!(
            registry.types(),
            vec!["archive", "exec", "file", "package", "service"]
        );
        assert_eq!(registry.providers("package"), vec!["apt"]);
        assert_eq!(registry.providers("file"), vec!["posix"]);
    }

    #[test]
    fn test_register_twice_fails() {
        let registry = Registry::new();
        register_builtin(&registry).unwrap();
        assert!(matches!(
            register_builtin(&registry),
            Err(declarative::Error::DuplicateProvider { .. })
        ));
    }
}
