//! Error types for resource reconciliation.
//!
//! Errors fall into a few families:
//! - configuration errors, raised while a resource is constructed
//! - provider resolution errors, raised while a provider is acquired
//! - transition errors, returned verbatim from provider operations
//! - desired state errors, raised when a provider reports success but the
//!   re-probed state still does not match

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while constructing, resolving or applying resources.
#[derive(Debug, Error)]
pub enum Error {
    /// Resource properties failed validation.
    #[error("invalid resource: {reason}")]
    ResourceInvalid {
        /// What was wrong with the resource
        reason: String,
    },

    /// The resource has no name.
    #[error("resource name is required")]
    ResourceNameRequired,

    /// The resource has no ensure value and its type requires one.
    #[error("ensure is required")]
    ResourceEnsureRequired,

    /// A require or subscribe entry is not of the form `type#name`.
    #[error("invalid resource reference '{0}', expected type#name")]
    InvalidReference(String),

    /// A factory with the same type and name is already registered.
    #[error("provider {type_name}#{provider} is already registered")]
    DuplicateProvider {
        /// Resource type the factory serves
        type_name: String,
        /// Name of the duplicate provider
        provider: String,
    },

    /// No factory with the requested name exists for the type.
    #[error("provider {provider} not found for {type_name} resources")]
    ProviderNotFound {
        /// Resource type that was searched
        type_name: String,
        /// Requested provider name
        provider: String,
    },

    /// The requested factory reported it cannot manage the resource.
    #[error("provider {provider} cannot manage this {type_name} resource: {reason}")]
    ProviderNotManageable {
        /// Resource type that was searched
        type_name: String,
        /// Requested provider name
        provider: String,
        /// Error reported by the manageability check, if any
        reason: String,
    },

    /// No registered factory can manage the resource.
    #[error("no suitable provider found for {type_name} resource")]
    NoSuitableProvider {
        /// Resource type that was searched
        type_name: String,
    },

    /// More than one factory can manage the resource and none was named.
    #[error(
        "multiple providers can manage {type_name} resource ({}), select one explicitly",
        .providers.join(", ")
    )]
    MultipleProviders {
        /// Resource type that was searched
        type_name: String,
        /// Names of every manageable provider, in selection order
        providers: Vec<String>,
    },

    /// A factory produced a provider for a different resource type.
    #[error("provider {provider} is not a {expected} provider")]
    ProviderMismatch {
        /// Resource type that asked for the provider
        expected: &'static str,
        /// Name of the mismatched provider
        provider: String,
    },

    /// A mutation reported success but the resource did not converge.
    #[error("failed to reach desired state: {0}")]
    DesiredStateFailed(String),

    /// A downloaded file does not match the requested checksum.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Requested checksum
        expected: String,
        /// Checksum of the downloaded content
        actual: String,
    },

    /// A control expression could not be evaluated.
    #[error("could not evaluate expression '{expression}': {source}")]
    Expression {
        /// The expression that failed
        expression: String,
        /// Error reported by the evaluator
        #[source]
        source: anyhow::Error,
    },

    /// A property template could not be resolved.
    #[error("could not resolve template in {property}: {source}")]
    Template {
        /// Property that holds the template
        property: &'static str,
        /// Error reported by the resolver
        #[source]
        source: anyhow::Error,
    },

    /// The session tracker could not answer a require or subscribe query.
    #[error("could not query session state for {reference}: {source}")]
    Tracker {
        /// Resource reference being queried
        reference: String,
        /// Error reported by the tracker
        #[source]
        source: anyhow::Error,
    },

    /// Error returned by a provider operation, carried verbatim.
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

impl Error {
    /// Create a validation error with a reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::ResourceInvalid {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_providers_lists_names() {
        let err = Error::MultipleProviders {
            type_name: "package".to_string(),
            providers: vec!["apt".to_string(), "dnf".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "multiple providers can manage package resource (apt, dnf), select one explicitly"
        );
    }

    #[test]
    fn test_provider_error_is_verbatim() {
        let err: Error = anyhow::anyhow!("apt-get exited 100").into();
        assert_eq!(err.to_string(), "apt-get exited 100");
        assert!(matches!(err, Error::Provider(_)));
    }
}
