//! Errors raised while loading casbin models and policies.

/// Errors for the casbin adapter.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum CasbinError {
    /// The model or policy could not be loaded.
    #[error("failed to load casbin enforcer: {0}")]
    Load(#[source] casbin::Error),
}

/// Specialized [`Result`] type for the casbin adapter.
pub type CasbinResult<T, E = CasbinError> = Result<T, E>;
