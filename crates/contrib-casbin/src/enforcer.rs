//! Shared casbin enforcer.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use axum::extract::Request;
use casbin::{CoreApi, DefaultModel, Enforcer, FileAdapter};
use tokio::sync::RwLock;

use crate::{CasbinError, CasbinResult, TRACING_TARGET_CASBIN, username};

/// Custom username lookup.
pub type UsernameExtractor = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Casbin enforcer shared between requests.
///
/// Policies may be changed at runtime through [`Casbin::enforcer`].
#[derive(Clone)]
pub struct Casbin {
    enforcer: Arc<RwLock<Enforcer>>,
    username_extractor: Option<UsernameExtractor>,
}

impl Casbin {
    /// Wraps an enforcer.
    pub fn new(enforcer: Enforcer) -> Self {
        Self::from_shared(Arc::new(RwLock::new(enforcer)))
    }

    /// Wraps an enforcer that is also used elsewhere.
    pub fn from_shared(enforcer: Arc<RwLock<Enforcer>>) -> Self {
        Self {
            enforcer,
            username_extractor: None,
        }
    }

    /// Loads a model file and a CSV policy file.
    #[tracing::instrument(skip_all, fields(model = %model.as_ref().display()))]
    pub async fn from_files(model: impl AsRef<Path>, policy: impl Into<String>) -> CasbinResult<Self> {
        let model = DefaultModel::from_file(model.as_ref())
            .await
            .map_err(CasbinError::Load)?;
        let adapter = FileAdapter::new(policy.into());
        let enforcer = Enforcer::new(model, adapter)
            .await
            .map_err(CasbinError::Load)?;

        tracing::info!(target: TRACING_TARGET_CASBIN, "Casbin enforcer loaded");
        Ok(Self::new(enforcer))
    }

    /// Replaces the default username lookup.
    pub fn with_username_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.username_extractor = Some(Arc::new(extractor));
        self
    }

    /// Returns the shared enforcer.
    pub fn enforcer(&self) -> &Arc<RwLock<Enforcer>> {
        &self.enforcer
    }

    /// Returns the username enforced for `request`.
    pub fn username(&self, request: &Request) -> String {
        match &self.username_extractor {
            Some(extractor) => extractor(request),
            None => username(request),
        }
    }

    /// Returns whether the user may call the request's method on its path.
    ///
    /// The subject, object and action are read before the returned future
    /// runs, so it does not borrow `request`.
    pub fn check(&self, request: &Request) -> impl Future<Output = bool> + Send + use<> {
        let casbin = self.clone();
        let username = self.username(request);
        let path = request.uri().path().to_owned();
        let method = request.method().as_str().to_owned();

        async move { casbin.enforce_tuple(&username, &path, &method).await }
    }

    /// Enforces a `(username, path, method)` tuple.
    ///
    /// Enforcement errors count as a denial.
    pub async fn enforce_tuple(&self, username: &str, path: &str, method: &str) -> bool {
        let result = self.enforcer.read().await.enforce((username, path, method));

        match result {
            Ok(allowed) => {
                tracing::debug!(
                    target: TRACING_TARGET_CASBIN,
                    username = %username,
                    path = %path,
                    method = %method,
                    allowed,
                    "Policy enforced"
                );
                allowed
            }
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET_CASBIN,
                    username = %username,
                    path = %path,
                    method = %method,
                    error = %error,
                    "Policy enforcement failed"
                );
                false
            }
        }
    }
}

impl fmt::Debug for Casbin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Casbin")
            .field("custom_username_extractor", &self.username_extractor.is_some())
            .finish_non_exhaustive()
    }
}
