//! Route-to-UI registrations.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::MountError;
use crate::host::{HostRouter, RenderProvider};
use crate::mount::{Mount, MountKind, Teardown};

/// Registers one route with the host router; unmount removes that exact path.
pub struct PageMount {
    path: String,
    provider: RenderProvider,
    router: Arc<dyn HostRouter>,
}

impl std::fmt::Debug for PageMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageMount")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl PageMount {
    pub fn new(router: Arc<dyn HostRouter>, path: impl Into<String>, provider: RenderProvider) -> Self {
        Self {
            path: path.into(),
            provider,
            router,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Mount for PageMount {
    fn kind(&self) -> MountKind {
        MountKind::Page
    }

    fn label(&self) -> String {
        format!("page {}", self.path)
    }

    async fn mount(&self) -> Result<Teardown, MountError> {
        if !self.path.starts_with('/') {
            return Err(MountError::InvalidArgument(format!(
                "route path must start with '/': {}",
                self.path
            )));
        }
        self.router.add_route(&self.path, self.provider.clone())?;
        tracing::debug!(route = %self.path, "route added");
        Ok(Teardown::Route(self.path.clone()))
    }

    async fn unmount(&self, state: Teardown) -> Result<(), MountError> {
        let path = match state {
            Teardown::Route(path) => path,
            _ => self.path.clone(),
        };
        self.router.remove_route(&path);
        tracing::debug!(route = %path, "route removed");
        Ok(())
    }
}
