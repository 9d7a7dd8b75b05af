//! In-memory route table.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use emuchievements_mount::{HostError, HostRouter, RenderProvider, RenderTree};

#[derive(Default)]
pub struct SimRouter {
    routes: RwLock<BTreeMap<String, RenderProvider>>,
}

impl std::fmt::Debug for SimRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRouter")
            .field("routes", &self.paths())
            .finish()
    }
}

impl SimRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_route(&self, path: &str) -> bool {
        self.routes.read().contains_key(path)
    }

    pub fn paths(&self) -> Vec<String> {
        self.routes.read().keys().cloned().collect()
    }

    /// Render the route the way the host would on navigation.
    pub fn render(&self, path: &str) -> Option<RenderTree> {
        let provider = self.routes.read().get(path).cloned()?;
        Some(provider())
    }
}

impl HostRouter for SimRouter {
    fn add_route(&self, path: &str, provider: RenderProvider) -> Result<(), HostError> {
        let mut routes = self.routes.write();
        if routes.contains_key(path) {
            return Err(HostError::RouteExists(path.to_string()));
        }
        routes.insert(path.to_string(), provider);
        tracing::debug!(path, "route added");
        Ok(())
    }

    fn remove_route(&self, path: &str) {
        if self.routes.write().remove(path).is_some() {
            tracing::debug!(path, "route removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_add_render_remove() {
        let router = SimRouter::new();
        router
            .add_route("/settings", Arc::new(|| json!({ "type": "Settings" })))
            .unwrap();
        assert_eq!(router.render("/settings").unwrap()["type"], "Settings");

        router.remove_route("/settings");
        router.remove_route("/settings");
        assert!(router.render("/settings").is_none());
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let router = SimRouter::new();
        router.add_route("/a", Arc::new(|| json!(null))).unwrap();
        let err = router.add_route("/a", Arc::new(|| json!(null))).unwrap_err();
        assert_eq!(err, HostError::RouteExists("/a".into()));
    }
}
