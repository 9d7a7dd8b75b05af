//! Plugin configuration.

use std::time::Duration;

use emuchievements_mount::MountConfig;

pub const DEFAULT_SETTINGS_ROUTE: &str = "/emuchievements/settings";
pub const DEFAULT_ACHIEVEMENTS_ROUTE: &str = "/emuchievements/achievements";
pub const DEFAULT_ONLINE_POLL_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    /// Delay between connectivity probes while waiting to come online.
    pub online_poll: Duration,
    pub settings_route: String,
    pub achievements_route: String,
    pub mount: MountConfig,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            online_poll: Duration::from_millis(DEFAULT_ONLINE_POLL_MS),
            settings_route: DEFAULT_SETTINGS_ROUTE.to_string(),
            achievements_route: DEFAULT_ACHIEVEMENTS_ROUTE.to_string(),
            mount: MountConfig::default(),
        }
    }
}

fn route_from_env(var: &str, default: &str) -> String {
    match std::env::var(var) {
        Ok(route) if route.starts_with('/') && route.len() > 1 => route,
        Ok(route) => {
            tracing::warn!(var, route = %route, "route must start with '/', using {default}");
            default.to_string()
        }
        Err(_) => default.to_string(),
    }
}

impl PluginConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self {
            online_poll: Duration::from_millis(
                std::env::var("EMUCHIEVEMENTS_ONLINE_POLL_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .filter(|ms| *ms > 0)
                    .unwrap_or(DEFAULT_ONLINE_POLL_MS),
            ),
            settings_route: route_from_env("EMUCHIEVEMENTS_SETTINGS_ROUTE", DEFAULT_SETTINGS_ROUTE),
            achievements_route: route_from_env(
                "EMUCHIEVEMENTS_ACHIEVEMENTS_ROUTE",
                DEFAULT_ACHIEVEMENTS_ROUTE,
            ),
            mount: MountConfig::from_env(),
        }
    }
}
