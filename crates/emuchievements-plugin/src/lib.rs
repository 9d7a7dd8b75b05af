//! Emuchievements plugin
//!
//! Shows achievements for emulated games added to Steam as shortcuts. The
//! plugin declares its routes, patches and subscriptions as mounts on an
//! [`emuchievements_mount::MountManager`]; activation applies them in the
//! background and [`PluginDescriptor::dismount`] reverts them.

pub mod achievements;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod lifetime;
pub mod manifest;
pub mod online;
pub mod patches;
pub mod plugin;
pub mod service;

pub use capabilities::HostCapabilities;
pub use config::PluginConfig;
pub use error::PluginError;
pub use manifest::PluginManifest;
pub use plugin::{activate, PluginDescriptor};
pub use service::{
    AchievementService, AchievementSnapshot, Loadable, MemoryAchievementService, Settings,
    UserAchievements,
};
