//! In-memory host for the Emuchievements plugin.
//!
//! Implements every host capability trait from `emuchievements-mount` over a
//! graph of simulated objects, and assembles them into a Steam-shaped client
//! ([`SteamFixture`]) the plugin can be activated against.

pub mod fixture;
pub mod lifetime;
pub mod modules;
pub mod network;
pub mod object;
pub mod patching;
pub mod router;

pub use fixture::{SteamFixture, GAME_APP_TYPE, NATIVE_SECTIONS, SHORTCUT_APP_TYPE};
pub use lifetime::SimLifetime;
pub use modules::SimModules;
pub use network::SimConnectivity;
pub use object::{Layer, NativeMethod, SimObject, SimObjectBuilder};
pub use patching::{SimPatchHandle, SimPatcher};
pub use router::SimRouter;
