//! Switchable connectivity.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use emuchievements_mount::ConnectivityProbe;

/// Connectivity probe whose answer tests flip by hand.
#[derive(Debug, Default)]
pub struct SimConnectivity {
    online: AtomicBool,
    probes: AtomicUsize,
}

impl SimConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        tracing::debug!(online, "connectivity changed");
    }

    /// How many times `is_online` was asked.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for SimConnectivity {
    async fn is_online(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_follows_switch() {
        let net = SimConnectivity::new(false);
        assert!(!net.is_online().await);
        net.set_online(true);
        assert!(net.is_online().await);
        assert_eq!(net.probe_count(), 2);
    }
}
