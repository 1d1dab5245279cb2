//! Process-wide broadcast configuration
//!
//! Read-frequently, write-rarely access pattern using RwLock. The selection
//! predicate reads `max_price` on every evaluation so a concurrent change
//! takes effect mid-selection; callers must not cache the value across a
//! selection call.

use num_rational::Rational64;
use once_cell::sync::Lazy;
use std::sync::RwLock;

/// Broadcast configuration singleton
pub static BROADCAST_CFG: Lazy<BroadcastCfg> = Lazy::new(BroadcastCfg::default);

/// Broadcaster-wide knobs shared by every pool
#[derive(Default)]
pub struct BroadcastCfg {
    /// Maximum acceptable price per pixel. `None` means no ceiling.
    max_price: RwLock<Option<Rational64>>,
}

impl BroadcastCfg {
    pub fn max_price(&self) -> Option<Rational64> {
        *self.max_price.read().unwrap()
    }

    pub fn set_max_price(&self, price: Option<Rational64>) {
        *self.max_price.write().unwrap() = price;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_price_set_and_clear() {
        let cfg = BroadcastCfg::default();
        assert_eq!(cfg.max_price(), None);

        cfg.set_max_price(Some(Rational64::new(10, 1)));
        assert_eq!(cfg.max_price(), Some(Rational64::new(10, 1)));

        cfg.set_max_price(None);
        assert_eq!(cfg.max_price(), None);
    }
}
