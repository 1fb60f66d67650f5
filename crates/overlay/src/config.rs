//! Runtime configuration for the overlay engine.
//!
//! Every timing and threshold the engine uses lives here. Defaults match the host site's
//! behavior; a subset can be overridden from `CARDLENS_*` environment variables.

use core::str::FromStr;
use core::time::Duration;
use std::env;
use url::Url;

/// Page-wide overlay cap outside unlimited page contexts.
pub const DEFAULT_MAX_OVERLAYS: usize = 200;

/// Runtime configuration for the overlay engine.
#[derive(Clone, Debug)]
pub struct OverlayConfig {
    /// Maximum number of live overlays outside unlimited contexts
    pub max_overlays: usize,
    /// Minimum spacing between two full scans in milliseconds
    pub scan_spacing_ms: u64,
    /// Viewport inflation used for visibility admission, in CSS pixels
    pub viewport_margin_px: f64,
    /// Idle time after which the user counts as inactive
    pub inactivity_ms: u64,
    /// Interval of the orphan/cap sweep
    pub sweep_interval_ms: u64,
    /// Dispatch delay after a card-level mutation batch
    pub card_dispatch_ms: u64,
    /// Dispatch delay after a bulk container mutation batch
    pub bulk_dispatch_ms: u64,
    /// How many ancestors of a mutated node are checked for a card match
    pub ancestor_depth: usize,
    /// Settle delay between a dataset update and the following scan
    pub dataset_settle_ms: u64,
    /// Hard timeout of one navigation rebuild
    pub rebuild_watchdog_ms: u64,
    /// Backoff before a queued navigation rebuild starts
    pub rebuild_backoff_ms: u64,
    /// Lifetime of a fingerprint guard entry
    pub fingerprint_window_ms: u64,
    /// Interval between width polls of a freshly inserted overlay
    pub width_poll_ms: u64,
    /// Number of width polls before giving up
    pub width_poll_attempts: u32,
    /// Delays before each liveness ping, relative to the previous attempt
    pub ping_delays_ms: Vec<u64>,
    /// First backoff of the connect step; doubled on each retry
    pub init_backoff_ms: u64,
    /// Number of connect attempts before initialization fails
    pub init_attempts: u32,
    /// Interval of the outer run loop retry after an initialization failure
    pub run_retry_ms: u64,
    /// Base URL of the report pages; `None` uses the page origin
    pub report_base: Option<Url>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            max_overlays: DEFAULT_MAX_OVERLAYS,
            scan_spacing_ms: 500,
            viewport_margin_px: 50.0,
            inactivity_ms: 30_000,
            sweep_interval_ms: 30_000,
            card_dispatch_ms: 300,
            bulk_dispatch_ms: 800,
            ancestor_depth: 3,
            dataset_settle_ms: 500,
            rebuild_watchdog_ms: 5_000,
            rebuild_backoff_ms: 100,
            fingerprint_window_ms: 5_000,
            width_poll_ms: 50,
            width_poll_attempts: 20,
            ping_delays_ms: vec![0, 100, 500],
            init_backoff_ms: 1_000,
            init_attempts: 3,
            run_retry_ms: 5_000,
            report_base: None,
        }
    }
}

fn env_number<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|val| val.trim().parse::<T>().ok())
}

impl OverlayConfig {
    /// Load configuration from environment variables, starting from the defaults.
    ///
    /// Reads the following environment variables:
    /// - `CARDLENS_MAX_OVERLAYS`: overlay cap (default: 200)
    /// - `CARDLENS_SCAN_SPACING_MS`: minimum scan spacing (default: 500)
    /// - `CARDLENS_VIEWPORT_MARGIN_PX`: visibility margin (default: 50)
    /// - `CARDLENS_INACTIVITY_MS`: inactivity threshold (default: 30000)
    /// - `CARDLENS_SWEEP_INTERVAL_MS`: sweep interval (default: 30000)
    /// - `CARDLENS_REPORT_BASE`: base URL of report links (default: page origin)
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_overlays: env_number("CARDLENS_MAX_OVERLAYS").unwrap_or(defaults.max_overlays),
            scan_spacing_ms: env_number("CARDLENS_SCAN_SPACING_MS")
                .unwrap_or(defaults.scan_spacing_ms),
            viewport_margin_px: env_number::<f64>("CARDLENS_VIEWPORT_MARGIN_PX")
                .filter(|margin| margin.is_finite() && *margin >= 0.0)
                .unwrap_or(defaults.viewport_margin_px),
            inactivity_ms: env_number("CARDLENS_INACTIVITY_MS").unwrap_or(defaults.inactivity_ms),
            sweep_interval_ms: env_number("CARDLENS_SWEEP_INTERVAL_MS")
                .filter(|millis| *millis > 0)
                .unwrap_or(defaults.sweep_interval_ms),
            report_base: env::var("CARDLENS_REPORT_BASE")
                .ok()
                .and_then(|val| Url::parse(val.trim()).ok()),
            ..defaults
        }
    }

    /// Minimum spacing between scans as a `Duration`.
    #[inline]
    #[must_use]
    pub const fn scan_spacing(&self) -> Duration {
        Duration::from_millis(self.scan_spacing_ms)
    }

    #[inline]
    #[must_use]
    pub const fn inactivity(&self) -> Duration {
        Duration::from_millis(self.inactivity_ms)
    }

    #[inline]
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Dispatch delay for a mutation batch, longer when bulk containers were involved.
    #[inline]
    #[must_use]
    pub const fn dispatch_delay(&self, bulk: bool) -> Duration {
        Duration::from_millis(if bulk {
            self.bulk_dispatch_ms
        } else {
            self.card_dispatch_ms
        })
    }

    #[inline]
    #[must_use]
    pub const fn dataset_settle(&self) -> Duration {
        Duration::from_millis(self.dataset_settle_ms)
    }

    #[inline]
    #[must_use]
    pub const fn rebuild_watchdog(&self) -> Duration {
        Duration::from_millis(self.rebuild_watchdog_ms)
    }

    #[inline]
    #[must_use]
    pub const fn rebuild_backoff(&self) -> Duration {
        Duration::from_millis(self.rebuild_backoff_ms)
    }

    #[inline]
    #[must_use]
    pub const fn fingerprint_window(&self) -> Duration {
        Duration::from_millis(self.fingerprint_window_ms)
    }

    #[inline]
    #[must_use]
    pub const fn width_poll(&self) -> Duration {
        Duration::from_millis(self.width_poll_ms)
    }

    #[inline]
    #[must_use]
    pub const fn run_retry(&self) -> Duration {
        Duration::from_millis(self.run_retry_ms)
    }

    /// Backoff before connect attempt `attempt` (zero based): 1s, 2s, 4s, ...
    #[must_use]
    pub fn init_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.init_backoff_ms
                .saturating_mul(1_u64.checked_shl(attempt).unwrap_or(u64::MAX)),
        )
    }
}
