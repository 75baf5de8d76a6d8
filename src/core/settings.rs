//! Watch timing settings.

use crate::error::{Result, ValidationError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default cadence at which the store marker is sampled.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default multiplier deriving the ignore window from the poll interval.
pub const DEFAULT_IGNORE_WINDOW_FACTOR: f64 = 1.5;

/// Timing settings for a [`StoreWatcher`](crate::core::StoreWatcher).
///
/// The ignore window must be at least as long as the poll interval. A shorter
/// window lets a self-write be observed on a tick that lands just outside the
/// window, which makes the process reload after its own saves. This is
/// reported by [`validate`](WatchSettings::validate) but not rejected.
///
/// Deserializes from `poll_interval_ms`, and either `ignore_window_ms` or
/// `ignore_window_factor` (multiplied with the poll interval).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "SettingsRepr")]
pub struct WatchSettings {
    /// How often the store marker is sampled.
    pub poll_interval: Duration,
    /// How long after `notify_save` an observed change is attributed to it.
    pub ignore_window: Duration,
}

#[derive(Deserialize)]
struct SettingsRepr {
    poll_interval_ms: u64,
    ignore_window_ms: Option<u64>,
    ignore_window_factor: Option<f64>,
}

impl From<SettingsRepr> for WatchSettings {
    fn from(repr: SettingsRepr) -> Self {
        let poll_interval = Duration::from_millis(repr.poll_interval_ms);
        match repr.ignore_window_ms {
            Some(ms) => Self::new(poll_interval, Duration::from_millis(ms)),
            None => Self::derived(
                poll_interval,
                repr.ignore_window_factor
                    .unwrap_or(DEFAULT_IGNORE_WINDOW_FACTOR),
            ),
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self::derived(DEFAULT_POLL_INTERVAL, DEFAULT_IGNORE_WINDOW_FACTOR)
    }
}

impl WatchSettings {
    /// Settings with an explicit poll interval and ignore window.
    pub fn new(poll_interval: Duration, ignore_window: Duration) -> Self {
        Self {
            poll_interval,
            ignore_window,
        }
    }

    /// Settings whose ignore window is `poll_interval * factor`.
    ///
    /// Negative or non-finite factors are treated as zero; a product too
    /// large for a `Duration` saturates.
    pub fn derived(poll_interval: Duration, factor: f64) -> Self {
        let factor = if factor.is_finite() && factor > 0.0 {
            factor
        } else {
            0.0
        };
        // Float-to-int `as` casts saturate
        let nanos = (poll_interval.as_nanos() as f64 * factor).round();
        let ignore_window = Duration::from_nanos(nanos as u64);
        Self {
            poll_interval,
            ignore_window,
        }
    }

    /// Load settings from defaults, an optional file and environment variables.
    ///
    /// Sources are layered lowest to highest priority:
    /// 1. Defaults (2s interval, window derived with factor 1.5)
    /// 2. `path`, if given (YAML, TOML or JSON, detected from the extension)
    /// 3. `<PREFIX>_POLL_INTERVAL_MS`, `<PREFIX>_IGNORE_WINDOW_MS` and
    ///    `<PREFIX>_IGNORE_WINDOW_FACTOR`, if `env_prefix` is given
    ///
    /// The result is validated before it is returned.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use storewatch::core::WatchSettings;
    ///
    /// # fn example() -> storewatch::error::Result<()> {
    /// // MYAPP_POLL_INTERVAL_MS=500 overrides the file value
    /// let settings = WatchSettings::load(Some("config/watch.yaml".as_ref()), Some("MYAPP"))?;
    /// println!("polling every {:?}", settings.poll_interval);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, a value has the
    /// wrong type, or validation fails.
    pub fn load(path: Option<&Path>, env_prefix: Option<&str>) -> Result<Self> {
        let default_ms = u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(u64::MAX);
        let mut builder = config::Config::builder().set_default("poll_interval_ms", default_ms)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        if let Some(prefix) = env_prefix {
            builder = builder.add_source(config::Environment::with_prefix(prefix).try_parsing(true));
        }

        let settings: WatchSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    ///
    /// A zero poll interval is rejected. An ignore window shorter than the
    /// poll interval is logged as a hazard and accepted.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the poll interval is zero.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.poll_interval.is_zero() {
            return Err(ValidationError::invalid_field(
                "poll_interval",
                "must be greater than zero",
            ));
        }

        if !self.window_covers_interval() {
            warn!(
                poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
                ignore_window_ms = u64::try_from(self.ignore_window.as_millis()).unwrap_or(u64::MAX),
                "ignore window is shorter than the poll interval; own saves may trigger reloads"
            );
        }

        Ok(())
    }

    /// Whether the ignore window is at least one poll interval long.
    pub fn window_covers_interval(&self) -> bool {
        self.ignore_window >= self.poll_interval
    }
}
