//! TOML settings file for the command-line adapter.

use std::{fs, path::Path, time::Duration};

use anyhow::{ensure, Context, Result};
use crowd_sim_controller::ControllerConfig;
use crowd_sim_core::Timestamp;
use crowd_sim_system_size_events::Config as ScheduleConfig;
use crowd_sim_system_smoothing::DEFAULT_FACTOR;
use crowd_sim_world::{CrowdConfig, FieldConfig};
use serde::Deserialize;

/// Every tunable of a crowd session. Missing keys take their defaults.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Settings {
    pub(crate) seed: u64,
    pub(crate) tick_hz: u32,
    pub(crate) broadcast_ms: u64,
    pub(crate) field: FieldSettings,
    pub(crate) crowd: CrowdSettings,
    pub(crate) schedule: ScheduleSettings,
    pub(crate) smoothing: SmoothingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed: 7,
            tick_hz: 30,
            broadcast_ms: 100,
            field: FieldSettings::default(),
            crowd: CrowdSettings::default(),
            schedule: ScheduleSettings::default(),
            smoothing: SmoothingSettings::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FieldSettings {
    pub(crate) target_rgb: [u8; 3],
    pub(crate) tolerance: f32,
    pub(crate) close_size: u32,
    pub(crate) open_size: u32,
    pub(crate) snap_radius: u32,
}

impl Default for FieldSettings {
    fn default() -> Self {
        let defaults = FieldConfig::default();
        Self {
            target_rgb: defaults.target_rgb,
            tolerance: defaults.tolerance,
            close_size: defaults.close_size,
            open_size: defaults.open_size,
            snap_radius: defaults.snap_radius,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CrowdSettings {
    pub(crate) max_agents: usize,
    pub(crate) reset_min: usize,
    pub(crate) reset_max: usize,
    pub(crate) spawn_margin: u32,
    pub(crate) cluster_spread: f32,
    pub(crate) promotion_backdate_max_secs: f64,
}

impl Default for CrowdSettings {
    fn default() -> Self {
        let defaults = CrowdConfig::default();
        Self {
            max_agents: defaults.max_agents,
            reset_min: defaults.reset_min,
            reset_max: defaults.reset_max,
            spawn_margin: defaults.spawn_margin,
            cluster_spread: defaults.cluster_spread,
            promotion_backdate_max_secs: defaults.promotion_backdate_max,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ScheduleSettings {
    pub(crate) max_unshrink_secs: f64,
    pub(crate) promotion_min_secs: f64,
    pub(crate) promotion_max_secs: f64,
    pub(crate) shrink_min_secs: f64,
    pub(crate) shrink_max_secs: f64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        let defaults = ScheduleConfig::default();
        Self {
            max_unshrink_secs: defaults.max_unshrink.as_secs_f64(),
            promotion_min_secs: defaults.promotion_min.as_secs_f64(),
            promotion_max_secs: defaults.promotion_max.as_secs_f64(),
            shrink_min_secs: defaults.shrink_min.as_secs_f64(),
            shrink_max_secs: defaults.shrink_max.as_secs_f64(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SmoothingSettings {
    pub(crate) factor: f32,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            factor: DEFAULT_FACTOR,
        }
    }
}

/// Reads the settings file, or returns the defaults when no path is given.
pub(crate) fn load(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings at {}", path.display()))?;
    parse(&contents).with_context(|| format!("invalid settings in {}", path.display()))
}

/// Parses and validates settings from TOML text.
pub(crate) fn parse(contents: &str) -> Result<Settings> {
    let settings: Settings =
        toml::from_str(contents).context("failed to parse settings toml contents")?;
    settings.validate()?;
    Ok(settings)
}

impl Settings {
    fn validate(&self) -> Result<()> {
        ensure!(self.tick_hz > 0, "tick_hz must be positive");
        ensure!(self.broadcast_ms > 0, "broadcast_ms must be positive");
        ensure!(
            self.crowd.reset_min <= self.crowd.reset_max,
            "crowd.reset_min ({}) exceeds crowd.reset_max ({})",
            self.crowd.reset_min,
            self.crowd.reset_max
        );
        for (name, seconds) in [
            ("schedule.max_unshrink_secs", self.schedule.max_unshrink_secs),
            ("schedule.promotion_min_secs", self.schedule.promotion_min_secs),
            ("schedule.promotion_max_secs", self.schedule.promotion_max_secs),
            ("schedule.shrink_min_secs", self.schedule.shrink_min_secs),
            ("schedule.shrink_max_secs", self.schedule.shrink_max_secs),
            ("crowd.promotion_backdate_max_secs", self.crowd.promotion_backdate_max_secs),
        ] {
            ensure!(
                seconds.is_finite() && seconds >= 0.0,
                "{name} must be a non-negative number of seconds"
            );
        }
        ensure!(
            (0.0..=1.0).contains(&self.smoothing.factor),
            "smoothing.factor must lie within [0, 1]"
        );
        Ok(())
    }

    /// Field derivation parameters.
    pub(crate) fn field_config(&self) -> FieldConfig {
        FieldConfig {
            target_rgb: self.field.target_rgb,
            tolerance: self.field.tolerance,
            close_size: self.field.close_size,
            open_size: self.field.open_size,
            snap_radius: self.field.snap_radius,
            ..FieldConfig::default()
        }
    }

    /// Controller parameters for a session seeded with `seed` starting at `epoch`.
    pub(crate) fn controller_config(&self, seed: u64, epoch: Timestamp) -> ControllerConfig {
        ControllerConfig {
            tick_interval: Duration::from_secs_f64(1.0 / f64::from(self.tick_hz)),
            seed,
            epoch,
            crowd: CrowdConfig {
                max_agents: self.crowd.max_agents,
                reset_min: self.crowd.reset_min,
                reset_max: self.crowd.reset_max,
                spawn_margin: self.crowd.spawn_margin,
                cluster_spread: self.crowd.cluster_spread,
                promotion_backdate_max: self.crowd.promotion_backdate_max_secs,
                ..CrowdConfig::default()
            },
            schedule: ScheduleConfig {
                max_unshrink: Duration::from_secs_f64(self.schedule.max_unshrink_secs),
                promotion_min: Duration::from_secs_f64(self.schedule.promotion_min_secs),
                promotion_max: Duration::from_secs_f64(self.schedule.promotion_max_secs),
                shrink_min: Duration::from_secs_f64(self.schedule.shrink_min_secs),
                shrink_max: Duration::from_secs_f64(self.schedule.shrink_max_secs),
            },
            smoothing_factor: self.smoothing.factor,
        }
    }

    /// Interval between state broadcasts.
    pub(crate) fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let settings = parse("").expect("defaults");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.field.target_rgb, [0, 200, 0]);
        assert_eq!(settings.crowd.max_agents, 24);
        assert_eq!(settings.schedule.max_unshrink_secs, 300.0);
        assert!((settings.smoothing.factor - 0.22).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_tables_override_only_named_keys() {
        let settings = parse(
            r#"
            seed = 99
            tick_hz = 60

            [field]
            tolerance = 20.0

            [crowd]
            max_agents = 10

            [schedule]
            promotion_min_secs = 1.5
            "#,
        )
        .expect("valid settings");

        assert_eq!(settings.seed, 99);
        assert_eq!(settings.field.tolerance, 20.0);
        assert_eq!(settings.field.close_size, 5);
        assert_eq!(settings.crowd.max_agents, 10);
        assert_eq!(settings.crowd.reset_min, 5);

        let config = settings.controller_config(3, Timestamp::from_secs(10.0));
        assert_eq!(config.seed, 3);
        assert_eq!(config.crowd.max_agents, 10);
        assert_eq!(config.schedule.promotion_min, Duration::from_millis(1_500));
        assert_eq!(config.schedule.promotion_max, Duration::from_secs(14));
        assert!((config.tick_interval.as_secs_f64() - 1.0 / 60.0).abs() < 1e-9);
        assert_eq!(settings.field_config().tolerance, 20.0);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let error = parse("[crowd]\nmax_agent = 3\n").expect_err("typo must fail");
        assert!(format!("{error:#}").contains("max_agent"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(parse("tick_hz = 0").is_err());
        assert!(parse("[crowd]\nreset_min = 9\nreset_max = 3\n").is_err());
        assert!(parse("[smoothing]\nfactor = 1.5\n").is_err());
        assert!(parse("[schedule]\nshrink_min_secs = -1.0\n").is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let error = load(Some(Path::new("/nonexistent/crowd.toml"))).expect_err("missing");
        assert!(format!("{error:#}").contains("/nonexistent/crowd.toml"));
    }
}
