//! Platform selection for energy counters, decided once at construction.

use crate::energy::{CounterConfig, EnergyCounter};
use crate::error::CounterError;

/// Open the energy counter appropriate for this platform.
///
/// Linux reads powercap RAPL zones directly; macOS streams readings from
/// `powermetrics`. Anything else reports the source as unavailable.
pub fn open_counter(config: &CounterConfig) -> Result<Box<dyn EnergyCounter>, CounterError> {
    open_platform_counter(config)
}

#[cfg(all(target_os = "linux", feature = "linux"))]
fn open_platform_counter(config: &CounterConfig) -> Result<Box<dyn EnergyCounter>, CounterError> {
    let counter = crate::linux::RaplCounter::discover(
        &config.powercap_root,
        &config.domain_class,
        config.sockets,
    )?;
    Ok(Box::new(counter))
}

#[cfg(all(target_os = "macos", feature = "macos"))]
fn open_platform_counter(config: &CounterConfig) -> Result<Box<dyn EnergyCounter>, CounterError> {
    use crate::powermetrics::{powermetrics_command, PowermetricsParser};
    use crate::stream::StreamCounter;

    let counter = StreamCounter::spawn(
        "cpu (powermetrics)",
        powermetrics_command(config.sampling_interval),
        PowermetricsParser::new(),
        config.sampling_interval,
    )?;
    Ok(Box::new(counter))
}

#[cfg(not(any(
    all(target_os = "linux", feature = "linux"),
    all(target_os = "macos", feature = "macos")
)))]
fn open_platform_counter(config: &CounterConfig) -> Result<Box<dyn EnergyCounter>, CounterError> {
    Err(CounterError::SourceUnavailable {
        path: config.powercap_root.clone(),
    })
}

#[cfg(all(test, target_os = "linux", feature = "linux"))]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_linux_factory_uses_powercap_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let zone = dir.path().join("intel-rapl:0");
        fs::create_dir_all(&zone).unwrap();
        fs::write(zone.join("name"), "package-0\n").unwrap();
        fs::write(zone.join("energy_uj"), "100\n").unwrap();
        fs::write(zone.join("max_energy_range_uj"), "1000\n").unwrap();

        let config = CounterConfig {
            powercap_root: dir.path().to_path_buf(),
            ..CounterConfig::default()
        };
        let counter = open_counter(&config).unwrap();
        assert_eq!(counter.domain_names(), vec!["package-0"]);
    }

    #[test]
    fn test_linux_factory_missing_root() {
        let config = CounterConfig {
            powercap_root: "/definitely/not/powercap".into(),
            ..CounterConfig::default()
        };
        assert!(matches!(
            open_counter(&config),
            Err(CounterError::SourceUnavailable { .. })
        ));
    }
}
