use color_eyre::eyre::Result;
use pidwatt_platform::{open_counter, ProcessIntrospector, SysinfoIntrospector};

use crate::config::{config_path, SessionConfig, UserConfig};
use crate::logging;

pub fn run() -> Result<()> {
    println!("pidwatt debug information");
    println!("{}", "=".repeat(60));

    let config = UserConfig::load();
    let session = SessionConfig::from_user(&config);

    println!("\n--- System Info ---");
    let introspector = SysinfoIntrospector::new();
    println!("Logical cores: {}", introspector.logical_cores());
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        let euid = unsafe { libc::geteuid() };
        println!("Effective uid: {}", euid);
    }

    println!("\n--- Energy Domains ---");
    print_domains(&session);

    println!("\n--- Selected Counter ---");
    match open_counter(&session.counter_config()) {
        Ok(mut counter) => {
            println!("Domains: {}", counter.domain_names().join(", "));
            counter.close();
        }
        Err(e) => println!("Unavailable: {}", e),
    }

    println!("\n--- Config Paths ---");
    println!("Config: {}", config_path().display());
    println!("Logs: {}", logging::log_dir().display());

    println!("\n--- Current Config ---");
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

#[cfg(all(target_os = "linux", feature = "linux"))]
fn print_domains(session: &SessionConfig) {
    use pidwatt_platform::linux::probe_domains;

    println!("Powercap root: {}", session.powercap_root.display());
    match probe_domains(&session.powercap_root) {
        Ok(probes) if probes.is_empty() => println!("No RAPL zones found"),
        Ok(probes) => {
            for probe in probes {
                println!(
                    "{:<40} {:<12} readable={:<5} max_range={}",
                    probe.path.display(),
                    probe.name.as_deref().unwrap_or("?"),
                    probe.readable,
                    probe
                        .max_energy_uj
                        .map(|uj| format!("{uj} uJ"))
                        .unwrap_or_else(|| "unknown".to_string())
                );
            }
        }
        Err(e) => println!("{}", e),
    }
}

#[cfg(not(all(target_os = "linux", feature = "linux")))]
fn print_domains(_session: &SessionConfig) {
    if cfg!(target_os = "macos") {
        println!("powermetrics cpu_power sampler (requires sudo)");
    } else {
        println!("No energy source on this platform");
    }
}
