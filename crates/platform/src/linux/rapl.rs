use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::energy::{EnergyCounter, EnergyDomain};
use crate::error::CounterError;

const ZONE_PREFIX: &str = "intel-rapl:";
const ENERGY_FILE: &str = "energy_uj";
const MAX_ENERGY_FILE: &str = "max_energy_range_uj";
const NAME_FILE: &str = "name";

/// What discovery saw for one powercap zone, readable or not.
#[derive(Debug, Clone)]
pub struct DomainProbe {
    pub path: PathBuf,
    pub name: Option<String>,
    pub readable: bool,
    pub max_energy_uj: Option<u64>,
}

/// Poll-based counter over powercap RAPL zones.
///
/// Reads are plain sysfs file reads, effectively instantaneous.
#[derive(Debug)]
pub struct RaplCounter {
    domains: Vec<EnergyDomain>,
    closed: bool,
}

impl RaplCounter {
    /// Pick the first `sockets` readable zones under `root` whose name starts with `class`.
    ///
    /// Zones that exist but cannot be read (usually a permission problem on
    /// `energy_uj`) are skipped.
    pub fn discover(root: &Path, class: &str, sockets: usize) -> Result<Self, CounterError> {
        let candidates = zone_candidates(root)?;

        let matching: Vec<(PathBuf, String)> = candidates
            .into_iter()
            .filter_map(|path| {
                if !is_readable(&path) {
                    tracing::debug!(path = %path.display(), "skipping unreadable RAPL zone");
                    return None;
                }
                let name = read_trimmed(&path.join(NAME_FILE)).ok()?;
                name.starts_with(class).then_some((path, name))
            })
            .collect();

        if matching.len() < sockets {
            return Err(CounterError::InsufficientDomains {
                requested: sockets,
                found: matching.len(),
                class: class.to_string(),
            });
        }

        let mut domains = Vec::with_capacity(sockets);
        for (path, name) in matching.into_iter().take(sockets) {
            let last_uj = read_u64(&path.join(ENERGY_FILE)).map_err(|source| {
                CounterError::CounterRead {
                    domain: name.clone(),
                    source,
                }
            })?;
            let max_uj = read_u64(&path.join(MAX_ENERGY_FILE)).map_err(|source| {
                CounterError::CounterRead {
                    domain: name.clone(),
                    source,
                }
            })?;
            domains.push(EnergyDomain::new(path, name, last_uj, max_uj));
        }

        tracing::info!(
            domains = ?domains.iter().map(|d| d.path().display().to_string()).collect::<Vec<_>>(),
            "using RAPL domains"
        );

        Ok(Self {
            domains,
            closed: false,
        })
    }

    pub fn domains(&self) -> &[EnergyDomain] {
        &self.domains
    }
}

impl EnergyCounter for RaplCounter {
    fn read_delta(&mut self) -> Result<f64, CounterError> {
        let mut total_uj = 0u64;

        for domain in &mut self.domains {
            let current = read_u64(&domain.path().join(ENERGY_FILE)).map_err(|source| {
                CounterError::CounterRead {
                    domain: domain.name().to_string(),
                    source,
                }
            })?;
            total_uj += domain.advance(current);
        }

        Ok(total_uj as f64)
    }

    fn domain_names(&self) -> Vec<String> {
        self.domains.iter().map(|d| d.name().to_string()).collect()
    }

    fn close(&mut self) {
        if !self.closed {
            tracing::debug!("closing RAPL counter");
            self.closed = true;
        }
    }
}

/// Describe every zone under `root` without filtering, for diagnostics.
pub fn probe_domains(root: &Path) -> Result<Vec<DomainProbe>, CounterError> {
    Ok(zone_candidates(root)?
        .into_iter()
        .map(|path| DomainProbe {
            name: read_trimmed(&path.join(NAME_FILE)).ok(),
            readable: is_readable(&path),
            max_energy_uj: read_u64(&path.join(MAX_ENERGY_FILE)).ok(),
            path,
        })
        .collect())
}

fn zone_candidates(root: &Path) -> Result<Vec<PathBuf>, CounterError> {
    let entries = fs::read_dir(root).map_err(|_| CounterError::SourceUnavailable {
        path: root.to_path_buf(),
    })?;

    let mut zones: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(ZONE_PREFIX))
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    zones.sort_by_cached_key(|path| (zone_index(path), path.clone()));

    Ok(zones)
}

/// Numeric parts of `intel-rapl:1:0`, so `intel-rapl:10` sorts after `intel-rapl:2`.
fn zone_index(path: &Path) -> Vec<u64> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix(ZONE_PREFIX))
        .map(|suffix| {
            suffix
                .split(':')
                .map(|part| part.parse().unwrap_or(u64::MAX))
                .collect()
        })
        .unwrap_or_default()
}

fn is_readable(zone: &Path) -> bool {
    fs::read_to_string(zone.join(ENERGY_FILE)).is_ok()
}

fn read_trimmed(path: &Path) -> io::Result<String> {
    fs::read_to_string(path).map(|s| s.trim().to_string())
}

fn read_u64(path: &Path) -> io::Result<u64> {
    let content = read_trimmed(path)?;
    content.parse::<u64>().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {:?}: {}", path.display(), content, e),
        )
    })
}
