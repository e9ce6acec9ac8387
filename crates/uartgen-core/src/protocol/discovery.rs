//! Device discovery
//!
//! Runs the [`Prober`] over a list of candidate ports. Probes block for
//! seconds each, so callers with an interactive surface should use
//! [`Discovery::spawn`] or [`Discovery::scan_parallel`] rather than scanning
//! on their own thread.

use std::thread::JoinHandle;
use tracing::{info, warn};

use super::{PortInfo, ProbeReport, Prober, ProtocolError};

/// Result of one discovery pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Ports that were probed, in order
    pub candidates: Vec<String>,
    /// Ports where a generator answered
    pub found: Vec<String>,
    /// Diagnostic probe of the first candidate, run only when nothing was found
    pub diagnostic: Option<ProbeReport>,
}

/// Port names from an enumeration, in probe order
pub fn candidate_names(ports: &[PortInfo]) -> Vec<String> {
    ports.iter().map(|p| p.name.clone()).collect()
}

pub struct Discovery {
    prober: Prober,
}

impl Discovery {
    pub fn new(prober: Prober) -> Self {
        Self { prober }
    }

    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    /// Probe candidates one after another
    pub fn scan<S: AsRef<str>>(&self, candidates: &[S]) -> Vec<String> {
        candidates
            .iter()
            .map(AsRef::as_ref)
            .filter(|port| self.prober.probe(port))
            .map(str::to_string)
            .collect()
    }

    /// Probe every candidate at once, one thread each. Each thread owns its
    /// port; results keep candidate order.
    pub fn scan_parallel<S: AsRef<str> + Sync>(&self, candidates: &[S]) -> Vec<String> {
        std::thread::scope(|scope| {
            let probes: Vec<_> = candidates
                .iter()
                .map(|candidate| {
                    let port = candidate.as_ref();
                    (port, scope.spawn(move || self.prober.probe(port)))
                })
                .collect();

            probes
                .into_iter()
                .filter_map(|(port, handle)| match handle.join() {
                    Ok(true) => Some(port.to_string()),
                    Ok(false) => None,
                    Err(_) => {
                        warn!("probe thread for {} panicked", port);
                        None
                    }
                })
                .collect()
        })
    }

    /// Sequential scan; if nothing answers, capture a diagnostic from the
    /// first candidate so the operator can see what the port is saying
    pub fn discover<S: AsRef<str>>(&self, candidates: &[S]) -> DiscoveryReport {
        let names: Vec<String> = candidates.iter().map(|c| c.as_ref().to_string()).collect();
        let found = self.scan(&names);
        info!(
            "discovery finished: {} of {} ports have a generator",
            found.len(),
            names.len()
        );

        let diagnostic = match (found.is_empty(), names.first()) {
            (true, Some(first)) => Some(self.prober.probe_with_diagnostics(first)),
            _ => None,
        };

        DiscoveryReport {
            candidates: names,
            found,
            diagnostic,
        }
    }

    /// Run [`discover`](Self::discover) on a background thread
    pub fn spawn(self, candidates: Vec<String>) -> Result<JoinHandle<DiscoveryReport>, ProtocolError> {
        let handle = std::thread::Builder::new()
            .name("uartgen-discovery".to_string())
            .spawn(move || self.discover(&candidates))?;
        Ok(handle)
    }
}
