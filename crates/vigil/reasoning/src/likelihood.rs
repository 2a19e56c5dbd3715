//! Fixed likelihood table: P(signal observed | failure mode)
//!
//! The table is hand-set per failure mode, not learned. An absent signal
//! contributes `1 - P(present)`, and an evidence item with several
//! observations multiplies them as if independent.

use vigil_types::{FailureMode, Observation, Signal};

/// Used for pairs the table does not list
const BASELINE: f64 = 0.10;

#[derive(Debug, Clone, Copy, Default)]
pub struct LikelihoodTable;

impl LikelihoodTable {
    /// P(signal present | mode)
    pub fn present(&self, mode: FailureMode, signal: Signal) -> f64 {
        use FailureMode::*;
        use Signal::*;
        match (signal, mode) {
            (OomKilled, ResourceExhaustion) => 0.90,
            (OomKilled, NodePressure) => 0.30,
            (OomKilled, ApplicationDefect) => 0.20,
            (OomKilled, BadDeployment) => 0.15,
            (OomKilled, DependencyFailure | NetworkFailure) => 0.05,

            (MemoryPressure, ResourceExhaustion) => 0.85,
            (MemoryPressure, NodePressure) => 0.60,
            (MemoryPressure, ApplicationDefect) => 0.25,
            (MemoryPressure, BadDeployment) => 0.20,
            (MemoryPressure, ConfigurationError) => 0.15,

            (CpuThrottling, ResourceExhaustion) => 0.70,
            (CpuThrottling, NodePressure) => 0.40,
            (CpuThrottling, ApplicationDefect) => 0.30,
            (CpuThrottling, BadDeployment | ConfigurationError) => 0.20,

            (CrashLoop, ApplicationDefect) => 0.70,
            (CrashLoop, ConfigurationError | BadDeployment) => 0.60,
            (CrashLoop, ResourceExhaustion) => 0.50,
            (CrashLoop, DependencyFailure) => 0.40,
            (CrashLoop, NetworkFailure) => 0.30,
            (CrashLoop, NodePressure) => 0.20,

            (ImagePullFailure, BadDeployment) => 0.70,
            (ImagePullFailure, ConfigurationError) => 0.30,
            (ImagePullFailure, NetworkFailure) => 0.20,
            (ImagePullFailure, _) => 0.05,

            (ConfigChanged, ConfigurationError) => 0.90,
            (ConfigChanged, BadDeployment) => 0.50,
            (ConfigChanged, ApplicationDefect) => 0.15,

            (RecentRollout, BadDeployment) => 0.90,
            (RecentRollout, ConfigurationError) => 0.40,
            (RecentRollout, ApplicationDefect) => 0.30,

            (NodeNotReady, NodePressure) => 0.80,
            (NodeNotReady, NetworkFailure) => 0.30,
            (NodeNotReady, _) => 0.05,

            (DiskPressure, NodePressure) => 0.70,
            (DiskPressure, ResourceExhaustion) => 0.20,
            (DiskPressure, _) => 0.05,

            (DnsFailure, NetworkFailure) => 0.80,
            (DnsFailure, DependencyFailure) => 0.50,
            (DnsFailure, ConfigurationError) => 0.20,
            (DnsFailure, _) => 0.05,

            (ConnectionRefused, DependencyFailure) => 0.80,
            (ConnectionRefused, NetworkFailure) => 0.60,
            (ConnectionRefused, ConfigurationError) => 0.30,
            (ConnectionRefused, ApplicationDefect | BadDeployment) => 0.20,

            (UpstreamTimeout, DependencyFailure) => 0.80,
            (UpstreamTimeout, NetworkFailure) => 0.60,
            (UpstreamTimeout, ResourceExhaustion) => 0.30,
            (UpstreamTimeout, ApplicationDefect) => 0.20,

            (ErrorRateSpike, ApplicationDefect) => 0.80,
            (ErrorRateSpike, DependencyFailure | BadDeployment) => 0.60,
            (ErrorRateSpike, ConfigurationError | NetworkFailure) => 0.50,
            (ErrorRateSpike, ResourceExhaustion) => 0.40,
            (ErrorRateSpike, NodePressure) => 0.30,

            _ => BASELINE,
        }
    }

    pub fn observation(&self, mode: FailureMode, observation: &Observation) -> f64 {
        let p = self.present(mode, observation.signal);
        if observation.present {
            p
        } else {
            1.0 - p
        }
    }

    /// Joint likelihood of all observations; 1.0 when there are none
    pub fn evidence(&self, mode: FailureMode, observations: &[Observation]) -> f64 {
        observations
            .iter()
            .map(|o| self.observation(mode, o))
            .product()
    }

    /// How well a signal separates two modes
    pub fn discrimination(&self, a: FailureMode, b: FailureMode, signal: Signal) -> f64 {
        (self.present(a, signal) - self.present(b, signal)).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_pair_is_a_probability() {
        let table = LikelihoodTable;
        for mode in FailureMode::ALL {
            for signal in Signal::ALL {
                let p = table.present(mode, signal);
                assert!(p > 0.0 && p < 1.0, "{mode}/{signal} = {p}");
            }
        }
    }

    #[test]
    fn test_absent_signal_is_complement() {
        let table = LikelihoodTable;
        let l = table.observation(
            FailureMode::ResourceExhaustion,
            &Observation::absent(Signal::OomKilled),
        );
        assert!((l - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_no_observations_is_neutral() {
        assert_eq!(LikelihoodTable.evidence(FailureMode::BadDeployment, &[]), 1.0);
    }
}
