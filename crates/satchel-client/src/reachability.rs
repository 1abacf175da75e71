//! Advisory network-path probe.
//!
//! Checked once before a request starts. The path state may change before
//! the request reaches the network; that staleness is accepted, the probe
//! only exists to fail fast when the device is clearly offline.

/// Capability interface over the platform's network-path monitor
pub trait ReachabilityProbe: Send + Sync {
    /// True when the current network path is usable
    fn is_satisfied(&self) -> bool;
}

/// Probe that always reports a usable path (servers, tests, platforms
/// without a path monitor)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

impl ReachabilityProbe for AlwaysReachable {
    fn is_satisfied(&self) -> bool {
        true
    }
}

/// Fixed-answer probe, mainly for tests
#[derive(Debug, Clone, Copy)]
pub struct FixedReachability(pub bool);

impl ReachabilityProbe for FixedReachability {
    fn is_satisfied(&self) -> bool {
        self.0
    }
}
