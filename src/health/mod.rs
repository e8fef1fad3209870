//! # Target Health Monitoring
//!
//! Periodic reachability probes with hysteresis: consecutive failures
//! escalate a target through warning to critical, and recovery requires a
//! run of fast successful probes before the target is trusted again. Probe
//! cadence tightens as health degrades and is tuned per environment.

pub mod monitor;

pub use monitor::{ProbeReport, TargetHealthMonitor};
