//! Command line arguments

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use codefinder_core::prelude::*;
use codefinder_core::protocol::DEFAULT_BAUD_RATE;
use codefinder_core::search::DEFAULT_MAX_CONSECUTIVE_MALFORMED;

/// RNS510 PIN code finder
///
/// Tries every code in [start, stop] over the head unit's service console
/// until one is accepted.
#[derive(Parser, Debug, Clone)]
#[command(name = "rns510-codefinder")]
#[command(version)]
#[command(about = "RNS510 PIN code finder")]
pub struct Args {
    /// Serial port (e.g. /dev/ttyUSB0, COM3) or tcp://host:port for a simulator
    #[arg(long)]
    pub portname: String,

    /// Baud rate for the serial connection
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baudrate: u32,

    /// Reply window per attempt, in seconds
    #[arg(long, default_value_t = 1.0, value_parser = parse_timeout)]
    pub timeout: f64,

    /// First code to try
    #[arg(long, default_value_t = 0)]
    pub start: u32,

    /// Last code to try (inclusive)
    #[arg(long, default_value_t = 1999)]
    pub stop: u32,

    /// Number of digits in a code (defaults to the profile's width)
    #[arg(long)]
    pub digits: Option<u8>,

    /// JSON device profile overriding the built-in RNS510 wire format
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Consecutive malformed replies before giving up (0 = never)
    #[arg(long, default_value_t = DEFAULT_MAX_CONSECUTIVE_MALFORMED)]
    pub max_malformed: u32,

    /// Emit events as JSON lines on stdout
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Longest accepted reply window, in seconds
const MAX_TIMEOUT_SECS: f64 = 3600.0;

fn parse_timeout(s: &str) -> Result<f64, String> {
    let secs: f64 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("timeout must be a positive number of seconds, got {}", s));
    }
    if secs > MAX_TIMEOUT_SECS {
        return Err(format!(
            "timeout must not exceed {} seconds, got {}",
            MAX_TIMEOUT_SECS, s
        ));
    }
    Ok(secs)
}

impl Args {
    /// Device profile from `--profile`, or the RNS510 default, with `--digits` applied
    pub fn device_profile(&self) -> Result<DeviceProfile> {
        let mut profile = match &self.profile {
            Some(path) => DeviceProfile::from_file(path)
                .with_context(|| format!("failed to load profile {}", path.display()))?,
            None => DeviceProfile::rns510(),
        };
        if let Some(digits) = self.digits {
            profile.digits = digits;
        }
        profile.validate().context("invalid device profile")?;
        Ok(profile)
    }

    /// Candidate range rendered with `digits` digits
    pub fn code_range(&self, digits: u8) -> Result<CodeRange> {
        CodeRange::new(self.start, self.stop, digits).context("invalid code range")
    }

    /// Transport settings
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            baud_rate: self.baudrate,
            timeout: Duration::from_secs_f64(self.timeout),
            ..TransportConfig::new(self.portname.clone())
        }
    }

    /// Search policy
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            max_consecutive_malformed: self.max_malformed,
        }
    }
}
