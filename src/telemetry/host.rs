//! Live host sampler backed by `sysinfo` and `/proc/diskstats`.

use std::time::Instant;

use sysinfo::{Networks, System};
use tracing::{debug, trace};

use crate::telemetry::{byte_rate, MetricSnapshot, TelemetryError, TelemetrySource};

/// Sector size used by `/proc/diskstats`, independent of the device.
const DISKSTATS_SECTOR_BYTES: u64 = 512;

#[derive(Debug, Clone, Copy)]
struct Counters {
    net_in: u64,
    net_out: u64,
    disk_read: u64,
    disk_write: u64,
    at: Instant,
}

/// Samples CPU, memory, network and disk throughput for the whole host.
///
/// The first call primes the byte counters and reports zero rates.
pub struct HostSampler {
    system: System,
    networks: Networks,
    previous: Option<Counters>,
}

impl HostSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; prime it now.
        system.refresh_cpu_usage();
        Self {
            system,
            networks: Networks::new_with_refreshed_list(),
            previous: None,
        }
    }

    fn read_counters(&mut self) -> Result<Counters, TelemetryError> {
        self.networks.refresh();
        let (net_in, net_out) = self
            .networks
            .iter()
            .fold((0u64, 0u64), |(rx, tx), (_name, data)| {
                (
                    rx.saturating_add(data.total_received()),
                    tx.saturating_add(data.total_transmitted()),
                )
            });
        let (disk_read, disk_write) = read_disk_bytes()?;

        Ok(Counters {
            net_in,
            net_out,
            disk_read,
            disk_write,
            at: Instant::now(),
        })
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySource for HostSampler {
    fn collect(&mut self) -> Result<MetricSnapshot, TelemetryError> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let cpus = self.system.cpus();
        let cpu = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64
        };
        let total_mem = self.system.total_memory();
        let mem = if total_mem == 0 {
            0.0
        } else {
            self.system.used_memory() as f64 / total_mem as f64 * 100.0
        };

        let current = self.read_counters()?;
        let (net_in_bps, net_out_bps, disk_read_bps, disk_write_bps) = match self.previous {
            Some(prev) => {
                let elapsed = current.at.duration_since(prev.at).as_secs_f64();
                (
                    byte_rate(prev.net_in, current.net_in, elapsed),
                    byte_rate(prev.net_out, current.net_out, elapsed),
                    byte_rate(prev.disk_read, current.disk_read, elapsed),
                    byte_rate(prev.disk_write, current.disk_write, elapsed),
                )
            }
            None => {
                debug!("priming host counters");
                (0.0, 0.0, 0.0, 0.0)
            }
        };
        self.previous = Some(current);

        let snapshot = MetricSnapshot {
            ts: chrono::Utc::now().to_rfc3339(),
            cpu,
            mem,
            net_in_bps,
            net_out_bps,
            disk_read_bps,
            disk_write_bps,
        };
        trace!(?snapshot, "host sample");
        Ok(snapshot)
    }
}

#[cfg(target_os = "linux")]
fn read_disk_bytes() -> Result<(u64, u64), TelemetryError> {
    let content = match std::fs::read_to_string("/proc/diskstats") {
        Ok(content) => content,
        // Some containers hide diskstats; report no disk traffic rather than fail.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(source) => {
            return Err(TelemetryError::Io {
                what: "/proc/diskstats",
                source,
            })
        }
    };
    Ok(parse_diskstats(&content, |name| {
        std::path::Path::new("/sys/block").join(name).exists()
    }))
}

#[cfg(not(target_os = "linux"))]
fn read_disk_bytes() -> Result<(u64, u64), TelemetryError> {
    Ok((0, 0))
}

/// Sum bytes read and written over whole-disk rows of `/proc/diskstats`.
///
/// Partitions are skipped so their traffic is not counted twice, as are
/// loop and RAM devices.
pub fn parse_diskstats(content: &str, is_whole_disk: impl Fn(&str) -> bool) -> (u64, u64) {
    let mut read = 0u64;
    let mut written = 0u64;
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let name = fields[2];
        if name.starts_with("loop") || name.starts_with("ram") || !is_whole_disk(name) {
            continue;
        }
        let sectors_read = fields[5].parse::<u64>().unwrap_or(0);
        let sectors_written = fields[9].parse::<u64>().unwrap_or(0);
        read = read.saturating_add(sectors_read.saturating_mul(DISKSTATS_SECTOR_BYTES));
        written = written.saturating_add(sectors_written.saturating_mul(DISKSTATS_SECTOR_BYTES));
    }
    (read, written)
}
