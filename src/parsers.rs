//! # Parsers: Fixed-Format Command Output
//!
//! Pure functions turning the text of `df -h`, `free -m`, `supervisorctl status`
//! and `rpm -q <package>` into typed readings. None of them fail: a missing or
//! malformed line produces the sentinel reading instead, so the caller can still
//! append a timestamp-aligned sample.

use crate::model::{ProcessStatus, SENTINEL};

/// One disk reading for the monitored mount, in GB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskReading {
    pub used_gb: f64,
    pub capacity_gb: f64,
    pub timestamp: i64,
}

impl DiskReading {
    pub fn unknown(timestamp: i64) -> Self {
        DiskReading {
            used_gb: SENTINEL,
            capacity_gb: 0.0,
            timestamp,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.used_gb != SENTINEL
    }
}

/// `Mem:` and `Swap:` totals/used in MB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryReading {
    pub memory_total_mb: f64,
    pub memory_used_mb: f64,
    pub swap_total_mb: f64,
    pub swap_used_mb: f64,
    pub timestamp: i64,
}

impl MemoryReading {
    pub fn unknown(timestamp: i64) -> Self {
        MemoryReading {
            memory_total_mb: 0.0,
            memory_used_mb: SENTINEL,
            swap_total_mb: 0.0,
            swap_used_mb: SENTINEL,
            timestamp,
        }
    }
}

/// Convert a `df -h` size such as `1500M`, `1.5G` or `2T` to GB.
/// Unknown units yield 0. A bare number is a byte count (`df -h` prints an
/// empty volume's usage as `0`).
pub fn parse_size_to_gb(size: &str) -> Option<f64> {
    let size = size.trim();
    if !size.is_empty() && size.chars().all(|c| c.is_ascii_digit() || c == '.') {
        let bytes: f64 = size.parse().ok()?;
        return Some(bytes / (1024.0 * 1024.0 * 1024.0));
    }
    let unit = size.chars().last()?;
    let value: f64 = size[..size.len() - unit.len_utf8()].parse().ok()?;
    Some(match unit {
        'G' => value,
        'M' => value / 1024.0,
        'T' => value * 1024.0,
        _ => 0.0,
    })
}

/// Parse `df -h` output for `mount_path`.
///
/// A line whose last column is exactly the mount wins over a line that only
/// contains it (e.g. `/pss` vs `/pss2`).
pub fn parse_disk_usage(output: &str, mount_path: &str, timestamp: i64) -> DiskReading {
    let exact = output
        .lines()
        .find(|line| line.split_whitespace().last() == Some(mount_path));
    let line = exact.or_else(|| output.lines().find(|line| line.contains(mount_path)));
    let Some(line) = line else {
        return DiskReading::unknown(timestamp);
    };

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 3 {
        return DiskReading::unknown(timestamp);
    }
    match (parse_size_to_gb(parts[1]), parse_size_to_gb(parts[2])) {
        (Some(capacity_gb), Some(used_gb)) => DiskReading {
            used_gb,
            capacity_gb,
            timestamp,
        },
        _ => DiskReading::unknown(timestamp),
    }
}

/// Parse `free -m` output. A missing half reports total 0 and used -1.
pub fn parse_memory_usage(output: &str, timestamp: i64) -> MemoryReading {
    let (memory_total_mb, memory_used_mb) = total_and_used(output, "Mem:");
    let (swap_total_mb, swap_used_mb) = total_and_used(output, "Swap:");
    MemoryReading {
        memory_total_mb,
        memory_used_mb,
        swap_total_mb,
        swap_used_mb,
        timestamp,
    }
}

fn total_and_used(output: &str, prefix: &str) -> (f64, f64) {
    output
        .lines()
        .map(str::trim_start)
        .find(|line| line.starts_with(prefix))
        .and_then(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let total = parts.get(1)?.parse::<f64>().ok()?;
            let used = parts.get(2)?.parse::<f64>().ok()?;
            Some((total, used))
        })
        .unwrap_or((0.0, SENTINEL))
}

/// Parse `supervisorctl status`: one process per line, name then state.
pub fn parse_supervisor_status(output: &str) -> Vec<ProcessStatus> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let status = parts.next()?;
            Some(ProcessStatus {
                name: name.to_string(),
                status: status.to_string(),
            })
        })
        .collect()
}

/// Extract `<version>` from `rpm -q` output of the form `<package>-<version>-<release>`.
/// Returns an empty string when the package is not present.
pub fn parse_version(output: &str, package: &str) -> String {
    let prefix = format!("{package}-");
    for (idx, _) in output.match_indices(&prefix) {
        let token: String = output[idx + prefix.len()..]
            .chars()
            .take_while(|c| *c != '-' && !c.is_whitespace())
            .collect();
        if !token.is_empty() {
            return token;
        }
    }
    String::new()
}
