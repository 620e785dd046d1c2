//! Online CPU discovery
//!
//! The pin target is chosen from the CPUs the kernel has brought online, not
//! from this process's affinity mask. A core reserved with `isolcpus=` is
//! missing from every default mask but is exactly where the client belongs.

use std::fs;

use nix::unistd::{sysconf, SysconfVar};
use tracing::debug;

/// Kernel list of online CPUs, e.g. `0-3,5`
pub const ONLINE_CPUS_PATH: &str = "/sys/devices/system/cpu/online";

/// Parse a kernel CPU list such as `0-3,5,7-9`
///
/// Returns the ids in ascending order, or None if any entry is not a valid
/// id or range.
pub fn parse_cpu_list(text: &str) -> Option<Vec<usize>> {
    let mut cpus = Vec::new();
    for entry in text.trim().split(',').filter(|e| !e.is_empty()) {
        match entry.split_once('-') {
            Some((lo, hi)) => {
                let lo: usize = lo.trim().parse().ok()?;
                let hi: usize = hi.trim().parse().ok()?;
                if hi < lo {
                    return None;
                }
                cpus.extend(lo..=hi);
            }
            None => cpus.push(entry.trim().parse().ok()?),
        }
    }
    cpus.sort_unstable();
    cpus.dedup();
    (!cpus.is_empty()).then_some(cpus)
}

/// CPUs currently online, regardless of affinity mask or cgroup quota
pub fn online_cpus() -> Vec<usize> {
    if let Some(cpus) = fs::read_to_string(ONLINE_CPUS_PATH)
        .ok()
        .and_then(|text| parse_cpu_list(&text))
    {
        return cpus;
    }

    debug!(path = ONLINE_CPUS_PATH, "online CPU list unavailable, using sysconf");
    match sysconf(SysconfVar::_NPROCESSORS_ONLN) {
        Ok(Some(n)) if n > 0 => (0..n as usize).collect(),
        _ => vec![0],
    }
}

/// Highest-numbered online CPU
pub fn last_online_cpu() -> usize {
    online_cpus().last().copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    #[test]
    fn test_parse_cpu_list_ranges_and_singles() {
        assert_eq!(parse_cpu_list("0-3,5,7-9\n"), Some(vec![0, 1, 2, 3, 5, 7, 8, 9]));
    }

    #[test]
    fn test_parse_cpu_list_single_cpu() {
        assert_eq!(parse_cpu_list("0\n"), Some(vec![0]));
    }

    #[test]
    fn test_parse_cpu_list_rejects_garbage() {
        assert_eq!(parse_cpu_list(""), None);
        assert_eq!(parse_cpu_list("a-b"), None);
        assert_eq!(parse_cpu_list("4-2"), None);
    }

    #[test]
    fn test_online_cpus_sorted_and_nonempty() {
        let cpus = online_cpus();
        assert!(!cpus.is_empty());
        assert!(cpus.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(last_online_cpu(), *cpus.last().unwrap());
    }

    fn allowed_cpus() -> Vec<usize> {
        let mask = sched_getaffinity(Pid::from_raw(0)).unwrap();
        (0..CpuSet::count())
            .filter(|&cpu| mask.is_set(cpu).unwrap_or(false))
            .collect()
    }

    #[test]
    fn test_last_online_cpu_ignores_affinity_mask() {
        let unrestricted = last_online_cpu();
        assert!(unrestricted >= *allowed_cpus().last().unwrap());

        // Narrow this thread to its lowest allowed CPU; the answer must not move.
        let restricted = std::thread::spawn(|| {
            let lowest = allowed_cpus()[0];
            let mut only = CpuSet::new();
            only.set(lowest).unwrap();
            sched_setaffinity(Pid::from_raw(0), &only).unwrap();
            assert_eq!(allowed_cpus(), vec![lowest]);
            last_online_cpu()
        })
        .join()
        .unwrap();

        assert_eq!(restricted, unrestricted);
    }
}
