//! Process CPU usage sampling for worker health reports.

use std::time::Instant;

use parking_lot::Mutex;

/// Samples this process's CPU usage between calls.
///
/// Reads cumulative process CPU time from `/proc/self/stat` on Linux;
/// elsewhere usage reports as 0.
pub struct ProcessTimeSampler {
    inner: Mutex<SamplerState>,
}

struct SamplerState {
    last_wall: Instant,
    last_cpu_ticks: u64,
}

impl ProcessTimeSampler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SamplerState {
                last_wall: Instant::now(),
                last_cpu_ticks: read_cpu_ticks().unwrap_or(0),
            }),
        }
    }

    /// CPU usage percent of one core since the previous sample.
    pub fn sample_cpu_usage(&self) -> f64 {
        let Some(cpu_ticks) = read_cpu_ticks() else {
            return 0.0;
        };
        let mut state = self.inner.lock();
        let wall_elapsed = state.last_wall.elapsed().as_secs_f64();
        if wall_elapsed <= 0.0 {
            return 0.0;
        }
        let tick_delta = cpu_ticks.saturating_sub(state.last_cpu_ticks);
        state.last_wall = Instant::now();
        state.last_cpu_ticks = cpu_ticks;

        let cpu_seconds = tick_delta as f64 / clock_ticks_per_second();
        (cpu_seconds / wall_elapsed * 100.0).min(100.0 * num_cpus::get() as f64)
    }
}

impl Default for ProcessTimeSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn read_cpu_ticks() -> Option<u64> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    // Fields 14 (utime) and 15 (stime), counting from 1, after the comm
    // field which may contain spaces inside parentheses.
    let after_comm = stat.rsplit_once(')')?;
    let fields: Vec<&str> = after_comm.1.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_ticks() -> Option<u64> {
    None
}

fn clock_ticks_per_second() -> f64 {
    100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_reports_bounded_usage() {
        let sampler = ProcessTimeSampler::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let usage = sampler.sample_cpu_usage();
        assert!(usage >= 0.0);
        assert!(usage <= 100.0 * num_cpus::get() as f64);
    }
}
