//! Process CPU time (user + system), used to report how long a build took.

use std::time::Duration;

/// Measures the CPU time consumed by the process since the timer started.
#[derive(Debug, Clone, Copy)]
pub struct CpuTimer {
    start: Duration,
}

impl CpuTimer {
    pub fn start() -> Self {
        CpuTimer { start: process_cpu_time() }
    }

    pub fn elapsed(&self) -> Duration {
        process_cpu_time().saturating_sub(self.start)
    }
}

/// Gets the total CPU time (user + system) consumed by the current process.
///
/// Returns `Duration::ZERO` if the platform is not supported or an error occurs.
pub fn process_cpu_time() -> Duration {
    #[cfg(unix)]
    {
        let mut usage = std::mem::MaybeUninit::<libc::rusage>::uninit();
        // SAFETY: `usage.as_mut_ptr()` points to writable storage for one `libc::rusage`.
        if unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) } == 0 {
            // SAFETY: `getrusage` returned 0, so `usage` is initialized.
            let usage = unsafe { usage.assume_init() };
            let as_duration = |tv: libc::timeval| Duration::from_secs(tv.tv_sec as u64) + Duration::from_micros(tv.tv_usec as u64);
            as_duration(usage.ru_utime) + as_duration(usage.ru_stime)
        } else {
            log::warn!("Failed to get CPU usage via getrusage.");
            Duration::ZERO
        }
    }
    #[cfg(windows)]
    {
        use std::mem;
        use winapi::shared::minwindef::FILETIME;
        use winapi::um::processthreadsapi::{GetCurrentProcess, GetProcessTimes};

        let mut creation_time = mem::MaybeUninit::<FILETIME>::uninit();
        let mut exit_time = mem::MaybeUninit::<FILETIME>::uninit();
        let mut kernel_time = mem::MaybeUninit::<FILETIME>::uninit();
        let mut user_time = mem::MaybeUninit::<FILETIME>::uninit();

        // SAFETY: the pseudo-handle of the current process is always valid and
        // every out-pointer refers to a live FILETIME.
        let result = unsafe {
            GetProcessTimes(
                GetCurrentProcess(),
                creation_time.as_mut_ptr(),
                exit_time.as_mut_ptr(),
                kernel_time.as_mut_ptr(),
                user_time.as_mut_ptr(),
            )
        };

        if result != 0 {
            // SAFETY: `GetProcessTimes` succeeded, so both times are initialized.
            let (kernel_time, user_time) = unsafe { (kernel_time.assume_init(), user_time.assume_init()) };
            // FILETIME counts 100-nanosecond intervals.
            let intervals = |t: FILETIME| ((t.dwHighDateTime as u64) << 32) | (t.dwLowDateTime as u64);
            Duration::from_nanos((intervals(kernel_time) + intervals(user_time)) * 100)
        } else {
            log::warn!("Failed to get CPU usage via GetProcessTimes.");
            Duration::ZERO
        }
    }
    #[cfg(not(any(unix, windows)))]
    {
        log::warn!("CPU time measurement not supported on this platform.");
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_is_monotonic() {
        let timer = CpuTimer::start();
        let mut acc = 0u64;
        for i in 0..200_000u64 {
            acc = acc.wrapping_mul(31).wrapping_add(i);
        }
        assert!(acc != 1);
        let first = timer.elapsed();
        let second = timer.elapsed();
        assert!(second >= first);
    }
}
