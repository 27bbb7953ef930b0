use std::time::Duration;

/// Block for `duration` using the most precise mechanism the platform
/// offers. Plain `thread::sleep` quantizes to the scheduler tick, which
/// is too coarse for the pre/post-stimulus settling waits.
pub fn precise_sleep(duration: Duration) {
    #[cfg(target_os = "linux")]
    linux_sleep(duration);
    #[cfg(target_os = "windows")]
    windows_sleep(duration);
    #[cfg(target_os = "macos")]
    macos_sleep(duration);
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    std::thread::sleep(duration);
}

#[cfg(target_os = "linux")]
fn linux_sleep(duration: Duration) {
    let request = libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };
    // Remaining time on EINTR is not re-queued; the frame loop re-checks
    // its countdown on wake anyway.
    unsafe {
        libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &request, std::ptr::null_mut());
    }
}

#[cfg(target_os = "windows")]
fn windows_sleep(duration: Duration) {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{
        CreateWaitableTimerW, SetWaitableTimer, WaitForSingleObject,
    };

    unsafe {
        let Ok(timer) = CreateWaitableTimerW(None, true, None) else {
            std::thread::sleep(duration);
            return;
        };

        // Negative due time means relative, in 100 ns intervals.
        let due_time = -(duration.as_nanos() as i64 / 100);

        if SetWaitableTimer(timer, &due_time, 0, None, None, false).is_ok() {
            WaitForSingleObject(timer, u32::MAX);
        } else {
            std::thread::sleep(duration);
        }

        let _ = CloseHandle(timer);
    }
}

#[cfg(target_os = "macos")]
fn macos_sleep(duration: Duration) {
    use mach2::mach_time::{mach_absolute_time, mach_timebase_info, mach_timebase_info_data_t};

    // Waits shorter than this are finer than the scheduler honors; spin
    // on the mach timebase instead of sleeping.
    const SPIN_LIMIT: Duration = Duration::from_micros(100);
    if duration >= SPIN_LIMIT {
        std::thread::sleep(duration);
        return;
    }

    let mut timebase = mach_timebase_info_data_t { numer: 0, denom: 0 };
    unsafe {
        mach_timebase_info(&mut timebase);
        let ticks =
            duration.as_nanos() as u64 * u64::from(timebase.denom) / u64::from(timebase.numer);
        let deadline = mach_absolute_time() + ticks;
        while mach_absolute_time() < deadline {
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn sleeps_at_least_the_requested_duration() {
        let start = Instant::now();
        precise_sleep(Duration::from_millis(10));
        assert!(start.elapsed() >= Duration::from_millis(9));
    }
}
