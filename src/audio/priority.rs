// Thread priority elevation for the audio loop
//
// Android maps its urgent-audio thread priority onto nice -19. We ask for the
// same value through setpriority on Linux-like targets. A denial (no
// CAP_SYS_NICE on desktop Linux, SELinux policy on some handsets) is not
// fatal: the loop still runs, just at normal priority.

/// Nice value Android uses for its urgent-audio priority class
pub const URGENT_AUDIO_NICE: i32 = -19;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorityResult {
    Elevated,
    Denied { reason: String },
    Unsupported,
}

/// Raise the calling thread to the urgent-audio priority
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn elevate_current_thread() -> PriorityResult {
    // With PRIO_PROCESS and who = 0, Linux applies the nice value to the
    // calling thread only.
    // SAFETY: setpriority takes no pointers and only affects this thread.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, URGENT_AUDIO_NICE) };
    if rc == 0 {
        PriorityResult::Elevated
    } else {
        PriorityResult::Denied {
            reason: std::io::Error::last_os_error().to_string(),
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn elevate_current_thread() -> PriorityResult {
    PriorityResult::Unsupported
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_never_panics() {
        // Runs on a scratch thread so the test harness thread keeps its nice value
        let result = std::thread::spawn(elevate_current_thread).join().unwrap();
        match result {
            PriorityResult::Elevated | PriorityResult::Unsupported => {}
            PriorityResult::Denied { reason } => assert!(!reason.is_empty()),
        }
    }
}
