// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Environment variable overriding the audio thread priority (0-99).
pub const THREAD_PRIORITY_ENV: &str = "SOFTSYNTH_THREAD_PRIORITY";

/// Environment variable that disables SCHED_FIFO for audio threads when set.
pub const DISABLE_RT_AUDIO_ENV: &str = "SOFTSYNTH_DISABLE_RT_AUDIO";

/// Audio threads run at the top of the cross-platform range unless told otherwise.
const DEFAULT_AUDIO_THREAD_PRIORITY: u8 = 99;

/// Reads SOFTSYNTH_THREAD_PRIORITY once, falling back to the highest priority.
pub fn audio_thread_priority() -> ThreadPriority {
    std::env::var(THREAD_PRIORITY_ENV)
        .ok()
        .and_then(|v| parse_priority(&v))
        .map(ThreadPriority::Crossplatform)
        .unwrap_or_else(|| {
            ThreadPriorityValue::try_from(DEFAULT_AUDIO_THREAD_PRIORITY)
                .map(ThreadPriority::Crossplatform)
                .unwrap_or(ThreadPriority::Max)
        })
}

fn parse_priority(value: &str) -> Option<ThreadPriorityValue> {
    let n = value.trim().parse::<u8>().ok()?;
    if n >= 100 {
        return None;
    }
    ThreadPriorityValue::try_from(n).ok()
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for audio threads.
/// Enabled unless SOFTSYNTH_DISABLE_RT_AUDIO is set.
pub fn rt_audio_enabled() -> bool {
    !env_flag(DISABLE_RT_AUDIO_ENV)
}

/// Raises the calling thread's priority, once. Failures are logged and otherwise ignored:
/// audio still plays at normal priority, just with a higher risk of dropouts.
pub fn configure_audio_thread_priority(
    priority: ThreadPriority,
    rt_audio: bool,
    priority_set: &mut bool,
) {
    if *priority_set {
        return;
    }
    if let Err(e) = set_current_thread_priority(priority) {
        warn!(error = ?e, "Failed to raise audio thread priority");
    }

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            priority,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for audio thread");
            }
            Err(e) => {
                warn!(error = %e, "Failed to set RT SCHED_FIFO for audio thread");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;

    *priority_set = true;
}
