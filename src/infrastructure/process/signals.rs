//! Signal delivery to supervised process groups.

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

fn to_pid(pid: u32) -> Option<Pid> {
    // pid 0 would address our own process group
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Some(Pid::from_raw(raw)),
        _ => None,
    }
}

/// Send `signal` to the process group led by `pid`, falling back to the
/// single process when it does not lead a group.
///
/// Returns `false` when nothing was signalled (already gone or invalid pid).
pub fn signal_process_group(pid: u32, signal: Signal) -> bool {
    let Some(target) = to_pid(pid) else {
        warn!(pid, "Refusing to signal invalid pid");
        return false;
    };

    match killpg(target, signal) {
        Ok(()) => {
            debug!(pid, signal = %signal, "Signalled process group");
            true
        }
        Err(Errno::ESRCH) => match kill(target, signal) {
            Ok(()) => {
                debug!(pid, signal = %signal, "Signalled process");
                true
            }
            Err(Errno::ESRCH) => false,
            Err(e) => {
                warn!(pid, signal = %signal, error = %e, "Failed to signal process");
                false
            }
        },
        Err(e) => {
            warn!(pid, signal = %signal, error = %e, "Failed to signal process group");
            false
        }
    }
}

/// Send `signal` to exactly one process.
pub fn signal_process(pid: u32, signal: Signal) -> bool {
    to_pid(pid).is_some_and(|target| kill(target, signal).is_ok())
}

/// The fields of `/proc/<pid>/stat` the supervisor cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProcStat {
    pub state: char,
    pub pgid: u32,
}

impl ProcStat {
    pub fn is_zombie(self) -> bool {
        self.state == 'Z'
    }
}

pub(crate) fn parse_stat(stat: &str) -> Option<ProcStat> {
    // The command name may contain spaces; state, ppid and pgrp follow its closing paren
    let mut fields = stat[stat.rfind(')')? + 1..].split_whitespace();
    let state = fields.next()?.chars().next()?;
    let pgid = fields.nth(1)?.parse().ok()?;
    Some(ProcStat { state, pgid })
}

/// Whether any non-zombie process is still in the group `pgid`.
///
/// The group outlives its leader: descendants that ignored SIGTERM keep
/// it alive after the leader has been reaped.
pub fn group_is_running(pgid: u32) -> bool {
    let Some(target) = to_pid(pgid) else {
        return false;
    };
    let Ok(entries) = std::fs::read_dir("/proc") else {
        // Without procfs, exited-but-unreaped members count as running
        return matches!(killpg(target, None), Ok(()) | Err(Errno::EPERM));
    };

    entries
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_str().is_some_and(|n| n.parse::<u32>().is_ok()))
        .filter_map(|e| std::fs::read_to_string(e.path().join("stat")).ok())
        .filter_map(|stat| parse_stat(&stat))
        .any(|stat| stat.pgid == pgid && !stat.is_zombie())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pids_are_never_signalled() {
        assert!(!signal_process_group(0, Signal::SIGTERM));
        assert!(!signal_process(0, Signal::SIGTERM));
    }

    #[test]
    fn test_parse_stat_with_spaces_in_name() {
        let stat = parse_stat("4944 (sleep (x) 30) S 1 4940 4940 0 -1").unwrap();
        assert_eq!(stat, ProcStat { state: 'S', pgid: 4940 });
        assert!(parse_stat("4944 (sleep) Z 1 4940").unwrap().is_zombie());
        assert!(parse_stat("garbage").is_none());
    }

    #[test]
    fn test_empty_group_is_not_running() {
        assert!(!group_is_running(0));
        assert!(!group_is_running(u32::MAX));
    }

    #[test]
    fn test_own_group_is_running() {
        let own = nix::unistd::getpgrp().as_raw();
        assert!(group_is_running(u32::try_from(own).unwrap()));
    }
}
