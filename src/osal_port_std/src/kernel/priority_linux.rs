//! Thread priorities through per-thread niceness
use std::os::raw::c_int;

/// The niceness added per kernel priority level.
const NICE_PER_LEVEL: c_int = 2;

/// Apply the kernel priority `priority` (`0` = highest) to the calling
/// thread.
///
/// Level `0` maps to niceness 0 and every lower level adds
/// [`NICE_PER_LEVEL`]. Negative niceness needs privileges, so none is used.
/// Failure is not fatal; the thread just keeps the inherited niceness.
pub(super) fn apply(priority: u8) {
    let nice = c_int::from(priority) * NICE_PER_LEVEL;

    // Linux applies `PRIO_PROCESS` to a single thread when given a TID
    let tid = unsafe { libc::syscall(libc::SYS_gettid) } as libc::id_t;

    if let Err(e) = ok_or_errno(unsafe { libc::setpriority(libc::PRIO_PROCESS, tid, nice) }) {
        log::debug!("setpriority(PRIO_PROCESS, {tid}, {nice}) failed: {e}");
    }
}

fn ok_or_errno(x: c_int) -> Result<c_int, errno::Errno> {
    if x >= 0 {
        Ok(x)
    } else {
        Err(errno::errno())
    }
}
