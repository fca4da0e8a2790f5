/// Thread priorities are recorded but not applied on this platform.
pub(super) fn apply(priority: u8) {
    log::trace!("thread priority {priority} is not applied on this platform");
}
