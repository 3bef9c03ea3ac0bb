//! Debug utils for the peripheral models

// ————————————————————————————— Logging Utils —————————————————————————————— //

/// Log target used for guest protocol violations.
///
/// Accesses to undefined offsets, writes to read-only registers and similar mistakes made by the
/// guest are never fatal, they are reported under this target so that they can be filtered
/// independently of the rest of the logs.
pub const GUEST_ERROR_TARGET: &str = "guest_error";

/// Report a guest protocol violation.
///
/// This macro calls log::warn internally with the [GUEST_ERROR_TARGET] target.
macro_rules! guest_error {
    ($($args:tt)*) => {{
        log::warn!(target: $crate::debug::GUEST_ERROR_TARGET, $($args)*);
    }}
}

/// Emit a warning only once.
///
/// This macro calls log::warn internally and forwards all arguments.
macro_rules! warn_once {
    ($($args:tt)*) => {{
        use core::sync::atomic::{AtomicBool, Ordering};
        static IS_FIRST_WARN: AtomicBool = AtomicBool::new(true);

        if IS_FIRST_WARN.swap(false, Ordering::Relaxed) == true {
            log::warn!($($args)*);
        }
    }}
}

pub(crate) use guest_error;
pub(crate) use warn_once;
