//!
//! Fatal Error Path
//!
//! Conditions the layer treats as "must not happen" end the process here:
//! a reader unlock with no readers, a semaphore posted past its maximum,
//! an unbounded wait that reports a timeout. Nothing is returned to the
//! caller; the primitive involved is no longer in a usable state.
//!

/// Log the condition and abort the process.
#[cold]
#[inline(never)]
pub fn fatal(context: &str, detail: &str) -> ! {
    tracing::error!(context, detail, "fatal synchronization error");
    eprintln!("tandem: fatal error in {context}: {detail}");
    std::process::abort()
}
