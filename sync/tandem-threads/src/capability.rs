//!
//! Capability Probe
//!
//! Decides, once per process, whether the fast native reader/writer lock and
//! condition variable can be used or whether the emulated fallbacks must
//! stand in for them. The lock and condvar facades read the cached answer;
//! nothing is re-probed per call.
//!
//! On Linux the fast primitives sit on futexes, so the probe issues a
//! harmless `FUTEX_WAKE` on a private word: `ENOSYS` means the kernel lacks
//! them. Other targets report them present. The configured
//! `StrategyOverride` is applied on top of the probe.
//!

use tandem_core::StrategyOverride;
use tracing::debug;

use crate::once::OnceValue;
use crate::runtime;

/// Which implementation a facade routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Native,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub native_rwlock: bool,
    pub native_condvar: bool,
}

impl Capabilities {
    /// Ask the OS. Prefer `capabilities()`, which probes only once.
    pub fn probe() -> Self {
        let fast = fast_primitives_available();
        Self {
            native_rwlock: fast,
            native_condvar: fast,
        }
    }

    pub fn with_override(self, mode: StrategyOverride) -> Self {
        match mode {
            StrategyOverride::Auto => self,
            StrategyOverride::Native => Self {
                native_rwlock: true,
                native_condvar: true,
            },
            StrategyOverride::Fallback => Self {
                native_rwlock: false,
                native_condvar: false,
            },
        }
    }

    pub fn rwlock_strategy(&self) -> Strategy {
        if self.native_rwlock {
            Strategy::Native
        } else {
            Strategy::Fallback
        }
    }

    pub fn condvar_strategy(&self) -> Strategy {
        if self.native_condvar {
            Strategy::Native
        } else {
            Strategy::Fallback
        }
    }
}

static CAPABILITIES: OnceValue<Capabilities> = OnceValue::new();

/// The process-wide capabilities, probed on first call.
pub fn capabilities() -> Capabilities {
    *CAPABILITIES.get_or_init(|| {
        let probed = Capabilities::probe();
        let mode = runtime::config().strategy.mode;
        let caps = probed.with_override(mode);
        debug!(?probed, ?mode, ?caps, "capability probe complete");
        caps
    })
}

#[cfg(target_os = "linux")]
fn fast_primitives_available() -> bool {
    let word: u32 = 0;
    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            &word as *const u32,
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            0,
        )
    };
    if rc >= 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() != Some(libc::ENOSYS)
}

#[cfg(not(target_os = "linux"))]
fn fast_primitives_available() -> bool {
    true
}
