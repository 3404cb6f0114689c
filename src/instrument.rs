//! Diagnostic instrumentation and the call-sequence contract checker.
//!
//! Logging goes through the `log` facade; the library never installs a
//! backend. Diagnostics are emitted only while instrumentation is enabled,
//! but the specify → analyse → synthesise call-order contract is checked
//! unconditionally: calling the stretcher out of order is a broken
//! integration, and continuing would emit garbage.

/// The three processing stages of a grain, in required call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Specify = 0,
    Analyse = 1,
    Synthesise = 2,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Specify => "specify_grain",
            Stage::Analyse => "analyse_grain",
            Stage::Synthesise => "synthesise_grain",
        }
    }

    fn from_index(index: usize) -> Self {
        match index {
            0 => Stage::Specify,
            1 => Stage::Analyse,
            _ => Stage::Synthesise,
        }
    }
}

/// Per-stretcher diagnostic state.
#[derive(Debug)]
pub struct Instrumentation {
    enabled: bool,
    expected: usize,
    banner_logged: bool,
}

impl Instrumentation {
    pub fn new() -> Self {
        Self {
            enabled: false,
            expected: 0,
            banner_logged: false,
        }
    }

    /// Turns diagnostic logging and the input overlap check on or off.
    /// Idempotent.
    pub fn enable(&mut self, enable: bool) {
        self.enabled = enable;
    }

    /// True while diagnostics are enabled.
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// True when the expensive per-sample checks (input overlap, NaN scan)
    /// should run: instrumentation is on, or this is a debug build.
    #[inline]
    pub fn checks_active(&self) -> bool {
        self.enabled || cfg!(debug_assertions)
    }

    /// Emits one diagnostic line when enabled.
    pub fn log(&self, args: std::fmt::Arguments<'_>) {
        if self.enabled {
            log::debug!("{}", args);
        }
    }

    /// True exactly once, for the first logged grain of the instance.
    pub fn take_banner(&mut self) -> bool {
        !std::mem::replace(&mut self.banner_logged, true)
    }

    /// Verifies that `stage` is the stage the contract expects next.
    /// A violation is fatal: it is logged and the process dies.
    pub fn check_sequence(&mut self, stage: Stage) {
        let called = stage as usize;
        if called != self.expected {
            let expected = Stage::from_index(self.expected);
            log::error!(
                "FATAL: stretcher functions called in the wrong order: {} was called when expecting a call to {}",
                stage.name(),
                expected.name()
            );
            panic!(
                "stretcher functions called in the wrong order: {} was called when expecting {}",
                stage.name(),
                expected.name()
            );
        }
        self.expected = (called + 1) % 3;
    }
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::new()
    }
}
