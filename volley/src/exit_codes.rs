#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed.
    ThresholdsFailed = 10,

    /// Setup failed before any load was generated (e.g. the initial token fetch).
    SetupFailed = 20,

    /// Invalid CLI/config (bad flags, unknown scenario, invalid threshold syntax, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, worker panics).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
