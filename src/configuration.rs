//! Runtime behaviour flags shared by every entry point
//!
//! These flags only change how the tools report what they do; what they do is described by the
//! static [`FleetConfig`](crate::fleet_config::FleetConfig).
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional, and case-insensitive. Set the value to `"true"` to enable a flag.
//!
//! - `FLEET_VERBOSE`: Print progress to stdout and log to stderr (default: `true`)
//! - `FLEET_LOG`: Write logs to a timestamped file instead of stderr (default: `false`)
//! - `FLEET_DEBUG_ENGINE_STDERR`: Let the referee's stderr through (default: `false`)

/// Configuration for runtime behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) debug_engine_stderr: bool,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Progress is printed to stdout.
    /// - Logging to file is disabled.
    /// - Referee stderr is discarded.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            debug_engine_stderr: false,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Any value other than `"true"` (ignoring case) disables the flag; an unset variable keeps
    /// the default.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        Self {
            verbose: get_env_flag("FLEET_VERBOSE", true),
            log: get_env_flag("FLEET_LOG", false),
            debug_engine_stderr: get_env_flag("FLEET_DEBUG_ENGINE_STDERR", false),
        }
    }

    /// Enable or disable progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable referee stderr output (debug purposes only).
    pub fn with_debug_engine_stderr(mut self, value: bool) -> Self {
        self.debug_engine_stderr = value;
        self
    }

    /// Whether progress is printed.
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
