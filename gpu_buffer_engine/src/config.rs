/// Device and buffer engine configuration

use crate::buffer::DEFAULT_BUFFER_SIZE;

/// Which validation messages are displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    /// Errors only
    ErrorsOnly,
    /// Errors and warnings
    ErrorsAndWarnings,
    /// Everything including info and verbose
    All,
}

/// Where validation messages go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOutput {
    /// stderr, colored
    Console,
    /// Append to a file, uncolored
    File(String),
    /// Both of the above
    Both(String),
}

/// Validation message category filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: true,
            show_validation: true,
            show_performance: true,
        }
    }
}

/// Counters of validation messages seen since device creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    /// Sum of all counters
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }

    /// True when at least one validation error was reported
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

/// Device configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name reported to the driver
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),

    /// Enable validation/debug layers
    pub enable_validation: bool,
    /// Validation message severity filter
    pub debug_severity: DebugSeverity,
    /// Validation message destination
    pub debug_output: DebugOutput,
    /// Validation message category filter
    pub debug_message_filter: DebugMessageFilter,
    /// Abort the process on the first validation error (debugger attach)
    pub break_on_validation_error: bool,
    /// Panic on the first validation error (strict test mode)
    pub panic_on_error: bool,
    /// Count validation messages (see `ValidationStats`)
    pub enable_validation_stats: bool,

    /// Capacity in bytes of a buffer created before its first upload
    pub default_buffer_size: u64,
    /// Report allocations still alive when the device is destroyed
    pub allocator_leak_check: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "GPU Buffer Engine Application".to_string(),
            app_version: (1, 0, 0),
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            debug_output: DebugOutput::Console,
            debug_message_filter: DebugMessageFilter::default(),
            break_on_validation_error: false,
            panic_on_error: false,
            enable_validation_stats: true,
            default_buffer_size: DEFAULT_BUFFER_SIZE,
            allocator_leak_check: cfg!(debug_assertions),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
