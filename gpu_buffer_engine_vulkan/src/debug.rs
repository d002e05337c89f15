/// Validation layer messages: filtering, colored console / file output and
/// per-severity counters

use ash::vk;
use colored::*;
use gpu_buffer_engine::gpubuf::{DebugMessageFilter, DebugOutput, DebugSeverity, ValidationStats};
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Active configuration, `None` outside the lifetime of a validating device
static VALIDATION_CONFIG: Mutex<Option<ValidationConfig>> = Mutex::new(None);

static VALIDATION_STATS: StatsCounters = StatsCounters::new();

/// Occurrences of each message text since the last `init_validation`
static SEEN_MESSAGES: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Callback settings copied out of the device `Config`
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub severity: DebugSeverity,
    pub output: DebugOutput,
    pub message_filter: DebugMessageFilter,
    pub break_on_error: bool,
    pub panic_on_error: bool,
    pub enable_stats: bool,
}

/// Severity of one validation message, most severe bit wins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageLevel {
    Error,
    Warning,
    Info,
    Verbose,
}

impl MessageLevel {
    pub(crate) fn from_vk(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            MessageLevel::Error
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            MessageLevel::Warning
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            MessageLevel::Info
        } else {
            MessageLevel::Verbose
        }
    }

    fn label(self) -> &'static str {
        match self {
            MessageLevel::Error => "ERROR",
            MessageLevel::Warning => "WARNING",
            MessageLevel::Info => "INFO",
            MessageLevel::Verbose => "VERBOSE",
        }
    }

    fn colored_label(self) -> ColoredString {
        match self {
            MessageLevel::Error => self.label().red().bold(),
            MessageLevel::Warning => self.label().yellow().bold(),
            MessageLevel::Info => self.label().cyan(),
            MessageLevel::Verbose => self.label().bright_black(),
        }
    }
}

/// Message category, validation first when several bits are set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageCategory {
    Validation,
    Performance,
    General,
}

impl MessageCategory {
    pub(crate) fn from_vk(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
            MessageCategory::Validation
        } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
            MessageCategory::Performance
        } else {
            MessageCategory::General
        }
    }

    fn label(self) -> &'static str {
        match self {
            MessageCategory::Validation => "Validation",
            MessageCategory::Performance => "Performance",
            MessageCategory::General => "General",
        }
    }
}

struct StatsCounters {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl StatsCounters {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn record(&self, level: MessageLevel) {
        let counter = match level {
            MessageLevel::Error => &self.errors,
            MessageLevel::Warning => &self.warnings,
            MessageLevel::Info => &self.info,
            MessageLevel::Verbose => &self.verbose,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [&self.errors, &self.warnings, &self.info, &self.verbose] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

// A panic inside the callback (panic_on_error) can poison these locks; the
// data behind them stays usable.
fn lock<T>(mutex: &'static Mutex<T>) -> MutexGuard<'static, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install the callback configuration and reset counters
pub fn init_validation(config: ValidationConfig) {
    VALIDATION_STATS.reset();
    *lock(&SEEN_MESSAGES) = Some(FxHashMap::default());
    *lock(&VALIDATION_CONFIG) = Some(config);
}

/// Stop handling messages (called before the messenger is destroyed)
pub fn shutdown_validation() {
    *lock(&VALIDATION_CONFIG) = None;
}

/// Counters of validation messages seen since the device was created
pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.snapshot()
}

/// Print a colored summary of `get_validation_stats` to stdout
pub fn print_validation_stats_report() {
    let stats = get_validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics ===".bright_blue().bold());
    let rows = [
        ("Errors:".red().bold(), stats.errors),
        ("Warnings:".yellow().bold(), stats.warnings),
        ("Info:".cyan(), stats.info),
        ("Verbose:".bright_black(), stats.verbose),
    ];
    for (label, count) in rows.into_iter().filter(|(_, count)| *count > 0) {
        println!("  {} {}", label, count);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());

    if let Some(seen) = lock(&SEEN_MESSAGES).as_ref() {
        let repeated = seen.values().filter(|&&count| count > 1).count();
        if repeated > 0 {
            println!("\n  {} message(s) appeared more than once", repeated);
        }
    }
    println!("{}\n", "=============================".bright_blue().bold());
}

/// Severity flags to request from the messenger for a given display filter
pub(crate) fn messenger_severity(severity: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    match severity {
        DebugSeverity::ErrorsOnly => S::ERROR,
        DebugSeverity::ErrorsAndWarnings => S::ERROR | S::WARNING,
        DebugSeverity::All => S::ERROR | S::WARNING | S::INFO | S::VERBOSE,
    }
}

/// Whether a message passes the severity and category filters
pub(crate) fn should_display(
    config: &ValidationConfig,
    level: MessageLevel,
    category: MessageCategory,
) -> bool {
    let severity_ok = match config.severity {
        DebugSeverity::ErrorsOnly => level == MessageLevel::Error,
        DebugSeverity::ErrorsAndWarnings => {
            matches!(level, MessageLevel::Error | MessageLevel::Warning)
        }
        DebugSeverity::All => true,
    };
    let category_ok = match category {
        MessageCategory::Validation => config.message_filter.show_validation,
        MessageCategory::Performance => config.message_filter.show_performance,
        MessageCategory::General => config.message_filter.show_general,
    };
    severity_ok && category_ok
}

/// Uncolored rendering used for file output
pub(crate) fn format_plain(
    level: MessageLevel,
    category: MessageCategory,
    occurrences: u32,
    message_id: &str,
    message: &str,
) -> String {
    format!(
        "[VULKAN {}] [{}]{}\n  ├─ Message ID: {}\n  └─ {}\n",
        level.label(),
        category.label(),
        repeat_suffix(occurrences),
        message_id,
        message
    )
}

fn format_colored(
    level: MessageLevel,
    category: MessageCategory,
    occurrences: u32,
    message_id: &str,
    message: &str,
) -> String {
    format!(
        "{} {}{} [{}]{}\n  ├─ {}: {}\n  └─ {}\n",
        "[VULKAN".bright_blue().bold(),
        level.colored_label(),
        "]".bright_blue().bold(),
        category.label().bright_black(),
        repeat_suffix(occurrences).yellow(),
        "Message ID".bright_black(),
        message_id.white(),
        message.white()
    )
}

fn repeat_suffix(occurrences: u32) -> String {
    if occurrences > 1 {
        format!(" [x{}]", occurrences)
    } else {
        String::new()
    }
}

fn track(message: &str) -> u32 {
    let mut seen = lock(&SEEN_MESSAGES);
    let count = seen
        .get_or_insert_with(FxHashMap::default)
        .entry(message.to_string())
        .or_insert(0);
    *count += 1;
    *count
}

fn append_to_file(path: &str, text: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", text);
    }
}

unsafe fn c_str_or<'a>(ptr: *const std::os::raw::c_char, fallback: &'a str) -> std::borrow::Cow<'a, str> {
    if ptr.is_null() {
        std::borrow::Cow::Borrowed(fallback)
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}

/// Debug messenger callback registered when validation is enabled
///
/// # Safety
///
/// Called by the Vulkan loader with a valid callback data pointer.
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let Some(config) = lock(&VALIDATION_CONFIG).clone() else {
        return vk::FALSE;
    };
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = &*p_callback_data;
    let message_id = c_str_or(callback_data.p_message_id_name, "Unknown");
    let message = c_str_or(callback_data.p_message, "No message");

    let level = MessageLevel::from_vk(message_severity);
    let category = MessageCategory::from_vk(message_type);
    if !should_display(&config, level, category) {
        return vk::FALSE;
    }

    let occurrences = if config.enable_stats {
        VALIDATION_STATS.record(level);
        track(&message)
    } else {
        1
    };

    match &config.output {
        DebugOutput::Console => {
            eprint!("{}", format_colored(level, category, occurrences, &message_id, &message));
        }
        DebugOutput::File(path) => {
            append_to_file(path, &format_plain(level, category, occurrences, &message_id, &message));
        }
        DebugOutput::Both(path) => {
            eprint!("{}", format_colored(level, category, occurrences, &message_id, &message));
            append_to_file(path, &format_plain(level, category, occurrences, &message_id, &message));
        }
    }

    if level == MessageLevel::Error {
        if config.panic_on_error {
            panic!(
                "validation error (panic_on_error)\nMessage ID: {}\nType: {}\nMessage: {}",
                message_id,
                category.label(),
                message
            );
        }
        if config.break_on_error {
            eprintln!(
                "\n{}\n  Context: {} [{}]\n  Message: {}\n",
                "BREAK ON VALIDATION ERROR - aborting".red().bold(),
                message_id.yellow(),
                category.label().cyan(),
                message.white()
            );
            std::process::abort();
        }
    }

    vk::FALSE
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
