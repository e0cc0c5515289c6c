// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Console logging macros shared by the library, the CLI and the server.
//!
//! Output goes to stdout/stderr with `colored` highlighting. A process-wide
//! [`Verbosity`] level decides which macros print.

use std::sync::atomic::{AtomicU8, Ordering};

/// How chatty console output should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Verbosity {
    /// Only warnings and errors.
    Quiet = 0,
    /// Info, success and section headers.
    Normal = 1,
    /// Everything, including per-metric progress.
    Verbose = 2,
}

impl Verbosity {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Quiet,
            1 => Self::Normal,
            _ => Self::Verbose,
        }
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(Verbosity::Normal as u8);

/// Set the global verbosity level.
pub fn set_verbosity(level: Verbosity) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Current global verbosity level.
pub fn verbosity() -> Verbosity {
    Verbosity::from_u8(LEVEL.load(Ordering::Relaxed))
}

/// Shorthand for toggling between [`Verbosity::Verbose`] and [`Verbosity::Normal`].
pub fn set_verbose(verbose: bool) {
    set_verbosity(if verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    });
}

/// Check if verbose output is enabled.
pub fn is_verbose() -> bool {
    verbosity() >= Verbosity::Verbose
}

/// Check if normal (non-warning) output is enabled.
pub fn is_enabled() -> bool {
    verbosity() >= Verbosity::Normal
}

/// Macro for standard info messages.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        if $crate::logging::is_enabled() {
            println!("{}", format!($($arg)*));
        }
    }
}

/// Macro for warning messages.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "WARNING ⚠️".yellow().bold(), format!($($arg)*));
    }}
}

/// Macro for error messages.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "Error:".red().bold(), format!($($arg)*));
    }}
}

/// Macro for success messages.
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        if $crate::logging::is_enabled() {
            println!("{} {}", "✅".green(), format!($($arg)*));
        }
    }}
}

/// Macro for verbose messages.
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {
        if $crate::logging::is_verbose() {
            println!("{}", format!($($arg)*));
        }
    }
}

/// Macro for section headers.
#[macro_export]
macro_rules! section {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        if $crate::logging::is_enabled() {
            println!();
            println!("{}", format!($($arg)*).cyan().bold());
        }
    }}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        set_verbosity(Verbosity::Quiet);
        assert!(!is_enabled());
        assert!(!is_verbose());

        set_verbose(true);
        assert!(is_enabled());
        assert!(is_verbose());

        set_verbose(false);
        assert_eq!(verbosity(), Verbosity::Normal);
        assert!(!is_verbose());
    }
}
