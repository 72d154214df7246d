//! Kernel console output. Compiled to nothing unless the `debug_verbose`
//! feature is enabled.

/// Prints a kernel trace line to stderr under `debug_verbose`.
#[macro_export]
macro_rules! kprintln {
    ($($arg:tt)*) => {
        if cfg!(feature = "debug_verbose") {
            eprintln!($($arg)*);
        }
    };
}
