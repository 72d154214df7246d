//! Utilities.

/// Runs an expression and returns either the unwrapped result or executes
/// `$or`.
#[macro_export]
macro_rules! some_or {
    ($code:expr, $or:expr) => {
        match $code {
            Some(result) => result,
            None => $or,
        }
    };
}

/// Runs `$code` and returns either the unwrapped result or executes `$or`.
#[macro_export]
macro_rules! ok_or {
    ($code:expr, $or:expr) => {
        match $code {
            Ok(result) => result,
            Err(_) => $or,
        }
    };
}
