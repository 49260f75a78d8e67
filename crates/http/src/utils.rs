//! Internal helper macros.

/// Returns early with `$error` when `$predicate` does not hold.
///
/// ```ignore
/// ensure!(headers.len() < MAX_HEADERS, ParseError::TooManyHeaders);
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
