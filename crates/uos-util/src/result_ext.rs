use std::fmt::Display;

/// Fold an error into a `String` carrying variant of another error type
///
/// ```rust
/// use uos_util::result_ext::ResultExt as _;
///
/// #[derive(Debug, thiserror::Error)]
/// enum FrameError {
///     #[error("bad genesis hash: {0}")]
///     Genesis(String),
/// }
///
/// let result: Result<Vec<u8>, FrameError> = uos_util::decode_hex("0xzz").map_err_str(FrameError::Genesis);
/// assert!(matches!(result, Err(FrameError::Genesis(_))));
/// ```
pub trait ResultExt<T, E> {
    fn map_err_str<F, G>(self, f: G) -> Result<T, F>
    where
        E: Display,
        G: FnOnce(String) -> F;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn map_err_str<F, G>(self, f: G) -> Result<T, F>
    where
        E: Display,
        G: FnOnce(String) -> F,
    {
        self.map_err(|error| f(error.to_string()))
    }
}
