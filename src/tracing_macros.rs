//! Crate-local logging macros.
//!
//! With the `tracing` feature enabled these forward to [`tracing`]'s macros;
//! without it they compile to nothing, keeping the hot matching loops free of
//! logging overhead by default.

#[cfg(feature = "tracing")]
#[macro_export]
macro_rules! debug {
    ($($tt:tt)*) => { ::tracing::debug!($($tt)*) };
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! debug {
    ($($tt:tt)*) => {};
}

#[cfg(feature = "tracing")]
#[macro_export]
macro_rules! trace {
    ($($tt:tt)*) => { ::tracing::trace!($($tt)*) };
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! trace {
    ($($tt:tt)*) => {};
}
