//! Logging shim around `defmt`.
//!
//! With the `defmt` feature enabled the macro forwards to the matching
//! `defmt` level; without it it compiles to nothing, so release builds of
//! the scheduler carry no logging overhead.

macro_rules! trace {
    ($($arg:tt)*) => {
        crate::fmt::__log!(trace, $($arg)*)
    };
}

#[cfg(feature = "defmt")]
macro_rules! __log {
    ($level:ident, $($arg:tt)*) => {
        defmt::$level!($($arg)*)
    };
}

#[cfg(not(feature = "defmt"))]
macro_rules! __log {
    ($level:ident, $($arg:tt)*) => {{}};
}

pub(crate) use {__log, trace};
