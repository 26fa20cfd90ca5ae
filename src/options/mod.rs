//! Typed option definitions and the sets that hold them
//!
//! Options are declared globally by the manifest or per function through script annotations.
//! An [`set::OptionsSet`] enforces name and short-alias uniqueness across every option and
//! select-group value it holds, and coerces defaults to the option's type on insertion.
//! Sorted iteration over a set drives both help output and environment projection.

pub mod flags;
pub mod option;
pub mod set;
