//! Database models. Re-exported at `crate::db::models`.

pub mod alert;

pub use self::alert::*;
