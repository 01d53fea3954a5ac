//! Program representation analyzed by the `fxcore` deduction engine.
//!
//! The crate models a small SSA instruction IR: modules own functions,
//! functions own basic blocks, and blocks own instructions plus a control
//! flow terminator. Functions, call instructions, and external function
//! declarations all carry persisted attribute lists; these are both the
//! ground truth a deduction run starts from and the place deduced facts are
//! written back to.

pub mod attrs;
pub mod modules;
pub mod types;
pub mod utils;
