//! sim-deck daemon library
//!
//! Turns button presses from a touch device into keyboard input on the host:
//!
//! - [`keys`] resolves symbolic tokens (`"lctrl"`, `"f5"`, `"q"`) to keys
//! - [`combo`] presses a combo in order and releases it in reverse
//! - [`macro_runner`] plays timed combo sequences on background tasks
//! - [`gateway`] dispatches `{id}`, `{combo}` and `{macro}` requests
//! - [`server`] exposes the gateway over HTTP
//! - [`injector`] holds the keyboard backends

pub mod catalog;
pub mod clock;
pub mod combo;
pub mod gateway;
pub mod injector;
pub mod keys;
pub mod macro_runner;
pub mod server;
