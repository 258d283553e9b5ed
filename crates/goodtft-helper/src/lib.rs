// lib.rs: the installer steps as a library so integration tests in tests/
// can drive them as `goodtft_helper::module::Type` against a temp root.
//
// main.rs only parses the command line and wires the system runner and the
// terminal prompter into `installer::run`.

pub mod bootconfig;
pub mod context;
pub mod drivers;
pub mod edit;
pub mod env;
pub mod error;
pub mod finalize;
pub mod installer;
pub mod mirror;
pub mod packages;
pub mod prompt;
pub mod select;
pub mod shell;
pub mod touch;
