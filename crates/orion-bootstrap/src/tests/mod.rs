//! Test suites for the startup sequence.

mod behaviour;
mod support;
