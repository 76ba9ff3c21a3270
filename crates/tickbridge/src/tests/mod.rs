//! Test suites for the command server.

mod support;
