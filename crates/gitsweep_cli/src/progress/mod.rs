//! Progress reporting for sweeps run from the command line.

mod logging;

pub(crate) use logging::LoggingReporter;
