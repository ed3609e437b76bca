/*!
 * Monitoring
 * Tracing subscriber setup for the crate's structured events
 */

mod tracer;

pub use tracer::{init_test_tracing, init_tracing, TRACE_JSON_ENV};
