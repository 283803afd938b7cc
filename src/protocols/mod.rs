//! The input protocols that siphon must parse. `logfmt` splits a log line into
//! key/value pairs and `l2met` reads metrics out of those pairs.

pub mod l2met;
pub mod logfmt;
