//! Siphon aggregates l2met metrics out of logfmt log streams. Applications
//! write lines like `measure#db.query=12ms host=a` to their logs; siphon reads
//! those logs, rolls the metrics up into fixed time windows and ships each
//! window once it has closed.
//!
//! The moving parts, in the order data flows through them:
//!
//!  * `protocols::l2met::Parser` turns a line into bucket fragments.
//!  * `source::Pipeline` reads input, parses on a worker thread and sheds
//!    load rather than block the writer.
//!  * `store::Store` merges fragments by window and key.
//!  * `app::Scheduler` sweeps closed windows into a `sink::Sink`.
#![allow(unknown_lints)]
#![warn(missing_docs)]
#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]
extern crate chrono;
extern crate clap;
extern crate seahash;
#[cfg_attr(test, macro_use)]
extern crate serde_json;
extern crate toml;
extern crate url;

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

pub mod app;
pub mod config;
pub mod metric;
pub mod protocols;
pub mod sink;
pub mod source;
pub mod store;
pub mod time;
