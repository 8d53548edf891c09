//! The builtin-command engine of a small Unix shell.
//!
//! This crate runs the four commands a shell has to implement itself:
//! `cd`, `history`, `exit` and the `mytop` process monitor. The outer shell
//! resolves a typed name to a [`CommandId`] and hands it to a [`Dispatcher`]
//! together with an [`Invocation`] and a [`PlacementMode`], which decides
//! whether the builtin runs inline, in a forked pipeline stage, or in a
//! detached background child.
//!
//! The tokenizer, the pipeline builder and the history writer live in the
//! outer shell. They meet this crate through [`Invocation`], [`PipeWiring`]
//! and a borrowed [`HistoryLog`].

mod builtin;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod history;
pub mod monitor;
pub mod pipe;

pub use builtin::exit_shell;
pub use command::{CommandId, Invocation, Outcome, PlacementMode};
pub use config::MonitorConfig;
pub use dispatch::{Dispatcher, reap_detached};
pub use error::{BuiltinError, DispatchError};
pub use history::HistoryLog;
pub use pipe::{Pipe, PipeWiring};
