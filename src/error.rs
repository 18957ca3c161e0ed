//! Typed errors surfaced by the shim's public API.

use thiserror::Error;

use crate::code::InputCode;

#[derive(Debug, Error)]
pub enum ShimError {
    #[error("unknown input name `{0}`")]
    UnknownInput(String),

    #[error("input code {0} is reserved or out of range and cannot be mapped")]
    ReservedCode(InputCode),

    #[error("mouse-move code needs a move binding, edge bindings are for buttons and keys")]
    BindingMismatch,

    #[error("the polling loop is already running")]
    AlreadyRunning,

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
