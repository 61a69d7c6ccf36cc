// Error types for breakpoint resolution and management
//
// A breakpoint that matches nothing is not an error: it is created with zero
// locations. Errors here abort the requested operation without mutating state.

use thiserror::Error;

pub type BkptResult<T> = Result<T, BreakpointError>;

#[derive(Debug, Error)]
pub enum BreakpointError {
    #[error("'{0}' is not a currently valid breakpoint ID.")]
    InvalidId(String),

    #[error("No breakpoints carry the name '{0}'.")]
    UnknownName(String),

    #[error("'{0}' is not a valid breakpoint name.")]
    InvalidName(String),

    #[error("A breakpoint action takes either commands or a script callback, not both.")]
    AmbiguousCommandSource,

    #[error("No commands or script callback were supplied.")]
    EmptyCommandSource,

    #[error("Invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("Invalid source map: {0}")]
    InvalidSourceMap(String),

    #[error("Invalid module description: {0}")]
    ModuleFormat(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Module not loaded: {0}")]
    UnknownModule(String),

    #[error("No target with id {0}")]
    UnknownTarget(u32),

    #[error("Target event loop shut down")]
    EventLoopClosed,
}
