// Breakpoint resolution library
//
// Resolves source-level breakpoint requests against module debug info:
// - Path matching between requested and recorded source paths
// - Source maps, including entries deduced from relative debug info
// - Line table indexing with a fallback for inconsistent aranges
// - Breakpoint registry: IDs, names, commands, hit counts

pub mod breakpoint;
pub mod debugger;
pub mod error;
pub mod eventloop;
pub mod line_table;
pub mod module;
pub mod path;
pub mod registry;
pub mod resolver;
pub mod settings;
pub mod source_map;
pub mod target;
pub mod types;

pub use breakpoint::{BreakpointAction, BreakpointSpec, CommandSource, ScriptCallback, SymbolPattern};
pub use debugger::{Debugger, TargetHandle};
pub use error::{BkptResult, BreakpointError};
pub use eventloop::{EventLoopHandle, EventReply, StopNotification, TargetEvent};
pub use module::Module;
pub use registry::CreateOptions;
pub use settings::TargetSettings;
pub use source_map::SourceMap;
pub use target::{SharedTarget, Target};
pub use types::{BreakpointId, BreakpointRef, LocationId};
