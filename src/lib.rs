pub mod config;
pub mod guard;
pub mod page;
pub mod status;
pub mod supervisor;
pub mod timers;

pub use config::{Config, ConfigError, ConfigStore, JsonFileStore, MemoryStore};
pub use guard::RapidActionGuard;
pub use page::{Control, Feed, InputState, Page, PageError, PageSnapshot};
pub use status::{Mode, StatusSink, StatusView};
pub use supervisor::{Handles, Supervisor, UserIntent};
pub use timers::{TimerKind, Timers};
