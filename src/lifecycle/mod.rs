//! Process lifecycle: shutdown and reload signals

mod reload;
mod shutdown;

pub use reload::{apply_reload, ReloadSignal};
pub use shutdown::ShutdownSignal;
