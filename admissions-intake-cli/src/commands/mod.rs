//! CLI command implementations

mod compress;
mod config;
mod ingest;
mod purge;

pub use compress::CompressCommand;
pub use config::ConfigCommand;
pub use ingest::IngestCommand;
pub use purge::PurgeCommand;

use console::Emoji;

pub static SUCCESS: Emoji = Emoji("✓", "√");
pub static INFO: Emoji = Emoji("ℹ", "i");

/// Human-readable byte count
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
