pub mod alert;
pub mod budget;
pub mod config;
pub mod delimited;
pub mod errors;
pub mod executive;
pub mod logging;
pub mod merge;
pub mod output;
pub mod partitions;
pub mod query;
pub mod record;
pub mod rollup;
pub mod store;
pub mod summarize;
pub mod window;

pub use alert::{AlertEmail, AlertSender, CommandSender, DryRunSender};
pub use budget::{check_targets, compose_email, load_json, BudgetReport};
pub use config::{find_config_file, Config};
pub use errors::{exit_code_for, parse_day, ReportError};
pub use executive::{ReportPass, WindowPartitions};
pub use merge::{run_report, PassSelection};
pub use output::write_report;
pub use partitions::PartitionTable;
pub use query::{Query, QueryBuilder};
pub use record::{CompositeKey, Report, ReportRecord};
pub use rollup::{plan_days, ActivesSegment, RollupSettings, StabilityRollup};
pub use store::{BlobStore, CompressedWriter, LocalBlobStore};
pub use summarize::summarize;
pub use window::{ReportMode, ReportWindow};
