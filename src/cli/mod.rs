pub mod collect_cmd;
pub mod config_cmd;
pub mod output;
pub mod renderer;
pub mod snapshot_cmd;
