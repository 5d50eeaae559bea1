//! Pomona CLI - argument parsing and report rendering for the `pomona` binary.

mod config;
mod output;

pub use config::{Command, Config, parse_duration, version_info};
pub use output::{
    render_error, render_health, render_healing_report, render_rotation_pass, render_run_summary,
    render_runs, render_sources,
};
