//! CLI Module
//!
//! Provides command-line interface functionality including:
//! - Exit codes for automation
//! - Text or JSON reporting of link statistics

pub mod exit_codes;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};

use crate::core::link::LinkStats;

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Text,
    /// One JSON object
    Json,
}

/// Render link statistics
pub fn format_stats(stats: &LinkStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => stats.to_string(),
        OutputFormat::Json => serde_json::to_string_pretty(stats)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
    }
}
