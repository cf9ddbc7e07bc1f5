//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

use clinicsync_core::clinic::{Collection, EntityClass};

/// CLI client for the clinicsync data layer.
#[derive(Debug, Parser)]
#[command(name = "clinicsync-client")]
#[command(about = "Cached, optimistic CLI client for the clinicsync API", long_about = None)]
pub struct Cli {
    /// Server base URL.
    #[arg(long, env = "CLINICSYNC_URL", default_value = "http://localhost:3000")]
    pub base_url: String,

    /// Output format.
    #[arg(long, default_value = "pretty")]
    pub format: OutputFormat,

    /// Suppress non-essential output.
    #[arg(long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Raw JSON output.
    Json,
    /// Human-readable output.
    #[default]
    Pretty,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read a list, an entity, or an entity's collection.
    Get {
        /// Entity class (client, therapist, session, ...).
        class: EntityClass,
        /// Entity id. Omit to read the class list.
        id: Option<String>,
        /// Sub-collection of the entity (sessions, consultations, ...).
        collection: Option<Collection>,
        /// Prefetch related data after reading.
        #[arg(long)]
        prefetch: bool,
    },
    /// Apply a JSON merge patch to an entity.
    Update {
        class: EntityClass,
        id: String,
        #[arg(value_parser = parse_json)]
        patch: Value,
    },
    /// Create an entity from a JSON body.
    Create {
        class: EntityClass,
        #[arg(value_parser = parse_json)]
        body: Value,
    },
    /// Delete an entity.
    Delete { class: EntityClass, id: String },
    /// Observe an entity and print it on every background refresh until
    /// Ctrl+C.
    Watch {
        class: EntityClass,
        id: String,
        /// Seconds between printed snapshots.
        #[arg(long, default_value = "5")]
        every: u64,
    },
    /// Show cache statistics.
    Stats,
    /// Drop persisted cache state.
    Clear,
}

/// Parses a command-line JSON argument.
pub fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_update() {
        let cli = Cli::try_parse_from([
            "clinicsync-client",
            "--format",
            "json",
            "update",
            "client",
            "client-42",
            r#"{"progress": 80}"#,
        ])
        .unwrap();

        assert!(matches!(cli.format, OutputFormat::Json));
        match cli.command {
            Commands::Update { class, id, patch } => {
                assert_eq!(class, EntityClass::Client);
                assert_eq!(id, "client-42");
                assert_eq!(patch, json!({"progress": 80}));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_collection_read() {
        let cli =
            Cli::try_parse_from(["clinicsync-client", "get", "client", "42", "sessions"]).unwrap();
        match cli.command {
            Commands::Get {
                class,
                id,
                collection,
                prefetch,
            } => {
                assert_eq!(class, EntityClass::Client);
                assert_eq!(id.as_deref(), Some("42"));
                assert_eq!(collection, Some(Collection::Sessions));
                assert!(!prefetch);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_class_is_rejected() {
        assert!(Cli::try_parse_from(["clinicsync-client", "get", "invoice"]).is_err());
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(parse_json("{progress").is_err());
    }
}
