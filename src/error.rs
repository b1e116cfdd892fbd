//! Rich diagnostic error types for the wikibridge engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives, providing error codes, help text, and source chains. The
//! knowledge-base client error lives with the client in [`crate::kb`].

use miette::Diagnostic;
use thiserror::Error;

use crate::kb::KbError;

/// Top-level error type for wikibridge.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum BridgeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kb(#[from] KbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience alias for functions returning wikibridge results.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

// ---------------------------------------------------------------------------
// Table errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TableError {
    #[error("failed to read table {path}: {source}")]
    #[diagnostic(
        code(bridge::tables::read),
        help(
            "Check that the CSV file exists, is readable, and carries the \
             expected header row (node tables need `id:ID`, edge tables \
             `:START_ID`/`:TYPE`/`:END_ID`)."
        )
    )]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write table {path}: {source}")]
    #[diagnostic(
        code(bridge::tables::write),
        help("Check that the output directory exists and is writable.")
    )]
    Write {
        path: String,
        #[source]
        source: csv::Error,
    },
}

pub type TableResult<T> = std::result::Result<T, TableError>;

// ---------------------------------------------------------------------------
// Synchronizer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("bootstrap property not visible after {attempts} poll attempts: {uri}")]
    #[diagnostic(
        code(bridge::sync::bootstrap_timeout),
        help(
            "The query endpoint has not indexed the newly created \
             cross-reference property. The index may be lagging badly or the \
             updater may be down — check the query service, then re-run. \
             The wait is tunable via `bootstrap_max_attempts` and \
             `bootstrap_delay_secs` in the config file."
        )
    )]
    BootstrapTimeout { uri: String, attempts: u32 },

    #[error("equivalent-property discovery returned no bindings")]
    #[diagnostic(
        code(bridge::sync::no_equivalent_property),
        help(
            "The store must be seeded with an `equivalent property` property \
             whose own equivalent-property claim points at \
             http://www.w3.org/2002/07/owl#equivalentProperty. This is part \
             of the initial wikibase setup, not something wikibridge creates."
        )
    )]
    NoEquivalentProperty,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kb(#[from] KbError),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    #[error("required property missing from the store: {uri}")]
    #[diagnostic(
        code(bridge::export::missing_property),
        help(
            "Export needs the bootstrap properties (cross-reference, type, \
             reference uri, reference supporting text) to already exist. \
             Run an import against this store first."
        )
    )]
    MissingProperty { uri: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kb(#[from] KbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Table(#[from] TableError),
}

pub type ExportResult<T> = std::result::Result<T, ExportError>;

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    #[diagnostic(
        code(bridge::config::read),
        help("Check the path passed via --config.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    #[diagnostic(
        code(bridge::config::parse),
        help("The config file must be valid TOML. See config.example.toml.")
    )]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required config value: {field}")]
    #[diagnostic(
        code(bridge::config::missing),
        help("Set `{field}` in the config file or pass the matching CLI flag.")
    )]
    Missing { field: &'static str },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
