//! CLI argument definitions for the docrest server.

use clap::{Parser, ValueEnum};

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// In-memory storage, lost on shutdown
    Memory,
    /// MongoDB (requires --mongodb-uri)
    Mongodb,
}

/// REST server over JSON document collections
#[derive(Parser, Debug)]
#[command(name = "docrest")]
#[command(about = "Serve document collections over a generic REST interface")]
#[command(version)]
pub struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, env = "DOCREST_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "DOCREST_HOST")]
    pub host: String,

    /// Storage backend to use
    #[arg(short, long, default_value = "memory", env = "DOCREST_BACKEND")]
    pub backend: Backend,

    /// MongoDB connection string (required when backend=mongodb)
    #[arg(long, env = "DOCREST_MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, default_value = "docrest", env = "DOCREST_DATABASE")]
    pub database: String,

    /// Collection to serve; repeat or separate with commas
    #[arg(
        short,
        long = "collection",
        value_delimiter = ',',
        default_value = "items",
        env = "DOCREST_COLLECTIONS"
    )]
    pub collections: Vec<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "docrest=info", env = "DOCREST_LOG")]
    pub log_filter: String,
}
