//! CLI argument definitions for the CouchDB populator.

use clap::Args;
use std::path::PathBuf;

/// Connection settings for the target server.
#[derive(Args, Clone, Debug)]
pub struct CouchConnectionArgs {
    /// CouchDB host
    #[arg(long, env = "COUCH_HOST", default_value = "localhost")]
    pub host: String,

    /// CouchDB port
    #[arg(long, env = "COUCH_PORT", default_value = "5984")]
    pub port: u16,

    /// Username for HTTP basic authentication
    #[arg(long, env = "COUCH_USERNAME")]
    pub http_basic_username: Option<String>,

    /// Password for HTTP basic authentication
    #[arg(long, env = "COUCH_PASSWORD")]
    pub http_basic_password: Option<String>,

    /// Timeout for a single HTTP request, in seconds
    #[arg(long, default_value = "60")]
    pub request_timeout_secs: u64,
}

/// CouchDB populate arguments.
#[derive(Args, Clone, Debug)]
pub struct CouchPopulateArgs {
    #[command(flatten)]
    pub connection: CouchConnectionArgs,

    /// Number of databases to create
    #[arg(long, default_value = "1")]
    pub dbs: u64,

    /// Number appended to the prefix of the first database (when --dbs > 1)
    #[arg(long, default_value = "1")]
    pub db_start_id: u64,

    /// Database name prefix; with a single database this is the full name
    #[arg(long, default_value = "testdb")]
    pub db_prefix: String,

    /// Number of documents to create per database
    #[arg(long, default_value = "100")]
    pub docs: u64,

    /// Value of #{doc_id_counter} for the first document
    #[arg(long, default_value = "1")]
    pub doc_start_id: u64,

    /// Value of #{user_prefix}
    #[arg(long, default_value = "user")]
    pub user_prefix: String,

    /// Documents per _bulk_docs request; 1 writes each document on its own
    #[arg(long, default_value = "1")]
    pub bulk_batch: usize,

    /// Number of revisions to write for each document
    #[arg(long, default_value = "1")]
    pub revs_per_doc: u32,

    /// Number of conflicting revisions to add to each document (needs --bulk-batch > 1)
    #[arg(long, default_value = "0")]
    pub conflicts_per_doc: u32,

    /// Number of parallel upload workers
    #[arg(long, default_value = "1")]
    pub threads: usize,

    /// Document template file
    #[arg(long, default_value = "default_doc.tpl")]
    pub doc_tpl: PathBuf,

    /// JSON file holding the security object to set on every database
    #[arg(long)]
    pub sec_obj: Option<PathBuf>,

    /// Delete each database before creating it
    #[arg(long)]
    pub recreate_dbs: bool,

    /// Report the response time of every write and the averages at the end
    #[arg(long)]
    pub times: bool,
}
