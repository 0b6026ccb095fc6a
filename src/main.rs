//! Command-line interface for seatoncouch
//!
//! Fills CouchDB databases with documents generated from a template, for
//! load and replication testing.
//!
//! # Usage Examples
//!
//! ```bash
//! # 10000 documents in database "testdb", 4 workers
//! seatoncouch --docs 10000 --threads 4 --doc-tpl default_doc.tpl
//!
//! # 5 databases (load1..load5), bulk writes of 100 docs, 3 revisions and
//! # 2 conflicting leaves per document, with response times
//! seatoncouch --dbs 5 --db-prefix load --bulk-batch 100 \
//!   --revs-per-doc 3 --conflicts-per-doc 2 --times
//!
//! # Recreate the database and apply a security object
//! seatoncouch --recreate-dbs --sec-obj security.json \
//!   --http-basic-username admin --http-basic-password secret
//! ```

use anyhow::Context;
use clap::Parser;
use couch_client::HttpConnector;
use loadtest_populate_couchdb::{
    format_response_time, CouchPopulateArgs, CouchPopulator, PopulateConfig,
};

#[derive(Parser)]
#[command(name = "seatoncouch")]
#[command(about = "Populate CouchDB databases with templated documents for load testing")]
#[command(long_about = None)]
struct Cli {
    #[command(flatten)]
    args: CouchPopulateArgs,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    let config = PopulateConfig::from_args(&cli.args).with_context(|| {
        format!(
            "Invalid configuration (template {:?})",
            cli.args.doc_tpl
        )
    })?;

    tracing::info!(
        "Populating {} database(s) at {} with {} documents each ({} workers, batch size {})",
        config.dbs,
        config.connection.base_url(),
        config.docs,
        config.threads,
        config.bulk_batch
    );

    let times = config.times;
    let connector = HttpConnector::new(config.connection.clone());
    let summary = CouchPopulator::new(config, connector)
        .run()
        .await
        .context("Populate run failed")?;

    let totals = summary.totals();
    tracing::info!(
        "Done: {} database(s), {} document writes, {} attachments, {} conflicts, {} failures, {} reconnects",
        summary.databases.len(),
        totals.doc_writes,
        totals.attachment_writes,
        totals.conflict_writes,
        totals.failures(),
        totals.reconnects
    );

    if times {
        if let Some(avg) = summary.average_document_time {
            tracing::info!(
                "CouchDB's average response time for storing a document: {}",
                format_response_time(avg)
            );
        }
        if let Some(avg) = summary.average_attachment_time {
            tracing::info!(
                "CouchDB's average response time for storing an attachment: {}",
                format_response_time(avg)
            );
        }
    }

    Ok(())
}
