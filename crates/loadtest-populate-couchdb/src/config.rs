//! Validated, immutable run configuration.

use crate::args::CouchPopulateArgs;
use crate::error::PopulateError;
use couch_client::ConnectionConfig;
use couch_template::{AttachmentMode, DocumentTemplate, GenerationContext};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Everything a run needs, checked once and then shared read-only by every
/// worker.
#[derive(Debug, Clone)]
pub struct PopulateConfig {
    pub connection: ConnectionConfig,
    pub dbs: u64,
    pub db_start_id: u64,
    pub db_prefix: String,
    pub docs: u64,
    pub doc_start_id: u64,
    pub user_prefix: String,
    pub bulk_batch: usize,
    pub revs_per_doc: u32,
    pub conflicts_per_doc: u32,
    pub threads: usize,
    pub template: DocumentTemplate,
    pub security: Option<Value>,
    pub recreate_dbs: bool,
    pub times: bool,
}

impl PopulateConfig {
    /// Configuration with the CLI defaults, targeting `localhost:5984`.
    pub fn new(template: DocumentTemplate) -> Self {
        Self {
            connection: ConnectionConfig::new("localhost", 5984),
            dbs: 1,
            db_start_id: 1,
            db_prefix: "testdb".to_string(),
            docs: 100,
            doc_start_id: 1,
            user_prefix: "user".to_string(),
            bulk_batch: 1,
            revs_per_doc: 1,
            conflicts_per_doc: 0,
            threads: 1,
            template,
            security: None,
            recreate_dbs: false,
            times: false,
        }
    }

    /// Load the template and security object named by `args` and validate
    /// the whole configuration.
    pub fn from_args(args: &CouchPopulateArgs) -> Result<Self, PopulateError> {
        let template = DocumentTemplate::from_file(&args.doc_tpl)?;
        let security = args
            .sec_obj
            .as_deref()
            .map(load_security_object)
            .transpose()?;

        let conn = &args.connection;
        let connection = ConnectionConfig {
            host: conn.host.clone(),
            port: conn.port,
            username: conn.http_basic_username.clone(),
            password: conn.http_basic_password.clone(),
            request_timeout: Duration::from_secs(conn.request_timeout_secs),
        };

        let config = Self {
            connection,
            dbs: args.dbs,
            db_start_id: args.db_start_id,
            db_prefix: args.db_prefix.clone(),
            docs: args.docs,
            doc_start_id: args.doc_start_id,
            user_prefix: args.user_prefix.clone(),
            bulk_batch: args.bulk_batch,
            revs_per_doc: args.revs_per_doc,
            conflicts_per_doc: args.conflicts_per_doc,
            threads: args.threads,
            template,
            security,
            recreate_dbs: args.recreate_dbs,
            times: args.times,
        };
        config.validate()?;
        config.check_template()?;
        Ok(config)
    }

    /// Reject invalid option combinations.
    pub fn validate(&self) -> Result<(), PopulateError> {
        if self.connection.username.is_some() && self.connection.password.is_none() {
            return Err(PopulateError::Config(
                "--http-basic-username requires --http-basic-password".to_string(),
            ));
        }
        if self.threads == 0 {
            return Err(PopulateError::Config(
                "--threads must be at least 1".to_string(),
            ));
        }
        if self.bulk_batch == 0 {
            return Err(PopulateError::Config(
                "--bulk-batch must be at least 1".to_string(),
            ));
        }
        if self.revs_per_doc == 0 {
            return Err(PopulateError::Config(
                "--revs-per-doc must be at least 1".to_string(),
            ));
        }
        if self.conflicts_per_doc > 0 && !self.uses_bulk() {
            return Err(PopulateError::Config(
                "--conflicts-per-doc requires --bulk-batch greater than 1".to_string(),
            ));
        }
        if self.connection.request_timeout.is_zero() {
            return Err(PopulateError::Config(
                "--request-timeout-secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Render the first document once so template errors surface before any
    /// request is sent.
    pub fn check_template(&self) -> Result<(), PopulateError> {
        self.template
            .render(&self.context(self.doc_start_id), self.attachment_mode())?;
        Ok(())
    }

    /// Whether documents go through `_bulk_docs`.
    pub fn uses_bulk(&self) -> bool {
        self.bulk_batch > 1
    }

    /// Bulk requests inline attachments; single writes stream them later.
    pub fn attachment_mode(&self) -> AttachmentMode {
        if self.uses_bulk() {
            AttachmentMode::Eager
        } else {
            AttachmentMode::Lazy
        }
    }

    pub fn context(&self, doc_id_counter: u64) -> GenerationContext<'_> {
        GenerationContext::new(doc_id_counter, &self.db_prefix, &self.user_prefix)
    }

    /// Names of the databases to populate, in order.
    pub fn database_names(&self) -> Vec<String> {
        if self.dbs == 1 {
            return vec![self.db_prefix.clone()];
        }
        (0..self.dbs)
            .map(|i| format!("{}{}", self.db_prefix, self.db_start_id + i))
            .collect()
    }
}

fn load_security_object(path: &Path) -> Result<Value, PopulateError> {
    let text = std::fs::read_to_string(path).map_err(|source| PopulateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| PopulateError::SecurityObject {
        path: path.to_path_buf(),
        source,
    })
}
