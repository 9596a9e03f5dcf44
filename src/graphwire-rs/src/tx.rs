//! Transaction sessions over the stateless HTTP protocol.
//!
//! A transaction is a server-side resource bound to a URL handed out on
//! begin. The session drives the state machine
//! `Open -> (Committed | RolledBack | Expired)`: statements POST to the
//! transaction URL, commit POSTs to `<url>/commit`, rollback DELETEs the
//! URL. If the server no longer knows the URL the transaction is expired
//! and every further operation fails accordingly.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::{json, Value as Json};

use graphwire_core::error::{classify, GraphError, Result};
use graphwire_core::hydrate::hydrate_row;
use graphwire_core::Record;

use crate::http::{HttpResponse, Resource};

/// Root of the transactional endpoint, relative to the base URL.
pub const TRANSACTION_ENDPOINT: &str = "db/data/transaction";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    RolledBack,
    Expired,
}

/// A sequence of statement submissions against one transactional resource.
///
/// One transaction at a time; a session is single-writer and must not be
/// shared across tasks. Independent sessions are fully independent.
pub struct Session {
    resource: Arc<Resource>,
    /// Set while a transaction is open; cleared when it reaches a terminal
    /// state or is dropped. Shared with the transaction handle.
    active: Arc<AtomicBool>,
}

/// Future returned by a [`Session::with_transaction`] body.
pub type TxBody<'t, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 't>>;

impl Session {
    pub(crate) fn new(resource: Arc<Resource>) -> Self {
        Self {
            resource,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Begin a transaction on the server. At most one transaction may be
    /// open per session at a time.
    ///
    /// Fails with a protocol error if the server does not hand back a
    /// usable transaction URL in the `Location` header.
    pub async fn begin_transaction(&mut self) -> Result<Transaction> {
        if self.active.load(Ordering::Acquire) {
            return Err(GraphError::SessionBusy);
        }
        let body = json!({ "statements": [] });
        let response = self
            .resource
            .post(TRANSACTION_ENDPOINT, &body, &[201])
            .await?;
        if let Some(err) = response_errors(&response) {
            return Err(err);
        }
        let tx_url = response.location.clone().ok_or(GraphError::Protocol {
            status: Some(response.status),
            message: "server did not return a transaction URL".to_string(),
        })?;
        let commit_url = response
            .body
            .as_ref()
            .and_then(|body| body.get("commit"))
            .and_then(Json::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{tx_url}/commit"));
        let expires = response
            .body
            .as_ref()
            .and_then(|body| body.get("transaction"))
            .and_then(|tx| tx.get("expires"))
            .and_then(Json::as_str)
            .and_then(|text| DateTime::parse_from_rfc2822(text).ok());
        tracing::debug!(url = %tx_url, "transaction open");
        self.active.store(true, Ordering::Release);
        Ok(Transaction {
            resource: self.resource.clone(),
            tx_url,
            commit_url,
            state: TxState::Open,
            success: true,
            expires,
            active: self.active.clone(),
        })
    }

    /// Run `f` inside a scoped transaction.
    ///
    /// On normal exit the transaction commits if its success flag is still
    /// set (the default) and rolls back otherwise. If an error propagates
    /// out of `f` the transaction always rolls back before the error
    /// continues upward; a secondary rollback failure is logged, never
    /// allowed to mask the original error.
    pub async fn with_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> TxBody<'t, T>,
    {
        let mut tx = self.begin_transaction().await?;
        match f(&mut tx).await {
            Ok(value) => {
                if tx.success() {
                    tx.commit().await?;
                } else {
                    tx.rollback().await?;
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback after failed transaction body also failed");
                }
                Err(err)
            }
        }
    }
}

#[derive(Serialize)]
struct StatementEntry {
    statement: String,
    parameters: Json,
    #[serde(rename = "resultDataContents")]
    result_data_contents: [&'static str; 1],
}

#[derive(Serialize)]
struct StatementBody {
    statements: Vec<StatementEntry>,
}

fn statement_body(statement: &str, parameters: Json) -> Result<Json> {
    let parameters = match parameters {
        Json::Null => json!({}),
        params @ Json::Object(_) => params,
        other => {
            return Err(GraphError::Protocol {
                status: None,
                message: format!("statement parameters must be a JSON object, got {other}"),
            })
        }
    };
    let body = StatementBody {
        statements: vec![StatementEntry {
            statement: statement.to_string(),
            parameters,
            result_data_contents: ["REST"],
        }],
    };
    serde_json::to_value(&body).map_err(|e| GraphError::Protocol {
        status: None,
        message: format!("could not encode statement body: {e}"),
    })
}

/// A server-side unit of work bound to a URL.
pub struct Transaction {
    resource: Arc<Resource>,
    tx_url: String,
    commit_url: String,
    state: TxState,
    success: bool,
    expires: Option<DateTime<FixedOffset>>,
    active: Arc<AtomicBool>,
}

impl Transaction {
    /// Submit one statement. Permitted only while open.
    ///
    /// The POST happens at submission, but server-reported statement errors
    /// are not inspected here: they surface when the returned stream is
    /// first consumed. Submitting invalid Cypher therefore succeeds; the
    /// failure arrives on the first `next()`.
    pub async fn run(&mut self, statement: &str, parameters: Json) -> Result<RecordStream> {
        self.check_open()?;
        let body = statement_body(statement, parameters)?;
        let response = match self.resource.post(&self.tx_url, &body, &[200, 201]).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(err)),
        };
        Ok(RecordStream::from_response(response))
    }

    /// Commit. On success no further operation is permitted.
    ///
    /// A commit whose response carries server errors leaves the transaction
    /// in an indeterminate state: the error is surfaced and the state is
    /// not advanced, so the caller can decide whether to roll back.
    pub async fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        let body = json!({ "statements": [] });
        let response = match self.resource.post(&self.commit_url, &body, &[200]).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(err)),
        };
        if let Some(err) = response_errors(&response) {
            return Err(err);
        }
        self.close(TxState::Committed);
        tracing::debug!(url = %self.tx_url, "transaction committed");
        Ok(())
    }

    /// Roll back. Idempotent once rolled back; an error after commit.
    pub async fn rollback(&mut self) -> Result<()> {
        match self.state {
            TxState::RolledBack => return Ok(()),
            TxState::Committed => return Err(GraphError::TransactionClosed),
            TxState::Expired => return Err(GraphError::TransactionExpired),
            TxState::Open => {}
        }
        match self.resource.delete(&self.tx_url, &[200]).await {
            Ok(_) => {
                self.close(TxState::RolledBack);
                tracing::debug!(url = %self.tx_url, "transaction rolled back");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Clear the success flag so a scoped transaction rolls back on exit.
    pub fn set_success(&mut self, success: bool) {
        self.success = success;
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn is_open(&self) -> bool {
        self.state == TxState::Open
    }

    /// Server expiry hint for the transaction, when one was supplied.
    pub fn expires(&self) -> Option<DateTime<FixedOffset>> {
        self.expires
    }

    /// The server-assigned transaction URL.
    pub fn url(&self) -> &str {
        &self.tx_url
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            TxState::Open => Ok(()),
            TxState::Committed | TxState::RolledBack => Err(GraphError::TransactionClosed),
            TxState::Expired => Err(GraphError::TransactionExpired),
        }
    }

    /// A not-found classification on the transaction URL means the server
    /// has forgotten the transaction: poison the state machine.
    fn fail(&mut self, err: GraphError) -> GraphError {
        if err.is_not_found() {
            self.close(TxState::Expired);
            GraphError::TransactionExpired
        } else {
            err
        }
    }

    /// Enter a terminal state and release the session for a new transaction.
    fn close(&mut self, state: TxState) {
        self.state = state;
        self.active.store(false, Ordering::Release);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TxState::Open {
            // No HTTP from Drop; the server will expire the URL on its own.
            tracing::warn!(url = %self.tx_url, "transaction dropped while open");
            self.active.store(false, Ordering::Release);
        }
    }
}

fn response_errors(response: &HttpResponse) -> Option<GraphError> {
    let first = response
        .body
        .as_ref()?
        .get("errors")?
        .as_array()?
        .first()?;
    Some(classify(
        response.status,
        first.get("code").and_then(Json::as_str),
        first.get("message").and_then(Json::as_str).unwrap_or(""),
    ))
}

/// Lazily hydrated, single-pass sequence of result records.
///
/// Rows hydrate one at a time as they are consumed; a server-reported
/// statement error is deferred and returned from the first `next()` call.
/// The stream is not restartable: each record is produced exactly once.
pub struct RecordStream {
    keys: Arc<Vec<String>>,
    rows: VecDeque<Json>,
    pending_error: Option<GraphError>,
}

impl RecordStream {
    fn from_response(response: HttpResponse) -> Self {
        let Some(body) = response.body else {
            return Self::failed(GraphError::Protocol {
                status: Some(response.status),
                message: "statement response had no body".to_string(),
            });
        };
        let pending_error = body
            .get("errors")
            .and_then(Json::as_array)
            .and_then(|errors| errors.first())
            .map(|first| {
                classify(
                    response.status,
                    first.get("code").and_then(Json::as_str),
                    first.get("message").and_then(Json::as_str).unwrap_or(""),
                )
            });
        let result = body
            .get("results")
            .and_then(Json::as_array)
            .and_then(|results| results.first());
        let keys: Vec<String> = result
            .and_then(|r| r.get("columns"))
            .and_then(Json::as_array)
            .map(|columns| {
                columns
                    .iter()
                    .filter_map(Json::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let rows: VecDeque<Json> = result
            .and_then(|r| r.get("data"))
            .and_then(Json::as_array)
            .cloned()
            .unwrap_or_default()
            .into();
        Self {
            keys: Arc::new(keys),
            rows,
            pending_error,
        }
    }

    fn failed(err: GraphError) -> Self {
        Self {
            keys: Arc::new(Vec::new()),
            rows: VecDeque::new(),
            pending_error: Some(err),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Produce the next record, or the deferred statement error on the
    /// first call after a failed statement.
    pub fn next(&mut self) -> Result<Option<Record>> {
        if let Some(err) = self.pending_error.take() {
            self.rows.clear();
            return Err(err);
        }
        let Some(row) = self.rows.pop_front() else {
            return Ok(None);
        };
        let values = row
            .get("rest")
            .or_else(|| row.get("row"))
            .and_then(Json::as_array)
            .ok_or(GraphError::Protocol {
                status: None,
                message: "result row carries no data".to_string(),
            })?;
        hydrate_row(self.keys.clone(), values).map(Some)
    }

    /// Drain the stream eagerly into a list, in arrival order.
    pub fn collect_all(mut self) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(self.rows.len());
        while let Some(record) = self.next()? {
            records.push(record);
        }
        Ok(records)
    }
}
