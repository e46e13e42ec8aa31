//! Scripted session double for unit tests.

use crate::provider::Provider;
use crate::session::{Row, Session, Statement};
use crate::{BackendError, DbError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Records every statement and answers from a queue of canned results.
/// Once the queue is empty, statements return no rows.
pub struct ScriptedSession {
    provider: Provider,
    responses: Mutex<VecDeque<std::result::Result<Vec<Row>, (Option<String>, String)>>>,
    executed: Mutex<Vec<Statement>>,
    release_error: Mutex<Option<String>>,
}

impl ScriptedSession {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            responses: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            release_error: Mutex::new(None),
        }
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.responses.lock().unwrap().push_back(Ok(rows));
    }

    pub fn push_empty(&self) {
        self.push_rows(Vec::new());
    }

    pub fn push_error(&self, message: &str) {
        self.responses.lock().unwrap().push_back(Err((None, message.to_string())));
    }

    /// Queue a failure carrying a SQLSTATE.
    pub fn push_error_code(&self, code: &str, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err((Some(code.to_string()), message.to_string())));
    }

    pub fn fail_release(&self, message: &str) {
        *self.release_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Session for ScriptedSession {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>> {
        self.executed.lock().unwrap().push(statement.clone());
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(rows)) => Ok(rows),
            Some(Err((code, message))) => Err(DbError::backend(
                self.provider,
                BackendError::Remote { code, message },
            )),
            None => Ok(Vec::new()),
        }
    }

    async fn release(&self) -> Result<()> {
        match self.release_error.lock().unwrap().take() {
            Some(message) => Err(DbError::backend(
                self.provider,
                BackendError::Remote { code: None, message },
            )),
            None => Ok(()),
        }
    }
}
