//! Queue-backed session for router tests.

use async_trait::async_trait;
use bookbase_database::{BackendError, DbError, Provider, Row, Session, Statement};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

pub struct StubSession {
    provider: Provider,
    responses: Mutex<VecDeque<Result<Vec<Value>, String>>>,
    executed: Mutex<Vec<String>>,
}

impl StubSession {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            responses: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Queue rows given as JSON objects.
    pub fn push(&self, rows: Vec<Value>) {
        self.responses.lock().unwrap().push_back(Ok(rows));
    }

    pub fn push_error(&self, message: &str) {
        self.responses.lock().unwrap().push_back(Err(message.to_string()));
    }

    /// SQL of every executed statement.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Session for StubSession {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn execute(&self, statement: &Statement) -> bookbase_database::Result<Vec<Row>> {
        self.executed.lock().unwrap().push(statement.sql.clone());
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(rows)) => Ok(rows
                .into_iter()
                .map(|v| match v {
                    Value::Object(map) => Row::from(map),
                    _ => Row::new(),
                })
                .collect()),
            Some(Err(message)) => Err(DbError::Backend {
                provider: self.provider,
                source: BackendError::Remote {
                    code: None,
                    message,
                },
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn release(&self) -> bookbase_database::Result<()> {
        Ok(())
    }
}
