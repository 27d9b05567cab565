//! In-memory driver for exercising the engine without a database
//!
//! Every statement is recorded and answered by a handler closure. Clones of
//! a [`MockConnector`] share the same log and counters, so a test keeps one
//! clone for inspection and hands the other to the runner.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::common::{Error, Result};
use crate::testing::params::BoundParam;

use super::{Connector, ExecutionResult, PlaceholderStyle, QueryAdapter, QueryKind};

type Handler = dyn Fn(&str, &[BoundParam]) -> Result<ExecutionResult> + Send + Sync;

/// A statement as the mock received it
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
    /// 1-based connection number
    pub connection: usize,
    pub query: String,
    pub params: Vec<BoundParam>,
}

#[derive(Default)]
struct Shared {
    log: Mutex<Vec<ExecutedQuery>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Clone)]
pub struct MockConnector {
    handler: Arc<Handler>,
    style: PlaceholderStyle,
    refuse_connections: bool,
    shared: Arc<Shared>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    /// Selects return no rows, mutations report one affected row and
    /// everything else returns nothing
    pub fn new() -> Self {
        Self::with_handler(|query, _| {
            Ok(match QueryKind::classify(query) {
                QueryKind::Select => ExecutionResult::RowSet(Vec::new()),
                QueryKind::Mutation => ExecutionResult::Status(1),
                QueryKind::Other => ExecutionResult::Empty,
            })
        })
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str, &[BoundParam]) -> Result<ExecutionResult> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            style: PlaceholderStyle::default(),
            refuse_connections: false,
            shared: Arc::default(),
        }
    }

    pub fn with_placeholder_style(mut self, style: PlaceholderStyle) -> Self {
        self.style = style;
        self
    }

    /// Make every `connect` fail
    pub fn failing_connect(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    /// Query texts in execution order
    pub fn queries(&self) -> Vec<String> {
        self.executed().into_iter().map(|q| q.query).collect()
    }

    pub fn executed(&self) -> Vec<ExecutedQuery> {
        match self.shared.log.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn connections_opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn connections_closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn describe(&self) -> String {
        "mock://".to_string()
    }

    async fn connect(&self) -> Result<Box<dyn QueryAdapter>> {
        if self.refuse_connections {
            return Err(Error::connection("mock", "connection refused"));
        }
        let id = self.shared.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MockAdapter {
            id,
            handler: Arc::clone(&self.handler),
            style: self.style,
            shared: Arc::clone(&self.shared),
            closed: false,
        }))
    }
}

pub struct MockAdapter {
    id: usize,
    handler: Arc<Handler>,
    style: PlaceholderStyle,
    shared: Arc<Shared>,
    closed: bool,
}

#[async_trait]
impl QueryAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        self.style
    }

    async fn execute(&mut self, query: &str, params: &[BoundParam]) -> Result<ExecutionResult> {
        if self.closed {
            return Err(Error::connection("mock", "connection already closed"));
        }
        {
            let mut log = match self.shared.log.lock() {
                Ok(log) => log,
                Err(poisoned) => poisoned.into_inner(),
            };
            log.push(ExecutedQuery {
                connection: self.id,
                query: query.to_string(),
                params: params.to_vec(),
            });
        }
        (self.handler)(query, params)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
