//! Statement building and session tracking shared by the SQL adapters

use std::collections::HashMap;
use std::sync::Mutex;

use crate::driver::OperationId;

/// Name of the table recording applied schema versions on each target
pub const HISTORY_TABLE: &str = "keel_migration_history";

/// Quotes an identifier with the given quote character, doubling embedded quotes
pub fn quote_ident(name: &str, quote: char) -> String {
    let escaped = name.replace(quote, &format!("{quote}{quote}"));
    format!("{quote}{escaped}{quote}")
}

/// Quotes a string literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quotes a MySQL string literal.
///
/// Backslash is an escape character in MySQL's default SQL mode, so it is
/// escaped along with the quote.
pub fn quote_mysql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// Server-side session ids of in-flight operations, used to interrupt them
pub struct SessionTracker<T> {
    sessions: Mutex<HashMap<OperationId, T>>,
}

impl<T: Copy> SessionTracker<T> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Records the session running `operation` until the guard is dropped
    pub fn track(&self, operation: OperationId, session: T) -> SessionGuard<'_, T> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(operation, session);
        SessionGuard {
            tracker: self,
            operation,
        }
    }

    pub fn session(&self, operation: OperationId) -> Option<T> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&operation)
            .copied()
    }
}

impl<T: Copy> Default for SessionTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Untracks an operation when it completes or its future is dropped
pub struct SessionGuard<'a, T> {
    tracker: &'a SessionTracker<T>,
    operation: OperationId,
}

impl<T> Drop for SessionGuard<'_, T> {
    fn drop(&mut self) {
        self.tracker
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.operation);
    }
}
