//! Shared application state passed to handlers.

use std::sync::Arc;

use cocoa_trace::store::Store;
use cocoa_trace::Ledger;

/// Handler state: one ledger shared by every request.
pub struct AppState<S: Store> {
    pub ledger: Arc<Ledger<S>>,
}

impl<S: Store> AppState<S> {
    pub fn new(ledger: Ledger<S>) -> Self {
        Self {
            ledger: Arc::new(ledger),
        }
    }
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}
