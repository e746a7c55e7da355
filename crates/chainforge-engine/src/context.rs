use std::sync::Arc;

use chainforge_store::{ProvisionStore, StoreTx};

/// Execution context threaded through every state-machine step.
///
/// Carries the store handle and the ambient transaction batch owned by the
/// transactional middleware. Exactly one transaction may be open at a time;
/// opening a second one, or recording writes while none is open, is a
/// programming error.
pub struct StepContext {
    store: Arc<dyn ProvisionStore>,
    tx: Option<StoreTx>,
}

impl StepContext {
    pub fn new(store: Arc<dyn ProvisionStore>) -> Self {
        StepContext { store, tx: None }
    }

    pub fn store(&self) -> &Arc<dyn ProvisionStore> {
        &self.store
    }

    /// Open a fresh transaction batch. Panics if one is already in progress.
    pub(crate) fn begin(&mut self) {
        if self.tx.is_some() {
            panic!("transaction already in progress");
        }

        self.tx = Some(StoreTx::new());
    }

    /// Close the current transaction and hand its batch to the caller.
    pub(crate) fn take_tx(&mut self) -> Option<StoreTx> {
        self.tx.take()
    }

    /// The open transaction batch. Panics when called outside the
    /// transactional middleware.
    pub fn tx(&mut self) -> &mut StoreTx {
        match self.tx.as_mut() {
            Some(tx) => tx,
            None => panic!("no transaction in progress; steps must run inside the transactional middleware"),
        }
    }
}
