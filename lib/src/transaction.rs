//! Transaction guard: runs an operation inside a begin/commit/end cycle unless the
//! calling thread is already inside a transaction on the same store, or the store
//! does not support transactions at all.

use crate::errors::DatasetError;
use anyhow::{anyhow, Result};
use log::{debug, error};
use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TxMode {
    Read,
    Write,
}

/// Capability surface the guard queries on a store.
pub trait Transactional {
    fn supports_transactions(&self) -> bool;

    /// Mode of the transaction the calling thread holds on this store, if any.
    fn active_mode(&self) -> Option<TxMode>;

    fn is_in_transaction(&self) -> bool {
        self.active_mode().is_some()
    }

    /// Starts a transaction. Ending it without `commit` rolls back its writes.
    fn begin(&self, mode: TxMode) -> Result<Transaction<'_>>;
}

/// Callbacks a store runs when one of its transactions ends.
pub trait TransactionHooks {
    fn on_commit(&self, mode: TxMode) -> Result<()>;
    fn on_abort(&self, mode: TxMode);
}

/// Runs `body` under a transaction of the given mode and returns its value.
pub fn in_transaction<S, T, F>(store: &S, mode: TxMode, body: F) -> Result<T>
where
    S: Transactional + ?Sized,
    F: FnOnce() -> Result<T>,
{
    match enter(store, mode)? {
        Some(txn) => {
            let value = body()?;
            txn.commit()?;
            Ok(value)
        }
        None => body(),
    }
}

/// Scoped form of `in_transaction`: returns the transaction the caller must keep alive
/// for as long as it reads, or `None` when the body should run directly.
pub fn enter<S>(store: &S, mode: TxMode) -> Result<Option<Transaction<'_>>>
where
    S: Transactional + ?Sized,
{
    match store.active_mode() {
        Some(TxMode::Read) if mode == TxMode::Write => {
            Err(DatasetError::ReadOnlyTransaction.into())
        }
        Some(_) => Ok(None),
        None if !store.supports_transactions() => Ok(None),
        None => store.begin(mode).map(Some),
    }
}

static NEXT_STORE_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    // (store id, mode) for every transaction open on this thread
    static ACTIVE: RefCell<Vec<(usize, TxMode)>> = const { RefCell::new(Vec::new()) };
}

enum LockGuard<'a> {
    Read(#[allow(dead_code)] RwLockReadGuard<'a, ()>),
    Write(#[allow(dead_code)] RwLockWriteGuard<'a, ()>),
}

/// Single-writer / multi-reader transaction bookkeeping embedded in a store.
pub struct TransactionState {
    id: usize,
    lock: RwLock<()>,
}

impl Default for TransactionState {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionState {
    pub fn new() -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            lock: RwLock::new(()),
        }
    }

    pub fn active_mode(&self) -> Option<TxMode> {
        ACTIVE.with(|active| {
            active
                .borrow()
                .iter()
                .find(|(id, _)| *id == self.id)
                .map(|(_, mode)| *mode)
        })
    }

    /// Blocks until the lock for `mode` is available. Writers exclude everyone,
    /// readers exclude writers.
    pub fn begin<'a>(
        &'a self,
        mode: TxMode,
        hooks: &'a dyn TransactionHooks,
    ) -> Result<Transaction<'a>> {
        if self.active_mode().is_some() {
            return Err(anyhow!(
                "a transaction is already active on this thread for this store"
            ));
        }
        // A poisoned lock only means a body panicked; its writes were rolled back
        // when its transaction was dropped during unwinding.
        let lock = match mode {
            TxMode::Read => LockGuard::Read(self.lock.read().unwrap_or_else(|e| e.into_inner())),
            TxMode::Write => {
                LockGuard::Write(self.lock.write().unwrap_or_else(|e| e.into_inner()))
            }
        };
        ACTIVE.with(|active| active.borrow_mut().push((self.id, mode)));
        debug!("Began {:?} transaction on store {}", mode, self.id);
        Ok(Transaction {
            mode,
            store_id: self.id,
            hooks,
            finished: false,
            _lock: lock,
        })
    }
}

/// An open transaction. Dropping it without `commit` ends it and rolls back.
pub struct Transaction<'a> {
    mode: TxMode,
    store_id: usize,
    hooks: &'a dyn TransactionHooks,
    finished: bool,
    _lock: LockGuard<'a>,
}

impl<'a> Transaction<'a> {
    pub fn mode(&self) -> TxMode {
        self.mode
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let result = self.hooks.on_commit(self.mode);
        if result.is_ok() {
            debug!("Committed {:?} transaction on store {}", self.mode, self.store_id);
        }
        result
    }
}

impl<'a> Drop for Transaction<'a> {
    fn drop(&mut self) {
        if !self.finished {
            if self.mode == TxMode::Write {
                error!(
                    "Write transaction on store {} ended without commit; rolling back",
                    self.store_id
                );
            }
            self.hooks.on_abort(self.mode);
        }
        let store_id = self.store_id;
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|(id, _)| *id == store_id) {
                active.remove(pos);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Recorder {
        state: TransactionState,
        supported: bool,
        begun: Cell<usize>,
        commits: Cell<usize>,
        aborts: Cell<usize>,
    }

    impl TransactionHooks for Recorder {
        fn on_commit(&self, _mode: TxMode) -> Result<()> {
            self.commits.set(self.commits.get() + 1);
            Ok(())
        }

        fn on_abort(&self, _mode: TxMode) {
            self.aborts.set(self.aborts.get() + 1);
        }
    }

    impl Transactional for Recorder {
        fn supports_transactions(&self) -> bool {
            self.supported
        }

        fn active_mode(&self) -> Option<TxMode> {
            self.state.active_mode()
        }

        fn begin(&self, mode: TxMode) -> Result<Transaction<'_>> {
            self.begun.set(self.begun.get() + 1);
            self.state.begin(mode, self)
        }
    }

    fn recorder() -> Recorder {
        Recorder {
            supported: true,
            ..Default::default()
        }
    }

    #[test]
    fn commits_on_success() {
        let store = recorder();
        let value = in_transaction(&store, TxMode::Write, || Ok(42)).unwrap();
        assert_eq!(value, 42);
        assert_eq!(store.commits.get(), 1);
        assert_eq!(store.aborts.get(), 0);
        assert!(!store.is_in_transaction());
    }

    #[test]
    fn ends_without_commit_on_error() {
        let store = recorder();
        let result: Result<()> =
            in_transaction(&store, TxMode::Write, || Err(anyhow!("boom")));
        assert_eq!(result.unwrap_err().to_string(), "boom");
        assert_eq!(store.commits.get(), 0);
        assert_eq!(store.aborts.get(), 1);
        assert!(!store.is_in_transaction());
    }

    #[test]
    fn nested_calls_reuse_outer_transaction() {
        let store = recorder();
        in_transaction(&store, TxMode::Write, || {
            assert_eq!(store.active_mode(), Some(TxMode::Write));
            in_transaction(&store, TxMode::Read, || Ok(()))?;
            in_transaction(&store, TxMode::Write, || Ok(()))
        })
        .unwrap();
        assert_eq!(store.begun.get(), 1);
        assert_eq!(store.commits.get(), 1);
    }

    #[test]
    fn write_inside_read_is_rejected() {
        let store = recorder();
        let err = in_transaction(&store, TxMode::Read, || {
            in_transaction(&store, TxMode::Write, || Ok(()))
        })
        .unwrap_err();
        assert!(matches!(
            DatasetError::from_anyhow(&err),
            Some(DatasetError::ReadOnlyTransaction)
        ));
    }

    #[test]
    fn unsupported_store_runs_body_directly() {
        let store = Recorder::default();
        in_transaction(&store, TxMode::Write, || Ok(())).unwrap();
        assert_eq!(store.begun.get(), 0);
        assert!(enter(&store, TxMode::Read).unwrap().is_none());
    }

    #[test]
    fn double_begin_on_same_thread_fails() {
        let store = recorder();
        let _txn = store.begin(TxMode::Read).unwrap();
        assert!(store.begin(TxMode::Read).is_err());
    }
}
