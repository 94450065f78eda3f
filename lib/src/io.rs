//! Defines the storage engine surface the dataset layer consumes, and its two backends:
//! a transactional oxigraph store (on disk or in memory) and a non-transactional
//! in-memory quad set.

use crate::consts::{LOCK_FILE, STORE_DIR};
use crate::errors::DatasetError;
use crate::query::{self, QueryOutcome};
use crate::transaction::{Transaction, TransactionHooks, TransactionState, Transactional, TxMode};
use anyhow::{anyhow, Result};
use fs2::FileExt;
use log::{debug, error, info, warn};
use oxigraph::model::{
    Dataset as QuadSet, GraphNameRef, NamedNode, NamedNodeRef, NamedOrBlankNode,
    NamedOrBlankNodeRef, Quad, QuadRef, Term, TermRef,
};
use oxigraph::store::Store;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Lazy sequence of quads read from a store.
pub type QuadCursor<'a> = Box<dyn Iterator<Item = Result<Quad>> + 'a>;

/// Lazy sequence of named graph identifiers.
pub type GraphCursor<'a> = Box<dyn Iterator<Item = Result<NamedNode>> + 'a>;

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub num_graphs: usize,
    pub num_quads: usize,
}

pub trait QuadStore: Transactional + Send + Sync {
    /// Returns the type of the store (e.g., "persistent", "temporary", "memory")
    fn store_type(&self) -> &'static str;

    /// Returns the directory holding the store, if it is a file-based store
    fn location(&self) -> Option<&Path>;

    /// Returns true if committed writes survive closing the store
    fn is_durable(&self) -> bool {
        self.location().is_some()
    }

    /// Number of quads across all graphs
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn contains(&self, quad: QuadRef<'_>) -> Result<bool>;

    /// Inserts a quad; returns false if it was already present.
    fn insert(&self, quad: QuadRef<'_>) -> Result<bool>;

    /// Removes a quad; returns false if it was not present.
    fn remove(&self, quad: QuadRef<'_>) -> Result<bool>;

    /// Range lookup; `None` positions are wildcards and a `None` graph name means all graphs.
    /// Backends that guard their data with a lock may collect the matches eagerly.
    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
        graph_name: Option<GraphNameRef<'_>>,
    ) -> QuadCursor<'a>;

    /// Number of triples in one graph.
    fn graph_len(&self, graph_name: GraphNameRef<'_>) -> Result<usize> {
        let mut count = 0usize;
        for quad in self.quads_for_pattern(None, None, None, Some(graph_name)) {
            quad?;
            count = count.saturating_add(1);
        }
        Ok(count)
    }

    fn named_graphs(&self) -> GraphCursor<'_>;

    fn contains_named_graph(&self, name: NamedNodeRef<'_>) -> Result<bool>;

    /// Registers an empty named graph; returns false if it already existed.
    fn insert_named_graph(&self, name: NamedNodeRef<'_>) -> Result<bool>;

    /// Removes a named graph and its triples; returns false if it did not exist.
    fn remove_named_graph(&self, name: NamedNodeRef<'_>) -> Result<bool>;

    /// Removes every triple of a graph, keeping the graph itself.
    fn clear_graph(&self, graph_name: GraphNameRef<'_>) -> Result<()>;

    /// Removes every quad and every named graph.
    fn clear(&self) -> Result<()>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Evaluates a SPARQL query against the whole store.
    fn query(&self, sparql: &str, bindings: &[(String, Term)]) -> Result<QueryOutcome>;

    fn stats(&self) -> Result<StoreStats> {
        let mut num_graphs = 0;
        for name in self.named_graphs() {
            name?;
            num_graphs += 1;
        }
        Ok(StoreStats {
            num_graphs,
            num_quads: self.len()?,
        })
    }
}

/// Writes of the open write transaction, kept out of the store until commit.
/// `added` only holds quads absent from the store and `removed` only quads present in it.
#[derive(Default)]
struct PendingWrites {
    added: QuadSet,
    removed: QuadSet,
    created_graphs: BTreeSet<NamedNode>,
    dropped_graphs: BTreeSet<NamedNode>,
}

impl PendingWrites {
    fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.created_graphs.len() + self.dropped_graphs.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches_pattern(
    quad: QuadRef<'_>,
    subject: Option<NamedOrBlankNodeRef<'_>>,
    predicate: Option<NamedNodeRef<'_>>,
    object: Option<TermRef<'_>>,
    graph_name: Option<GraphNameRef<'_>>,
) -> bool {
    subject.map_or(true, |s| quad.subject == s)
        && predicate.map_or(true, |p| quad.predicate == p)
        && object.map_or(true, |o| quad.object == o)
        && graph_name.map_or(true, |g| quad.graph_name == g)
}

/// Transactional store backed by oxigraph. Writes made inside a write transaction are
/// staged in memory and reach the store in a single oxigraph transaction on commit.
pub struct PersistentStore {
    store: Store,
    location: Option<PathBuf>,
    state: TransactionState,
    pending: Mutex<PendingWrites>,
    // Keep the interprocess lock alive for the lifetime of this store
    _lock_file: Option<File>,
}

impl PersistentStore {
    /// Opens (or creates) a durable store in `path`, taking an exclusive lock on it.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let lock_path = path.join(LOCK_FILE);
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)?;
        if let Err(e) = lock_file.try_lock_exclusive() {
            return Err(anyhow!(
                "Failed to open dataset: could not acquire exclusive lock on {:?}: {}. Another process has this dataset open.",
                lock_path, e
            ));
        }
        let store = Store::open(path.join(STORE_DIR))?;
        info!("Opened persistent store at {:?}", path);
        Ok(Self {
            store,
            location: Some(path.to_path_buf()),
            state: TransactionState::new(),
            pending: Mutex::new(PendingWrites::default()),
            _lock_file: Some(lock_file),
        })
    }

    /// In-memory oxigraph store with the same transactional behavior, lost on drop.
    pub fn new_temporary() -> Result<Self> {
        Ok(Self::from_store(Store::new()?))
    }

    pub fn from_store(store: Store) -> Self {
        Self {
            store,
            location: None,
            state: TransactionState::new(),
            pending: Mutex::new(PendingWrites::default()),
            _lock_file: None,
        }
    }

    /// Returns a reference to the underlying oxigraph store. It only ever holds
    /// committed data.
    pub fn store(&self) -> &Store {
        &self.store
    }

    fn pending(&self) -> Result<MutexGuard<'_, PendingWrites>> {
        self.pending
            .lock()
            .map_err(|_| anyhow!("Failed to lock pending writes"))
    }

    // Only the thread holding the write transaction sees staged writes.
    fn staging(&self) -> bool {
        self.state.active_mode() == Some(TxMode::Write)
    }

    fn is_removed(&self, quad: &Quad) -> bool {
        self.pending()
            .map_or(false, |pending| pending.removed.contains(quad))
    }

    fn is_dropped(&self, name: &NamedNode) -> bool {
        self.pending()
            .map_or(false, |pending| pending.dropped_graphs.contains(name))
    }

    fn apply_pending(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending()?);
        if pending.is_empty() {
            return Ok(());
        }
        debug!("Committing {} staged writes", pending.len());
        let mut txn = self.store.start_transaction()?;
        for quad in pending.removed.iter() {
            txn.remove(quad);
        }
        for name in &pending.dropped_graphs {
            txn.remove_named_graph(name.as_ref())?;
        }
        for name in &pending.created_graphs {
            txn.insert_named_graph(name.as_ref());
        }
        for quad in pending.added.iter() {
            txn.insert(quad);
        }
        txn.commit()?;
        Ok(())
    }
}

impl Drop for PersistentStore {
    fn drop(&mut self) {
        if self.location.is_some() {
            if let Err(e) = self.store.flush() {
                error!("Failed to flush store on close: {e}");
            }
        }
    }
}

impl TransactionHooks for PersistentStore {
    fn on_commit(&self, mode: TxMode) -> Result<()> {
        match mode {
            TxMode::Write => self
                .apply_pending()
                .map_err(|e| anyhow!("Failed to commit transaction: {}", e)),
            TxMode::Read => Ok(()),
        }
    }

    fn on_abort(&self, mode: TxMode) {
        if mode != TxMode::Write {
            return;
        }
        // a poisoned lock still holds the staged writes, which must go
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let discarded = std::mem::take(&mut *pending);
        if !discarded.is_empty() {
            warn!("Discarding {} staged writes", discarded.len());
        }
    }
}

impl Transactional for PersistentStore {
    fn supports_transactions(&self) -> bool {
        true
    }

    fn active_mode(&self) -> Option<TxMode> {
        self.state.active_mode()
    }

    fn begin(&self, mode: TxMode) -> Result<Transaction<'_>> {
        self.state.begin(mode, self)
    }
}

impl QuadStore for PersistentStore {
    fn store_type(&self) -> &'static str {
        if self.location.is_some() {
            "persistent"
        } else {
            "temporary"
        }
    }

    fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    fn len(&self) -> Result<usize> {
        let committed = self.store.len()?;
        if !self.staging() {
            return Ok(committed);
        }
        let pending = self.pending()?;
        Ok((committed + pending.added.len()).saturating_sub(pending.removed.len()))
    }

    fn is_empty(&self) -> Result<bool> {
        if self.staging() {
            return Ok(self.len()? == 0);
        }
        Ok(self.store.is_empty()?)
    }

    fn contains(&self, quad: QuadRef<'_>) -> Result<bool> {
        if self.staging() {
            let pending = self.pending()?;
            if pending.added.contains(quad) {
                return Ok(true);
            }
            if pending.removed.contains(quad) {
                return Ok(false);
            }
        }
        Ok(self.store.contains(quad)?)
    }

    fn insert(&self, quad: QuadRef<'_>) -> Result<bool> {
        if !self.staging() {
            return Ok(self.store.insert(quad)?);
        }
        if self.contains(quad)? {
            return Ok(false);
        }
        if let GraphNameRef::NamedNode(name) = quad.graph_name {
            self.insert_named_graph(name)?;
        }
        let mut pending = self.pending()?;
        if !pending.removed.remove(quad) {
            pending.added.insert(quad);
        }
        Ok(true)
    }

    fn remove(&self, quad: QuadRef<'_>) -> Result<bool> {
        if !self.staging() {
            return Ok(self.store.remove(quad)?);
        }
        if !self.contains(quad)? {
            return Ok(false);
        }
        let mut pending = self.pending()?;
        if !pending.added.remove(quad) {
            pending.removed.insert(quad);
        }
        Ok(true)
    }

    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
        graph_name: Option<GraphNameRef<'_>>,
    ) -> QuadCursor<'a> {
        let committed = self
            .store
            .quads_for_pattern(subject, predicate, object, graph_name)
            .map(|quad| quad.map_err(anyhow::Error::from));
        if !self.staging() {
            return Box::new(committed);
        }
        let added: Vec<Quad> = match self.pending() {
            Ok(pending) => pending
                .added
                .iter()
                .filter(|q| matches_pattern(*q, subject, predicate, object, graph_name))
                .map(|q| q.into_owned())
                .collect(),
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        Box::new(
            committed
                .filter(move |quad| quad.as_ref().map_or(true, |q| !self.is_removed(q)))
                .chain(added.into_iter().map(Ok)),
        )
    }

    fn named_graphs(&self) -> GraphCursor<'_> {
        let committed = self.store.named_graphs().filter_map(|name| match name {
            Ok(NamedOrBlankNode::NamedNode(name)) => Some(Ok(name)),
            Ok(_) => None,
            Err(e) => Some(Err(e.into())),
        });
        if !self.staging() {
            return Box::new(committed);
        }
        let created: Vec<NamedNode> = match self.pending() {
            Ok(pending) => pending.created_graphs.iter().cloned().collect(),
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        Box::new(
            committed
                .filter(move |name| name.as_ref().map_or(true, |n| !self.is_dropped(n)))
                .chain(created.into_iter().map(Ok)),
        )
    }

    fn contains_named_graph(&self, name: NamedNodeRef<'_>) -> Result<bool> {
        if self.staging() {
            let pending = self.pending()?;
            let name = name.into_owned();
            if pending.created_graphs.contains(&name) {
                return Ok(true);
            }
            if pending.dropped_graphs.contains(&name) {
                return Ok(false);
            }
        }
        Ok(self.store.contains_named_graph(name)?)
    }

    fn insert_named_graph(&self, name: NamedNodeRef<'_>) -> Result<bool> {
        if !self.staging() {
            return Ok(self.store.insert_named_graph(name)?);
        }
        if self.contains_named_graph(name)? {
            return Ok(false);
        }
        let mut pending = self.pending()?;
        let name = name.into_owned();
        if !pending.dropped_graphs.remove(&name) {
            pending.created_graphs.insert(name);
        }
        Ok(true)
    }

    fn remove_named_graph(&self, name: NamedNodeRef<'_>) -> Result<bool> {
        if !self.staging() {
            return Ok(self.store.remove_named_graph(name)?);
        }
        if !self.contains_named_graph(name)? {
            return Ok(false);
        }
        self.clear_graph(GraphNameRef::NamedNode(name))?;
        let mut pending = self.pending()?;
        let name = name.into_owned();
        if !pending.created_graphs.remove(&name) {
            pending.dropped_graphs.insert(name);
        }
        Ok(true)
    }

    fn clear_graph(&self, graph_name: GraphNameRef<'_>) -> Result<()> {
        if !self.staging() {
            return Ok(self.store.clear_graph(graph_name)?);
        }
        let quads = self
            .quads_for_pattern(None, None, None, Some(graph_name))
            .collect::<Result<Vec<_>>>()?;
        for quad in &quads {
            self.remove(quad.as_ref())?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if !self.staging() {
            return Ok(self.store.clear()?);
        }
        let names = self.named_graphs().collect::<Result<Vec<_>>>()?;
        for name in names {
            self.remove_named_graph(name.as_ref())?;
        }
        self.clear_graph(GraphNameRef::DefaultGraph)
    }

    fn flush(&self) -> Result<()> {
        self.store
            .flush()
            .map_err(|e| anyhow!("Failed to flush store: {}", e))
    }

    /// Queries see committed data only.
    fn query(&self, sparql: &str, bindings: &[(String, Term)]) -> Result<QueryOutcome> {
        query::evaluate(&self.store, sparql, bindings)
    }
}

#[derive(Default)]
struct MemoryData {
    quads: QuadSet,
    graphs: BTreeSet<NamedNode>,
}

/// In-memory quad set without transaction support: every call is applied immediately
/// and the transaction guard runs operations directly against it.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> Result<MutexGuard<'_, MemoryData>> {
        self.data
            .lock()
            .map_err(|_| anyhow!("Failed to lock in-memory dataset"))
    }

    /// Copies the quads into a scratch oxigraph store, used for query evaluation.
    fn staging_store(&self) -> Result<Store> {
        let data = self.data()?;
        let store = Store::new()?;
        for name in &data.graphs {
            store.insert_named_graph(name.as_ref())?;
        }
        let quads: Vec<Quad> = data.quads.iter().map(|q| q.into_owned()).collect();
        let mut loader = store.bulk_loader();
        loader.load_quads(quads.into_iter())?;
        loader.commit()?;
        Ok(store)
    }
}

impl Transactional for MemoryStore {
    fn supports_transactions(&self) -> bool {
        false
    }

    fn active_mode(&self) -> Option<TxMode> {
        None
    }

    fn begin(&self, _mode: TxMode) -> Result<Transaction<'_>> {
        Err(DatasetError::TransactionsUnsupported.into())
    }
}

impl QuadStore for MemoryStore {
    fn store_type(&self) -> &'static str {
        "memory"
    }

    fn location(&self) -> Option<&Path> {
        None
    }

    fn len(&self) -> Result<usize> {
        Ok(self.data()?.quads.len())
    }

    fn contains(&self, quad: QuadRef<'_>) -> Result<bool> {
        Ok(self.data()?.quads.contains(quad))
    }

    fn insert(&self, quad: QuadRef<'_>) -> Result<bool> {
        let mut data = self.data()?;
        if let GraphNameRef::NamedNode(name) = quad.graph_name {
            data.graphs.insert(name.into_owned());
        }
        Ok(data.quads.insert(quad))
    }

    fn remove(&self, quad: QuadRef<'_>) -> Result<bool> {
        Ok(self.data()?.quads.remove(quad))
    }

    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<NamedOrBlankNodeRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
        graph_name: Option<GraphNameRef<'_>>,
    ) -> QuadCursor<'a> {
        let data = match self.data() {
            Ok(data) => data,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        // Start from the most selective index the quad set offers, then check the rest.
        let candidates: Box<dyn Iterator<Item = QuadRef<'_>> + '_> = if let Some(s) = subject {
            Box::new(data.quads.quads_for_subject(s))
        } else if let Some(o) = object {
            Box::new(data.quads.quads_for_object(o))
        } else if let Some(p) = predicate {
            Box::new(data.quads.quads_for_predicate(p))
        } else if let Some(g) = graph_name {
            Box::new(data.quads.quads_for_graph_name(g))
        } else {
            Box::new(data.quads.iter())
        };
        // Collected eagerly: the data mutex is released before the cursor is returned.
        let matched: Vec<Quad> = candidates
            .filter(|q| matches_pattern(*q, subject, predicate, object, graph_name))
            .map(|q| q.into_owned())
            .collect();
        Box::new(matched.into_iter().map(Ok))
    }

    fn named_graphs(&self) -> GraphCursor<'_> {
        match self.data() {
            Ok(data) => {
                let names: Vec<NamedNode> = data.graphs.iter().cloned().collect();
                Box::new(names.into_iter().map(Ok))
            }
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn contains_named_graph(&self, name: NamedNodeRef<'_>) -> Result<bool> {
        Ok(self.data()?.graphs.contains(&name.into_owned()))
    }

    fn insert_named_graph(&self, name: NamedNodeRef<'_>) -> Result<bool> {
        Ok(self.data()?.graphs.insert(name.into_owned()))
    }

    fn remove_named_graph(&self, name: NamedNodeRef<'_>) -> Result<bool> {
        let mut data = self.data()?;
        let existed = data.graphs.remove(&name.into_owned());
        let quads: Vec<Quad> = data
            .quads
            .quads_for_graph_name(GraphNameRef::NamedNode(name))
            .map(|q| q.into_owned())
            .collect();
        for quad in &quads {
            data.quads.remove(quad);
        }
        Ok(existed)
    }

    fn clear_graph(&self, graph_name: GraphNameRef<'_>) -> Result<()> {
        let mut data = self.data()?;
        let quads: Vec<Quad> = data
            .quads
            .quads_for_graph_name(graph_name)
            .map(|q| q.into_owned())
            .collect();
        for quad in &quads {
            data.quads.remove(quad);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut data = self.data()?;
        data.quads.clear();
        data.graphs.clear();
        Ok(())
    }

    fn query(&self, sparql: &str, bindings: &[(String, Term)]) -> Result<QueryOutcome> {
        let store = self.staging_store()?;
        query::evaluate(&store, sparql, bindings)
    }
}
