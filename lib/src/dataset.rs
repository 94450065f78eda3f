//! A dataset: one default graph plus any number of named graphs on top of a quad store.
//! Resolves graph names to [`GraphView`]s, manages graph lifecycle and offers the
//! dataset-wide statement operations.

use crate::config::Config;
use crate::consts::CONFIG_FILE;
use crate::convert::{to_pattern, to_quad, HostValue};
use crate::errors::DatasetError;
use crate::graph::GraphView;
use crate::io::{GraphCursor, MemoryStore, PersistentStore, QuadStore, StoreStats};
use crate::model::{
    graph_name_for, GraphName, GraphSelector, NamedNode, Quad, QuadPattern, Term,
    TriplePattern,
};
use crate::options::{Backend, UnionWithDefault};
use crate::pattern::{self, Quads};
use crate::query::QueryOutcome;
use crate::transaction::{enter, in_transaction, Transaction, TxMode};
use crate::util::{load_file, load_reader, stream_origin, LoadTarget};
use anyhow::{anyhow, Result};
use log::{debug, info};
use oxigraph::io::RdfFormat;
use std::io::Read;
use std::path::Path;

pub struct Dataset {
    config: Config,
    store: Box<dyn QuadStore>,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("root", &self.config.root)
            .field("store_type", &self.store.store_type())
            .finish()
    }
}

impl Dataset {
    /// Opens the dataset described by `config`. A durable dataset creates its directory,
    /// writes its configuration there and locks it for this process. The memory backend
    /// keeps nothing on disk, so it must be opened as temporary.
    pub fn open(config: Config) -> Result<Self> {
        let store: Box<dyn QuadStore> = match (config.backend, config.temporary) {
            (Backend::Memory, true) => Box::new(MemoryStore::new()),
            (Backend::Memory, false) => {
                return Err(anyhow!(
                    "the memory backend cannot persist a dataset at {}; open it as temporary",
                    config.root.display()
                ))
            }
            (Backend::Persistent, true) => Box::new(PersistentStore::new_temporary()?),
            (Backend::Persistent, false) => {
                std::fs::create_dir_all(&config.root)?;
                let store = PersistentStore::open(&config.root)?;
                config.save_to_file(&config.config_path())?;
                Box::new(store)
            }
        };
        info!(
            "Opened {} dataset at {}",
            store.store_type(),
            config.root.display()
        );
        Ok(Self { config, store })
    }

    /// Reopens a dataset directory using the configuration saved in it, or a default
    /// persistent configuration if there is none.
    pub fn open_dir(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE);
        let mut config = if config_path.exists() {
            Config::from_file(&config_path)?
        } else {
            Config::builder().root(root).build()?
        };
        config.root = root.to_path_buf();
        Self::open(config)
    }

    /// A throwaway dataset on the non-transactional in-memory backend.
    pub fn in_memory() -> Result<Self> {
        let config = Config::builder()
            .root(".")
            .backend(Backend::Memory)
            .temporary(true)
            .build()?;
        Self::open(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &dyn QuadStore {
        &*self.store
    }

    pub fn is_durable(&self) -> bool {
        self.store.is_durable()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        in_transaction(self.store(), TxMode::Read, || self.store.stats())
    }

    /// Flushes and releases the store, including its directory lock.
    pub fn close(self) -> Result<()> {
        self.store.flush()?;
        info!("Closed dataset at {}", self.config.root.display());
        Ok(())
    }

    fn read<T>(&self, body: impl FnOnce() -> Result<T>) -> Result<T> {
        in_transaction(self.store(), TxMode::Read, body)
    }

    fn write<T>(&self, body: impl FnOnce() -> Result<T>) -> Result<T> {
        in_transaction(self.store(), TxMode::Write, body)
    }

    fn selector_for(&self, name: Option<&NamedNode>, union: UnionWithDefault) -> GraphSelector {
        match graph_name_for(name) {
            GraphName::NamedNode(name) => GraphSelector::named(name, union),
            _ => GraphSelector::Default,
        }
    }

    /// Resolves a graph name to a view. `None` (or the reserved default-graph IRI) is the
    /// default graph; a named graph must exist.
    pub fn resolve_graph(
        &self,
        name: Option<&NamedNode>,
        union: UnionWithDefault,
    ) -> Result<GraphView<'_>> {
        let selector = self.selector_for(name, union);
        if let Some(name) = selector.name() {
            if !self.read(|| self.store.contains_named_graph(name.as_ref()))? {
                return Err(DatasetError::GraphNotFound(name.as_str().to_string()).into());
            }
        }
        Ok(GraphView::new(self, selector))
    }

    /// Named graph view using the configured union flag.
    pub fn graph(&self, name: &NamedNode) -> Result<GraphView<'_>> {
        self.resolve_graph(Some(name), self.config.union_default_graph)
    }

    pub fn default_graph(&self) -> GraphView<'_> {
        GraphView::new(self, GraphSelector::Default)
    }

    /// The default graph always exists.
    pub fn has_graph(&self, name: Option<&NamedNode>) -> Result<bool> {
        match self.selector_for(name, UnionWithDefault::Disabled).name() {
            Some(name) => self.read(|| self.store.contains_named_graph(name.as_ref())),
            None => Ok(true),
        }
    }

    /// Number of named graphs.
    pub fn graph_count(&self) -> Result<usize> {
        self.read(|| {
            let mut count = 0;
            for name in self.store.named_graphs() {
                name?;
                count += 1;
            }
            Ok(count)
        })
    }

    pub fn graph_names(&self) -> Result<Vec<NamedNode>> {
        self.read(|| self.store.named_graphs().collect())
    }

    /// Lazily yields a view per named graph, all under one read transaction.
    pub fn each_graph(&self) -> Result<Graphs<'_>> {
        let txn = enter(self.store(), TxMode::Read)?;
        Ok(Graphs {
            names: self.store.named_graphs(),
            dataset: self,
            union: self.config.union_default_graph,
            _txn: txn,
        })
    }

    /// Creates a named graph and fills it. Fails with `GraphAlreadyExists` if the graph
    /// exists; the default graph always does.
    pub fn insert_graph<V, I>(&self, name: Option<&NamedNode>, statements: I) -> Result<GraphView<'_>>
    where
        V: HostValue,
        I: IntoIterator<Item = Result<V>>,
    {
        let selector = self.selector_for(name, self.config.union_default_graph);
        self.write(|| {
            let Some(name) = selector.name() else {
                return Err(DatasetError::GraphAlreadyExists(selector.to_string()).into());
            };
            if !self.store.insert_named_graph(name.as_ref())? {
                return Err(DatasetError::GraphAlreadyExists(name.as_str().to_string()).into());
            }
            let view = GraphView::new(self, selector.clone());
            let inserted = view.insert_many(statements)?;
            info!("Created graph {} with {} statements", name.as_str(), inserted);
            Ok(view)
        })
    }

    /// Clears an existing graph and fills it with `statements`.
    pub fn replace_graph<V, I>(&self, name: Option<&NamedNode>, statements: I) -> Result<GraphView<'_>>
    where
        V: HostValue,
        I: IntoIterator<Item = Result<V>>,
    {
        let selector = self.selector_for(name, self.config.union_default_graph);
        self.write(|| {
            if let Some(name) = selector.name() {
                if !self.store.contains_named_graph(name.as_ref())? {
                    return Err(DatasetError::GraphNotFound(name.as_str().to_string()).into());
                }
            }
            let view = GraphView::new(self, selector.clone());
            view.clear()?;
            let inserted = view.insert_many(statements)?;
            info!("Replaced {} with {} statements", selector, inserted);
            Ok(view)
        })
    }

    /// Removes a named graph, or empties the default graph.
    pub fn delete_graph(&self, name: Option<&NamedNode>) -> Result<()> {
        let selector = self.selector_for(name, UnionWithDefault::Disabled);
        self.write(|| match selector.name() {
            Some(name) => {
                if !self.store.remove_named_graph(name.as_ref())? {
                    return Err(DatasetError::GraphNotFound(name.as_str().to_string()).into());
                }
                info!("Deleted graph {}", name.as_str());
                Ok(())
            }
            None => self.store.clear_graph(GraphName::DefaultGraph.as_ref()),
        })
    }

    /// Number of quads across all graphs.
    pub fn count(&self) -> Result<usize> {
        self.read(|| self.store.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.read(|| self.store.is_empty())
    }

    /// False when `statement` cannot be converted to a quad.
    pub fn contains<V: HostValue>(&self, statement: &V) -> Result<bool> {
        match to_quad(statement) {
            Some(quad) => self.contains_quad(&quad),
            None => Ok(false),
        }
    }

    pub fn contains_quad(&self, quad: &Quad) -> Result<bool> {
        self.read(|| self.store.contains(quad.as_ref()))
    }

    /// Returns false when `statement` cannot be converted or is already present.
    pub fn insert<V: HostValue>(&self, statement: &V) -> Result<bool> {
        match to_quad(statement) {
            Some(quad) => self.insert_quad(&quad),
            None => Ok(false),
        }
    }

    pub fn insert_quad(&self, quad: &Quad) -> Result<bool> {
        self.write(|| self.store.insert(quad.as_ref()))
    }

    /// Bulk insert under one write transaction; an `Err` element rolls back the batch.
    pub fn insert_many<V, I>(&self, statements: I) -> Result<usize>
    where
        V: HostValue,
        I: IntoIterator<Item = Result<V>>,
    {
        self.write(|| {
            let mut inserted = 0;
            for statement in statements {
                let Some(quad) = to_quad(&statement?) else {
                    continue;
                };
                if self.store.insert(quad.as_ref())? {
                    inserted += 1;
                }
            }
            debug!("Inserted {} quads", inserted);
            Ok(inserted)
        })
    }

    /// Removes the quads matching a host pattern (default graph unless it names one).
    pub fn delete<V: HostValue>(&self, pattern: &V) -> Result<usize> {
        match to_pattern(pattern) {
            Some(pattern) => self.delete_pattern(&pattern),
            None => Ok(0),
        }
    }

    pub fn delete_pattern(&self, pattern: &QuadPattern) -> Result<usize> {
        self.write(|| {
            let matches: Vec<Quad> = pattern::find(self.store(), pattern)?.collect::<Result<_>>()?;
            for quad in &matches {
                self.store.remove(quad.as_ref())?;
            }
            Ok(matches.len())
        })
    }

    /// Removes every quad and every named graph.
    pub fn clear(&self) -> Result<()> {
        self.write(|| self.store.clear())
    }

    /// Every quad of every graph.
    pub fn quads(&self) -> Result<Quads<'_>> {
        self.find_pattern(&QuadPattern::all_graphs(TriplePattern::any()))
    }

    /// Quads matching a host pattern; without a graph name only the default graph is
    /// searched. An unconvertible pattern matches nothing.
    pub fn find<V: HostValue>(&self, pattern: &V) -> Result<Quads<'_>> {
        match to_pattern(pattern) {
            Some(pattern) => self.find_pattern(&pattern),
            None => Ok(Quads::empty()),
        }
    }

    pub fn find_pattern(&self, pattern: &QuadPattern) -> Result<Quads<'_>> {
        pattern::find(self.store(), pattern)
    }

    /// Loads a file, guessing its format from the extension (N-Quads otherwise).
    pub fn insert_file(&self, path: &Path) -> Result<usize> {
        self.write(|| {
            load_file(
                self.store(),
                path,
                None,
                RdfFormat::NQuads,
                LoadTarget::Dataset,
            )
        })
    }

    pub fn insert_reader<R: Read>(&self, reader: R, format: Option<RdfFormat>) -> Result<usize> {
        self.write(|| {
            load_reader(
                self.store(),
                reader,
                format.unwrap_or(RdfFormat::NQuads),
                LoadTarget::Dataset,
                &stream_origin(),
            )
        })
    }

    /// Evaluates a SPARQL query over the whole dataset.
    pub fn query(&self, sparql: &str, bindings: &[(String, Term)]) -> Result<QueryOutcome> {
        self.read(|| self.store.query(sparql, bindings))
    }
}

/// Lazy sequence of graph views, one per named graph, read under a single transaction.
pub struct Graphs<'a> {
    names: GraphCursor<'a>,
    dataset: &'a Dataset,
    union: UnionWithDefault,
    _txn: Option<Transaction<'a>>,
}

impl<'a> Iterator for Graphs<'a> {
    type Item = Result<GraphView<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (dataset, union) = (self.dataset, self.union);
        let name = self.names.next()?;
        Some(name.map(|name| GraphView::new(dataset, GraphSelector::named(name, union))))
    }
}
