//! Statement-level operations on one graph of a dataset.

use crate::convert::{to_triple, to_triple_pattern, HostValue};
use crate::dataset::Dataset;
use crate::errors::DatasetError;
use crate::model::{quad_in, GraphScope, GraphSelector, NamedNode, Triple, TriplePattern};
use crate::pattern::{self, Triples};
use crate::transaction::{in_transaction, TxMode};
use crate::util::{load_file, load_reader, stream_origin, LoadTarget};
use anyhow::Result;
use log::debug;
use oxigraph::io::RdfFormat;
use oxigraph::model::Quad;
use std::io::Read;
use std::path::Path;

/// Handle on one graph of a [`Dataset`]: the default graph, a named graph, or a named
/// graph read together with the default graph. Views are cheap and hold no transaction.
#[derive(Clone)]
pub struct GraphView<'a> {
    dataset: &'a Dataset,
    selector: GraphSelector,
}

impl std::fmt::Debug for GraphView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphView")
            .field("selector", &self.selector)
            .finish()
    }
}

impl<'a> GraphView<'a> {
    pub(crate) fn new(dataset: &'a Dataset, selector: GraphSelector) -> Self {
        Self { dataset, selector }
    }

    /// `None` for the default graph.
    pub fn graph_name(&self) -> Option<&NamedNode> {
        self.selector.name()
    }

    pub fn is_union(&self) -> bool {
        self.selector.is_union()
    }

    pub fn is_durable(&self) -> bool {
        self.dataset.is_durable()
    }

    fn read_scope(&self) -> GraphScope {
        self.selector.read_scope()
    }

    fn write_scope(&self) -> GraphScope {
        GraphScope::from_graph_name(&self.selector.write_target())
    }

    fn read<T>(&self, body: impl FnOnce() -> Result<T>) -> Result<T> {
        in_transaction(self.dataset.store(), TxMode::Read, body)
    }

    fn write<T>(&self, body: impl FnOnce() -> Result<T>) -> Result<T> {
        in_transaction(self.dataset.store(), TxMode::Write, || {
            self.ensure_exists()?;
            body()
        })
    }

    // The named graph may have been deleted since this view was resolved.
    fn ensure_exists(&self) -> Result<()> {
        match self.selector.name() {
            Some(name) if !self.dataset.store().contains_named_graph(name.as_ref())? => {
                Err(DatasetError::GraphNotFound(name.as_str().to_string()).into())
            }
            _ => Ok(()),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.read(|| {
            let mut found = self.find_pattern(&TriplePattern::any())?;
            Ok(found.next().transpose()?.is_none())
        })
    }

    /// Exact number of triples; a union view counts distinct triples.
    pub fn count(&self) -> Result<usize> {
        self.read(|| pattern::count(self.dataset.store(), &self.read_scope()))
    }

    /// False when `statement` cannot be converted.
    pub fn contains<V: HostValue>(&self, statement: &V) -> Result<bool> {
        match to_triple(statement) {
            Some(triple) => self.contains_triple(&triple),
            None => Ok(false),
        }
    }

    pub fn contains_triple(&self, triple: &Triple) -> Result<bool> {
        self.read(|| pattern::contains(self.dataset.store(), triple, &self.read_scope()))
    }

    /// Returns false when `statement` cannot be converted or is already present.
    pub fn insert<V: HostValue>(&self, statement: &V) -> Result<bool> {
        match to_triple(statement) {
            Some(triple) => self.insert_triple(triple),
            None => {
                debug!("Skipping unconvertible statement for {}", self.selector);
                Ok(false)
            }
        }
    }

    pub fn insert_triple(&self, triple: Triple) -> Result<bool> {
        let quad = self.target_quad(triple);
        self.write(|| self.dataset.store().insert(quad.as_ref()))
    }

    /// Inserts every element of `statements` under one write transaction. The sequence
    /// ending is normal termination; an `Err` element rolls back everything inserted so
    /// far. Returns the number of statements actually added.
    pub fn insert_many<V, I>(&self, statements: I) -> Result<usize>
    where
        V: HostValue,
        I: IntoIterator<Item = Result<V>>,
    {
        self.write(|| {
            let store = self.dataset.store();
            let mut inserted = 0;
            for statement in statements {
                let Some(triple) = to_triple(&statement?) else {
                    continue;
                };
                if store.insert(self.target_quad(triple).as_ref())? {
                    inserted += 1;
                }
            }
            debug!("Inserted {} statements into {}", inserted, self.selector);
            Ok(inserted)
        })
    }

    /// Removes every triple matching `pattern`; unconvertible positions are wildcards and
    /// an unconvertible pattern removes nothing. Returns the number removed.
    pub fn delete<V: HostValue>(&self, pattern: &V) -> Result<usize> {
        match to_triple_pattern(pattern) {
            Some(pattern) => self.delete_pattern(&pattern),
            None => Ok(0),
        }
    }

    pub fn delete_pattern(&self, pattern: &TriplePattern) -> Result<usize> {
        self.write(|| {
            let store = self.dataset.store();
            let matches: Vec<Quad> =
                pattern::find(store, &pattern.clone().in_scope(self.write_scope()))?
                    .collect::<Result<_>>()?;
            let mut removed = 0;
            for quad in &matches {
                if store.remove(quad.as_ref())? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    /// Empties the graph. A union view clears only its named graph.
    pub fn clear(&self) -> Result<()> {
        let target = self.selector.write_target();
        self.write(|| self.dataset.store().clear_graph(target.as_ref()))
    }

    /// Lazy iteration over the graph's triples under its own read transaction.
    pub fn iter(&self) -> Result<Triples<'a>> {
        self.find_pattern(&TriplePattern::any())
    }

    /// Triples matching a host pattern; an unconvertible pattern matches nothing.
    pub fn find<V: HostValue>(&self, pattern: &V) -> Result<Triples<'a>> {
        match to_triple_pattern(pattern) {
            Some(pattern) => self.find_pattern(&pattern),
            None => Ok(pattern::Quads::empty().triples()),
        }
    }

    pub fn find_pattern(&self, pattern: &TriplePattern) -> Result<Triples<'a>> {
        let dataset: &'a Dataset = self.dataset;
        Ok(pattern::find(dataset.store(), &pattern.clone().in_scope(self.read_scope()))?.triples())
    }

    /// Parses `reader` (N-Triples unless `format` says otherwise) into this graph.
    pub fn insert_reader<R: Read>(&self, reader: R, format: Option<RdfFormat>) -> Result<usize> {
        let target = self.selector.write_target();
        self.write(|| {
            load_reader(
                self.dataset.store(),
                reader,
                format.unwrap_or(RdfFormat::NTriples),
                LoadTarget::Graph(target.as_ref()),
                &stream_origin(),
            )
        })
    }

    /// Loads a file into this graph, guessing the format from its extension.
    pub fn insert_file(&self, path: &Path) -> Result<usize> {
        let target = self.selector.write_target();
        self.write(|| {
            load_file(
                self.dataset.store(),
                path,
                None,
                RdfFormat::NTriples,
                LoadTarget::Graph(target.as_ref()),
            )
        })
    }

    fn target_quad(&self, triple: Triple) -> Quad {
        quad_in(triple, self.selector.write_target())
    }
}
