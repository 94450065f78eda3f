//! Pattern matching over a quad store: lazy result cursors bound to the read transaction
//! they were opened under, and the union-with-default-graph merge.

use crate::io::{QuadCursor, QuadStore};
use crate::model::{triple_of, GraphScope, NamedNode, Quad, QuadPattern, Triple, TriplePattern};
use crate::transaction::{enter, Transaction, TxMode};
use anyhow::Result;
use oxigraph::model::{GraphName, GraphNameRef, NamedNodeRef, NamedOrBlankNodeRef, TermRef};

/// Lazy sequence of quads matching a pattern. Holds a read transaction (when the store
/// has them and none was already active) until dropped.
pub struct Quads<'a> {
    // declared first so the cursor is dropped before its transaction ends
    cursor: QuadCursor<'a>,
    _txn: Option<Transaction<'a>>,
}

impl<'a> Iterator for Quads<'a> {
    type Item = Result<Quad>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next()
    }
}

/// Quads with their graph names dropped.
pub struct Triples<'a> {
    quads: Quads<'a>,
}

impl<'a> Iterator for Triples<'a> {
    type Item = Result<Triple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.quads.next().map(|quad| quad.map(triple_of))
    }
}

impl<'a> Quads<'a> {
    /// A cursor yielding nothing, for patterns that could not be converted.
    pub fn empty() -> Self {
        Quads {
            cursor: Box::new(std::iter::empty()),
            _txn: None,
        }
    }

    pub fn triples(self) -> Triples<'a> {
        Triples { quads: self }
    }
}

/// Opens a cursor over every quad matching `pattern`.
pub fn find<'a>(store: &'a dyn QuadStore, pattern: &QuadPattern) -> Result<Quads<'a>> {
    let txn = enter(store, TxMode::Read)?;
    Ok(Quads {
        cursor: cursor_for(store, &pattern.triple, &pattern.graph),
        _txn: txn,
    })
}

struct Positions<'p> {
    subject: Option<NamedOrBlankNodeRef<'p>>,
    predicate: Option<NamedNodeRef<'p>>,
    object: Option<TermRef<'p>>,
}

impl<'p> From<&'p TriplePattern> for Positions<'p> {
    fn from(pattern: &'p TriplePattern) -> Self {
        Positions {
            subject: pattern.subject.as_ref().map(|s| s.as_ref()),
            predicate: pattern.predicate.as_ref().map(|p| p.as_ref()),
            object: pattern.object.as_ref().map(|o| o.as_ref()),
        }
    }
}

fn cursor_for<'a>(
    store: &'a dyn QuadStore,
    pattern: &TriplePattern,
    scope: &GraphScope,
) -> QuadCursor<'a> {
    let at = Positions::from(pattern);
    match scope {
        GraphScope::Default => store.quads_for_pattern(
            at.subject,
            at.predicate,
            at.object,
            Some(GraphNameRef::DefaultGraph),
        ),
        GraphScope::Named(name) => store.quads_for_pattern(
            at.subject,
            at.predicate,
            at.object,
            Some(GraphNameRef::NamedNode(name.as_ref())),
        ),
        GraphScope::All => store.quads_for_pattern(at.subject, at.predicate, at.object, None),
        GraphScope::UnionWithDefault(name) => {
            let named = store.quads_for_pattern(
                at.subject,
                at.predicate,
                at.object,
                Some(GraphNameRef::NamedNode(name.as_ref())),
            );
            let defaults = store.quads_for_pattern(
                at.subject,
                at.predicate,
                at.object,
                Some(GraphNameRef::DefaultGraph),
            );
            Box::new(named.chain(shadowed_by(store, defaults, name.clone())))
        }
    }
}

// Default-graph quads whose triple is not also in `name`, so the union has no duplicates.
fn shadowed_by<'a>(
    store: &'a dyn QuadStore,
    defaults: QuadCursor<'a>,
    name: NamedNode,
) -> impl Iterator<Item = Result<Quad>> + 'a {
    defaults.filter_map(move |quad| {
        let quad = match quad {
            Ok(quad) => quad,
            Err(e) => return Some(Err(e)),
        };
        let twin = Quad::new(
            quad.subject.clone(),
            quad.predicate.clone(),
            quad.object.clone(),
            GraphName::NamedNode(name.clone()),
        );
        match store.contains(twin.as_ref()) {
            Ok(true) => None,
            Ok(false) => Some(Ok(quad)),
            Err(e) => Some(Err(e)),
        }
    })
}

/// Number of statements in `scope`. The caller owns the transaction.
pub fn count(store: &dyn QuadStore, scope: &GraphScope) -> Result<usize> {
    match scope {
        GraphScope::Default => store.graph_len(GraphNameRef::DefaultGraph),
        GraphScope::Named(name) => store.graph_len(GraphNameRef::NamedNode(name.as_ref())),
        GraphScope::All => store.len(),
        GraphScope::UnionWithDefault(_) => {
            let mut total = 0usize;
            for quad in cursor_for(store, &TriplePattern::any(), scope) {
                quad?;
                total += 1;
            }
            Ok(total)
        }
    }
}

/// Membership of a concrete triple in `scope`. The caller owns the transaction.
pub fn contains(store: &dyn QuadStore, triple: &Triple, scope: &GraphScope) -> Result<bool> {
    let in_graph = |graph_name: GraphName| {
        store.contains(
            Quad::new(
                triple.subject.clone(),
                triple.predicate.clone(),
                triple.object.clone(),
                graph_name,
            )
            .as_ref(),
        )
    };
    match scope {
        GraphScope::Default => in_graph(GraphName::DefaultGraph),
        GraphScope::Named(name) => in_graph(GraphName::NamedNode(name.clone())),
        GraphScope::UnionWithDefault(name) => {
            Ok(in_graph(GraphName::NamedNode(name.clone()))? || in_graph(GraphName::DefaultGraph)?)
        }
        GraphScope::All => {
            let mut hits = store.quads_for_pattern(
                Some(triple.subject.as_ref()),
                Some(triple.predicate.as_ref()),
                Some(triple.object.as_ref()),
                None,
            );
            Ok(hits.next().transpose()?.is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryStore, PersistentStore};
    use crate::model::Literal;
    use crate::transaction::Transactional;

    fn triple(o: &str) -> Triple {
        Triple::new(
            NamedNode::new("http://example.com/s").unwrap(),
            NamedNode::new("http://example.com/p").unwrap(),
            Literal::new_simple_literal(o),
        )
    }

    fn fill(store: &dyn QuadStore, g: &NamedNode) {
        for o in ["shared", "default-only"] {
            let t = triple(o);
            store
                .insert(crate::model::quad_in(t, GraphName::DefaultGraph).as_ref())
                .unwrap();
        }
        for o in ["shared", "named-only"] {
            let t = triple(o);
            store
                .insert(crate::model::quad_in(t, GraphName::NamedNode(g.clone())).as_ref())
                .unwrap();
        }
    }

    fn check_union(store: &dyn QuadStore) {
        let g = NamedNode::new("http://example.com/g").unwrap();
        fill(store, &g);
        let scope = GraphScope::UnionWithDefault(g.clone());
        let found: Vec<Triple> = find(store, &TriplePattern::any().in_scope(scope.clone()))
            .unwrap()
            .triples()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(count(store, &scope).unwrap(), 3);
        assert!(contains(store, &triple("default-only"), &scope).unwrap());
        assert!(!contains(store, &triple("default-only"), &GraphScope::Named(g)).unwrap());
        assert_eq!(count(store, &GraphScope::All).unwrap(), 4);
        assert!(contains(store, &triple("named-only"), &GraphScope::All).unwrap());
    }

    #[test]
    fn union_merges_without_duplicates() {
        check_union(&PersistentStore::new_temporary().unwrap());
        check_union(&MemoryStore::new());
    }

    #[test]
    fn cursor_holds_read_transaction() {
        let store = PersistentStore::new_temporary().unwrap();
        let quads = find(&store, &QuadPattern::all_graphs(TriplePattern::any())).unwrap();
        assert_eq!(store.active_mode(), Some(TxMode::Read));
        drop(quads);
        assert!(!store.is_in_transaction());
    }
}
