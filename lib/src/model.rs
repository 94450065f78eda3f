//! Term model used throughout the crate. Terms, triples and quads are oxigraph's; this
//! module adds graph selection, statement patterns and the translation between the
//! API-level "no graph name" and the storage engine's default graph.

use crate::consts::DEFAULT_GRAPH;
use crate::options::UnionWithDefault;
pub use oxigraph::model::{
    BlankNode, GraphName, GraphNameRef, Literal, NamedNode, NamedNodeRef, NamedOrBlankNode,
    Quad, Term, Triple,
};

/// Identifies the graph a view is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphSelector {
    Default,
    Named {
        name: NamedNode,
        union_with_default: bool,
    },
}

impl GraphSelector {
    pub fn named(name: NamedNode, union: UnionWithDefault) -> Self {
        GraphSelector::Named {
            name,
            union_with_default: union.is_enabled(),
        }
    }

    /// The graph name as seen by callers; `None` is the default graph.
    pub fn name(&self) -> Option<&NamedNode> {
        match self {
            GraphSelector::Default => None,
            GraphSelector::Named { name, .. } => Some(name),
        }
    }

    pub fn is_union(&self) -> bool {
        matches!(
            self,
            GraphSelector::Named {
                union_with_default: true,
                ..
            }
        )
    }

    /// Graph every write through this selector lands in. Union views write to
    /// the named graph only.
    pub fn write_target(&self) -> GraphName {
        match self {
            GraphSelector::Default => GraphName::DefaultGraph,
            GraphSelector::Named { name, .. } => GraphName::NamedNode(name.clone()),
        }
    }

    /// Scope used for reads through this selector.
    pub fn read_scope(&self) -> GraphScope {
        match self {
            GraphSelector::Default => GraphScope::Default,
            GraphSelector::Named {
                name,
                union_with_default: true,
            } => GraphScope::UnionWithDefault(name.clone()),
            GraphSelector::Named { name, .. } => GraphScope::Named(name.clone()),
        }
    }
}

impl std::fmt::Display for GraphSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            GraphSelector::Default => write!(f, "default graph"),
            GraphSelector::Named { name, .. } => write!(f, "{}", name.as_str()),
        }
    }
}

/// Which graphs a lookup runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphScope {
    Default,
    Named(NamedNode),
    /// The named graph merged with the default graph, computed per lookup.
    UnionWithDefault(NamedNode),
    /// Every graph of the dataset. Only the dataset-wide entry points use it.
    All,
}

impl GraphScope {
    /// Scope for a graph name coming from a statement or pattern; a missing name
    /// means the default graph, never "all graphs".
    pub fn from_graph_name(graph_name: &GraphName) -> Self {
        match graph_name {
            GraphName::NamedNode(name) => GraphScope::Named(name.clone()),
            _ => GraphScope::Default,
        }
    }
}

/// Triple pattern; `None` positions are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    pub subject: Option<NamedOrBlankNode>,
    pub predicate: Option<NamedNode>,
    pub object: Option<Term>,
}

impl TriplePattern {
    pub fn new(
        subject: Option<NamedOrBlankNode>,
        predicate: Option<NamedNode>,
        object: Option<Term>,
    ) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// A pattern matching everything.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_wildcard(&self) -> bool {
        self.subject.is_none() && self.predicate.is_none() && self.object.is_none()
    }

    pub fn in_scope(self, graph: GraphScope) -> QuadPattern {
        QuadPattern {
            triple: self,
            graph,
        }
    }
}

/// Triple pattern bound to a graph scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuadPattern {
    pub triple: TriplePattern,
    pub graph: GraphScope,
}

impl QuadPattern {
    /// Pattern over every graph of the dataset.
    pub fn all_graphs(triple: TriplePattern) -> Self {
        triple.in_scope(GraphScope::All)
    }
}

/// Translates an API-level graph name into the engine's graph name. `None` and the
/// reserved default-graph IRI both map to the default graph.
pub fn graph_name_for(name: Option<&NamedNode>) -> GraphName {
    match name {
        Some(name) if !is_default_graph_iri(name.as_ref()) => GraphName::NamedNode(name.clone()),
        _ => GraphName::DefaultGraph,
    }
}

/// Reverse of `graph_name_for`.
pub fn name_of_graph(graph_name: &GraphName) -> Option<&NamedNode> {
    match graph_name {
        GraphName::NamedNode(name) => Some(name),
        _ => None,
    }
}

pub fn is_default_graph_iri(name: NamedNodeRef<'_>) -> bool {
    name == DEFAULT_GRAPH
}

pub fn triple_of(quad: Quad) -> Triple {
    Triple::new(quad.subject, quad.predicate, quad.object)
}

pub fn quad_in(triple: Triple, graph_name: GraphName) -> Quad {
    Quad::new(triple.subject, triple.predicate, triple.object, graph_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_iri_maps_to_default_graph() {
        let reserved = NamedNode::new(DEFAULT_GRAPH.as_str()).unwrap();
        assert_eq!(graph_name_for(Some(&reserved)), GraphName::DefaultGraph);
        assert_eq!(graph_name_for(None), GraphName::DefaultGraph);

        let g = NamedNode::new("http://example.com/g").unwrap();
        assert_eq!(
            graph_name_for(Some(&g)),
            GraphName::NamedNode(g.clone())
        );
        assert_eq!(name_of_graph(&GraphName::NamedNode(g.clone())), Some(&g));
    }

    #[test]
    fn union_selector_writes_to_named_graph() {
        let g = NamedNode::new("http://example.com/g").unwrap();
        let selector = GraphSelector::named(g.clone(), UnionWithDefault::Enabled);
        assert!(selector.is_union());
        assert_eq!(selector.write_target(), GraphName::NamedNode(g.clone()));
        assert_eq!(selector.read_scope(), GraphScope::UnionWithDefault(g));
        assert_eq!(GraphSelector::Default.read_scope(), GraphScope::Default);
    }

    #[test]
    fn missing_graph_name_is_default_scope() {
        assert_eq!(
            GraphScope::from_graph_name(&GraphName::DefaultGraph),
            GraphScope::Default
        );
        assert!(TriplePattern::any().is_wildcard());
    }
}
