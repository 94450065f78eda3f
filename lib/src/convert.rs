//! Translation between host values and the term model.
//!
//! Host values are duck-typed: a value is a resource if it answers `uri?` / `anonymous?`,
//! a term if it answers `resource?` / `node?` / `literal?`, and so on. [`HostValue`]
//! captures exactly the capability checks the converter needs; `serde_json::Value` is
//! the provided implementation, where an object "responds to" a method if it has a key
//! of that name.
//!
//! Conversion never fails loudly. A value that cannot be converted yields `None` and the
//! caller decides what that means (a no-op write, a `false` membership check, or a
//! wildcard pattern position).

use crate::consts::{RDF_LANG_STRING, XSD_STRING};
use crate::model::{
    graph_name_for, quad_in, BlankNode, GraphName, GraphScope, Literal, NamedNode,
    NamedOrBlankNode, Quad, QuadPattern, Term, Triple, TriplePattern,
};
use serde_json::{json, Value};

/// Capability checks the converter performs on a host value.
pub trait HostValue: Sized {
    fn is_nil(&self) -> bool;

    /// Result of calling `method` on the value, or `None` if it does not respond to it.
    fn send(&self, method: &str) -> Option<Self>;

    fn as_host_bool(&self) -> Option<bool>;

    /// The value's string form (`to_s`).
    fn to_host_string(&self) -> String;
}

impl HostValue for Value {
    fn is_nil(&self) -> bool {
        self.is_null()
    }

    fn send(&self, method: &str) -> Option<Self> {
        self.as_object()?.get(method).cloned()
    }

    fn as_host_bool(&self) -> Option<bool> {
        self.as_bool()
    }

    fn to_host_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            Value::Object(map) => match map.get("to_s") {
                Some(s) => s.to_host_string(),
                None => self.to_string(),
            },
            other => other.to_string(),
        }
    }
}

fn iri_from(text: &str) -> Option<NamedNode> {
    NamedNode::new(text).ok()
}

fn blank_from(text: &str) -> Option<BlankNode> {
    BlankNode::new(text.strip_prefix("_:").unwrap_or(text)).ok()
}

/// Subject position: an IRI or a blank node.
pub fn to_resource<V: HostValue>(value: &V) -> Option<NamedOrBlankNode> {
    if value.is_nil() {
        return None;
    }
    let uri = value.send("uri?")?;
    let anonymous = value.send("anonymous?")?;
    if uri.as_host_bool()? {
        return iri_from(&value.to_host_string()).map(NamedOrBlankNode::from);
    }
    if anonymous.as_host_bool()? {
        let label = match value.send("id") {
            Some(id) if !id.is_nil() => id.to_host_string(),
            _ => value.to_host_string(),
        };
        return blank_from(&label).map(NamedOrBlankNode::from);
    }
    None
}

/// Predicate position: IRIs only.
pub fn to_property<V: HostValue>(value: &V) -> Option<NamedNode> {
    if value.is_nil() {
        return None;
    }
    if value.send("uri?")?.as_host_bool()? {
        iri_from(&value.to_host_string())
    } else {
        None
    }
}

/// Object position. Values without term capabilities become plain literals of their
/// string form.
pub fn to_term<V: HostValue>(value: &V) -> Option<Term> {
    if value.is_nil() {
        return None;
    }
    let (Some(resource), Some(node), Some(literal)) = (
        value.send("resource?"),
        value.send("node?"),
        value.send("literal?"),
    ) else {
        return Some(Literal::new_simple_literal(value.to_host_string()).into());
    };
    if resource.as_host_bool()? {
        if node.as_host_bool()? {
            let label = match value.send("id") {
                Some(id) if !id.is_nil() => id.to_host_string(),
                _ => value.to_host_string(),
            };
            return blank_from(&label).map(Term::from);
        }
        return iri_from(&value.to_host_string()).map(Term::from);
    }
    if literal.as_host_bool()? {
        return to_literal(value).map(Term::from);
    }
    None
}

fn to_literal<V: HostValue>(value: &V) -> Option<Literal> {
    let lexical = match value.send("value") {
        Some(v) if !v.is_nil() => v.to_host_string(),
        _ => value.to_host_string(),
    };
    let language = value
        .send("language")
        .filter(|l| !l.is_nil())
        .map(|l| l.to_host_string())
        .filter(|l| !l.is_empty());
    // a language tag wins over any datatype
    if let Some(language) = language {
        return Literal::new_language_tagged_literal(lexical, language).ok();
    }
    let datatype = value
        .send("datatype")
        .filter(|d| !d.is_nil())
        .map(|d| d.to_host_string());
    match datatype {
        None => Some(Literal::new_simple_literal(lexical)),
        Some(datatype) => {
            let datatype = iri_from(&datatype)?;
            if datatype.as_ref() == XSD_STRING {
                Some(Literal::new_simple_literal(lexical))
            } else if datatype.as_ref() == RDF_LANG_STRING {
                None
            } else {
                Some(Literal::new_typed_literal(lexical, datatype))
            }
        }
    }
}

/// Graph name of a statement. Nil and the reserved default-graph IRI both mean the
/// default graph; blank nodes cannot name graphs.
pub fn to_graph_name<V: HostValue>(value: &V) -> Option<GraphName> {
    if value.is_nil() {
        return Some(GraphName::DefaultGraph);
    }
    match to_resource(value)? {
        NamedOrBlankNode::NamedNode(name) => Some(graph_name_for(Some(&name))),
        NamedOrBlankNode::BlankNode(_) => None,
    }
}

pub fn to_triple<V: HostValue>(value: &V) -> Option<Triple> {
    if value.is_nil() {
        return None;
    }
    let subject = to_resource(&value.send("subject")?)?;
    let predicate = to_property(&value.send("predicate")?)?;
    let object = to_term(&value.send("object")?)?;
    Some(Triple::new(subject, predicate, object))
}

/// Like `to_triple`, but the value must also answer `graph_name`.
pub fn to_quad<V: HostValue>(value: &V) -> Option<Quad> {
    let triple = to_triple(value)?;
    let graph_name = to_graph_name(&value.send("graph_name")?)?;
    Some(quad_in(triple, graph_name))
}

/// Triple pattern for a graph view. Missing or unconvertible positions are wildcards;
/// any graph name on the value is ignored.
pub fn to_triple_pattern<V: HostValue>(value: &V) -> Option<TriplePattern> {
    if value.is_nil() {
        return None;
    }
    let subject = value.send("subject")?;
    let predicate = value.send("predicate")?;
    let object = value.send("object")?;
    Some(TriplePattern::new(
        to_resource(&subject),
        to_property(&predicate),
        to_term(&object),
    ))
}

/// Pattern for dataset-level lookups. An absent or nil graph name scopes the pattern
/// to the default graph; a graph name that is present but unconvertible makes the
/// whole pattern unconvertible.
pub fn to_pattern<V: HostValue>(value: &V) -> Option<QuadPattern> {
    let triple = to_triple_pattern(value)?;
    let scope = match value.send("graph_name") {
        Some(graph_name) if !graph_name.is_nil() => {
            GraphScope::from_graph_name(&to_graph_name(&graph_name)?)
        }
        _ => GraphScope::Default,
    };
    Some(triple.in_scope(scope))
}

fn iri_value(iri: &str) -> Value {
    json!({
        "uri?": true,
        "anonymous?": false,
        "resource?": true,
        "node?": false,
        "literal?": false,
        "to_s": iri,
    })
}

fn blank_value(id: &str) -> Value {
    json!({
        "uri?": false,
        "anonymous?": true,
        "resource?": true,
        "node?": true,
        "literal?": false,
        "id": id,
        "to_s": format!("_:{id}"),
    })
}

fn literal_value(literal: &Literal) -> Value {
    json!({
        "resource?": false,
        "node?": false,
        "literal?": true,
        "value": literal.value(),
        "datatype": iri_value(literal.datatype().as_str()),
        "language": literal.language(),
        "to_s": literal.value(),
    })
}

pub fn resource_to_host(resource: &NamedOrBlankNode) -> Value {
    match resource {
        NamedOrBlankNode::NamedNode(node) => iri_value(node.as_str()),
        NamedOrBlankNode::BlankNode(node) => blank_value(node.as_str()),
    }
}

pub fn term_to_host(term: &Term) -> Value {
    match term {
        Term::NamedNode(node) => iri_value(node.as_str()),
        Term::BlankNode(node) => blank_value(node.as_str()),
        Term::Literal(literal) => literal_value(literal),
    }
}

pub fn triple_to_host(triple: &Triple) -> Value {
    json!({
        "subject": resource_to_host(&triple.subject),
        "predicate": iri_value(triple.predicate.as_str()),
        "object": term_to_host(&triple.object),
    })
}

/// Exports a quad; the default graph is exported as a nil graph name.
pub fn quad_to_host(quad: &Quad) -> Value {
    let graph_name = match &quad.graph_name {
        GraphName::NamedNode(name) => iri_value(name.as_str()),
        GraphName::BlankNode(node) => blank_value(node.as_str()),
        GraphName::DefaultGraph => Value::Null,
    };
    json!({
        "subject": resource_to_host(&quad.subject),
        "predicate": iri_value(quad.predicate.as_str()),
        "object": term_to_host(&quad.object),
        "graph_name": graph_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::DEFAULT_GRAPH;

    fn uri(iri: &str) -> Value {
        iri_value(iri)
    }

    #[test]
    fn resources_need_both_capabilities() {
        assert_eq!(
            to_resource(&uri("http://example.com/a")),
            Some(NamedNode::new("http://example.com/a").unwrap().into())
        );
        assert_eq!(to_resource(&json!({"uri?": true, "to_s": "http://x"})), None);
        assert_eq!(to_resource(&json!("http://example.com/a")), None);
        assert_eq!(to_resource(&Value::Null), None);

        let blank = json!({"uri?": false, "anonymous?": true, "to_s": "_:b0"});
        assert_eq!(
            to_resource(&blank),
            Some(BlankNode::new("b0").unwrap().into())
        );
    }

    #[test]
    fn invalid_iri_is_unconvertible() {
        assert_eq!(to_property(&uri("not an iri")), None);
        assert_eq!(to_property(&blank_value("b1")), None);
    }

    #[test]
    fn plain_values_become_literals() {
        assert_eq!(
            to_term(&json!("hello")),
            Some(Literal::new_simple_literal("hello").into())
        );
        assert_eq!(
            to_term(&json!(42)),
            Some(Literal::new_simple_literal("42").into())
        );
        assert_eq!(to_term(&Value::Null), None);
    }

    #[test]
    fn literal_language_wins_over_datatype() {
        let value = json!({
            "resource?": false, "node?": false, "literal?": true,
            "value": "chat",
            "language": "fr",
            "datatype": uri("http://www.w3.org/2001/XMLSchema#integer"),
        });
        assert_eq!(
            to_term(&value),
            Some(
                Literal::new_language_tagged_literal("chat", "fr")
                    .unwrap()
                    .into()
            )
        );

        let typed = json!({
            "resource?": false, "node?": false, "literal?": true,
            "value": "7",
            "datatype": uri("http://www.w3.org/2001/XMLSchema#integer"),
        });
        assert_eq!(
            to_term(&typed),
            Some(
                Literal::new_typed_literal(
                    "7",
                    NamedNode::new("http://www.w3.org/2001/XMLSchema#integer").unwrap()
                )
                .into()
            )
        );
    }

    #[test]
    fn quads_require_graph_name_key() {
        let statement = json!({
            "subject": uri("http://example.com/s"),
            "predicate": uri("http://example.com/p"),
            "object": "o",
        });
        assert!(to_triple(&statement).is_some());
        assert!(to_quad(&statement).is_none());

        let mut with_graph = statement.clone();
        with_graph["graph_name"] = Value::Null;
        assert_eq!(
            to_quad(&with_graph).map(|q| q.graph_name),
            Some(GraphName::DefaultGraph)
        );

        with_graph["graph_name"] = uri(DEFAULT_GRAPH.as_str());
        assert_eq!(
            to_quad(&with_graph).map(|q| q.graph_name),
            Some(GraphName::DefaultGraph)
        );
    }

    #[test]
    fn pattern_positions_degrade_to_wildcards() {
        let pattern = json!({
            "subject": Value::Null,
            "predicate": uri("not an iri"),
            "object": uri("http://example.com/o"),
        });
        let pattern = to_pattern(&pattern).unwrap();
        assert!(pattern.triple.subject.is_none());
        assert!(pattern.triple.predicate.is_none());
        assert!(pattern.triple.object.is_some());
        assert_eq!(pattern.graph, GraphScope::Default);

        let bad_graph = json!({
            "subject": Value::Null, "predicate": Value::Null, "object": Value::Null,
            "graph_name": blank_value("g"),
        });
        assert!(to_pattern(&bad_graph).is_none());
        assert!(to_pattern(&json!({"subject": Value::Null})).is_none());
    }

    #[test]
    fn exported_values_convert_back() {
        let quad = Quad::new(
            BlankNode::new("b1").unwrap(),
            NamedNode::new("http://example.com/p").unwrap(),
            Literal::new_language_tagged_literal("hi", "en").unwrap(),
            NamedNode::new("http://example.com/g").unwrap(),
        );
        let exported = quad_to_host(&quad);
        assert_eq!(exported["object"]["language"], json!("en"));
        assert_eq!(to_quad(&exported), Some(quad));
    }
}
