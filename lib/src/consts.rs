//! Defines constant NamedNodeRefs for the IRIs the dataset layer treats specially:
//! the reserved default-graph identifier and the datatypes used when building literals.

use oxigraph::model::NamedNodeRef;

/// Reserved graph name standing for the default graph. It can never name a user graph:
/// any statement or pattern carrying it as graph name is routed to the default graph.
pub const DEFAULT_GRAPH: NamedNodeRef<'_> = NamedNodeRef::new_unchecked("urn:x-arq:DefaultGraph");

// xsd
pub const XSD_STRING: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2001/XMLSchema#string");
// rdf
pub const RDF_LANG_STRING: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#langString");

/// File name of the persisted configuration inside a dataset directory.
pub const CONFIG_FILE: &str = "graphstore.json";
/// Directory holding the storage engine's files inside a dataset directory.
pub const STORE_DIR: &str = "store.db";
/// Lock file guarding a dataset directory against a second writer process.
pub const LOCK_FILE: &str = "store.lock";
