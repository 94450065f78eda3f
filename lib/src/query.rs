//! SPARQL evaluation over an oxigraph store, with results collected into owned values so
//! they outlive the read transaction they were produced under.

use anyhow::Result;
use log::debug;
use oxigraph::model::{Term, Triple};
use oxigraph::sparql::{QueryResults, SparqlEvaluator, Variable};
use oxigraph::store::Store;

/// One row of a SELECT result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    bindings: Vec<(String, Term)>,
}

impl Solution {
    /// Value bound to `variable` (without the leading `?`), if any.
    pub fn get(&self, variable: &str) -> Option<&Term> {
        self.bindings
            .iter()
            .find(|(name, _)| name == variable)
            .map(|(_, term)| term)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.bindings.iter().map(|(name, term)| (name.as_str(), term))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// ASK
    Boolean(bool),
    /// SELECT
    Solutions(Vec<Solution>),
    /// CONSTRUCT / DESCRIBE
    Graph(Vec<Triple>),
}

impl QueryOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryOutcome::Boolean(_) => "boolean",
            QueryOutcome::Solutions(_) => "solutions",
            QueryOutcome::Graph(_) => "graph",
        }
    }
}

/// Parses and evaluates `sparql` against `store`. Each `(name, term)` binding is
/// substituted for the variable `?name` before evaluation.
pub fn evaluate(store: &Store, sparql: &str, bindings: &[(String, Term)]) -> Result<QueryOutcome> {
    let mut prepared = SparqlEvaluator::new().parse_query(sparql)?;
    for (name, term) in bindings {
        let variable = Variable::new(name.trim_start_matches(['?', '$']))?;
        prepared = prepared.substitute_variable(variable, term.clone());
    }
    let outcome = match prepared.on_store(store).execute()? {
        QueryResults::Boolean(value) => QueryOutcome::Boolean(value),
        QueryResults::Solutions(solutions) => {
            let mut rows = Vec::new();
            for solution in solutions {
                let solution = solution?;
                rows.push(Solution {
                    bindings: solution
                        .iter()
                        .map(|(variable, term)| (variable.as_str().to_string(), term.clone()))
                        .collect(),
                });
            }
            QueryOutcome::Solutions(rows)
        }
        QueryResults::Graph(triples) => {
            QueryOutcome::Graph(triples.collect::<Result<Vec<_>, _>>()?)
        }
    };
    debug!("SPARQL query produced a {} result", outcome.kind());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::{GraphNameRef, Literal, NamedNode, QuadRef};

    fn store() -> Store {
        let store = Store::new().unwrap();
        let s = NamedNode::new("http://example.com/s").unwrap();
        let p = NamedNode::new("http://example.com/p").unwrap();
        for value in ["a", "b"] {
            let o = Literal::new_simple_literal(value);
            store
                .insert(QuadRef::new(&s, &p, &o, GraphNameRef::DefaultGraph))
                .unwrap();
        }
        store
    }

    #[test]
    fn select_ask_and_construct() {
        let store = store();
        match evaluate(&store, "SELECT ?o WHERE { ?s ?p ?o } ORDER BY ?o", &[]).unwrap() {
            QueryOutcome::Solutions(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(
                    rows[0].get("o"),
                    Some(&Term::from(Literal::new_simple_literal("a")))
                );
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(
            evaluate(&store, "ASK { ?s ?p \"b\" }", &[]).unwrap(),
            QueryOutcome::Boolean(true)
        );
        match evaluate(&store, "CONSTRUCT { ?s ?p ?o } WHERE { ?s ?p ?o }", &[]).unwrap() {
            QueryOutcome::Graph(triples) => assert_eq!(triples.len(), 2),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn initial_bindings_restrict_results() {
        let store = store();
        let bindings = vec![(
            "?o".to_string(),
            Term::from(Literal::new_simple_literal("b")),
        )];
        match evaluate(&store, "SELECT ?s WHERE { ?s ?p ?o }", &bindings).unwrap() {
            QueryOutcome::Solutions(rows) => assert_eq!(rows.len(), 1),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn syntax_errors_surface() {
        assert!(evaluate(&store(), "SELECT WHERE", &[]).is_err());
    }
}
