use crate::errors::DatasetError;
use crate::io::QuadStore;
use anyhow::Result;
use log::{debug, info};
use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::{GraphNameRef, Quad, Triple};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Serialization format guessed from a file extension.
pub fn format_from_path(path: &Path) -> Option<RdfFormat> {
    let ext = path.extension().and_then(|ext| ext.to_str())?;
    match ext.to_ascii_lowercase().as_str() {
        "nt" => Some(RdfFormat::NTriples),
        "nq" => Some(RdfFormat::NQuads),
        "ttl" => Some(RdfFormat::Turtle),
        "n3" => Some(RdfFormat::Turtle),
        "trig" => Some(RdfFormat::TriG),
        "xml" | "rdf" | "owl" => Some(RdfFormat::RdfXml),
        _ => None,
    }
}

/// Parses a format name as given on a command line ("nquads", "ttl", ...).
pub fn format_from_name(name: &str) -> Option<RdfFormat> {
    match name.to_ascii_lowercase().as_str() {
        "nt" | "ntriples" | "n-triples" => Some(RdfFormat::NTriples),
        "nq" | "nquads" | "n-quads" => Some(RdfFormat::NQuads),
        "ttl" | "turtle" | "n3" => Some(RdfFormat::Turtle),
        "trig" => Some(RdfFormat::TriG),
        "xml" | "rdf" | "rdfxml" | "rdf/xml" => Some(RdfFormat::RdfXml),
        _ => None,
    }
}

/// Where parsed statements go.
#[derive(Debug, Clone, Copy)]
pub enum LoadTarget<'a> {
    /// Statements keep the graph the document assigns them; triples land in the
    /// default graph.
    Dataset,
    /// Every statement lands in this graph; documents naming other graphs are rejected.
    Graph(GraphNameRef<'a>),
}

/// Parses `reader` and inserts every statement into `store`. Returns the number of
/// statements that were not already present. Parse failures are reported as
/// `DatasetError::IoFailure` naming `origin`. The caller owns the transaction.
pub fn load_reader<R: Read>(
    store: &dyn QuadStore,
    reader: R,
    format: RdfFormat,
    target: LoadTarget<'_>,
    origin: &Path,
) -> Result<usize> {
    let parser = match target {
        LoadTarget::Dataset => RdfParser::from_format(format),
        LoadTarget::Graph(graph_name) => RdfParser::from_format(format)
            .with_default_graph(graph_name)
            .without_named_graphs(),
    };
    let mut inserted = 0usize;
    for quad in parser.for_reader(reader) {
        let quad = quad.map_err(|e| DatasetError::IoFailure {
            path: origin.to_path_buf(),
            source: e.into(),
        })?;
        if store.insert(quad.as_ref())? {
            inserted += 1;
        }
    }
    debug!("Loaded {} new statements from {}", inserted, origin.display());
    Ok(inserted)
}

/// Opens `path` and loads it with `load_reader`. The format defaults to the one guessed
/// from the extension, then to `fallback`.
pub fn load_file(
    store: &dyn QuadStore,
    path: &Path,
    format: Option<RdfFormat>,
    fallback: RdfFormat,
    target: LoadTarget<'_>,
) -> Result<usize> {
    let format = format
        .or_else(|| format_from_path(path))
        .unwrap_or(fallback);
    info!("Reading {} as {:?}", path.display(), format);
    let file = std::fs::File::open(path).map_err(|e| DatasetError::IoFailure {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    load_reader(store, BufReader::new(file), format, target, path)
}

/// Placeholder origin used in error messages for streams without a path.
pub fn stream_origin() -> PathBuf {
    PathBuf::from("<stream>")
}

pub fn write_quads<W: Write>(
    writer: W,
    format: RdfFormat,
    quads: impl IntoIterator<Item = Result<Quad>>,
) -> Result<usize> {
    let mut serializer = RdfSerializer::from_format(format).for_writer(writer);
    let mut written = 0;
    for quad in quads {
        let quad = quad?;
        if format.supports_datasets() {
            serializer.serialize_quad(&quad)?;
        } else {
            serializer.serialize_triple(&Triple::new(
                quad.subject,
                quad.predicate,
                quad.object,
            ))?;
        }
        written += 1;
    }
    serializer.finish()?;
    Ok(written)
}
