use anyhow::{anyhow, Error, Result};
use clap::{Parser, Subcommand};
use graphstore::config::Config;
use graphstore::consts::CONFIG_FILE;
use graphstore::convert::term_to_host;
use graphstore::model::{GraphName, NamedNode, Quad};
use graphstore::options::{Backend, UnionWithDefault};
use graphstore::util::{format_from_name, format_from_path, write_quads};
use graphstore::{Dataset, QueryOutcome};
use log::info;
use oxigraph::io::RdfFormat;
use std::env::current_dir;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "graphstore")]
#[command(about = "RDF dataset store with named graphs")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Verbose mode - sets the RUST_LOG level to info, defaults to warning level
    #[clap(long, short, action, default_value = "false", global = true)]
    verbose: bool,
    /// Debug mode - sets the RUST_LOG level to debug, defaults to warning level
    #[clap(long, action, default_value = "false", global = true)]
    debug: bool,
    /// Dataset directory. If not provided, the current directory and its parents are searched.
    #[clap(long, short, global = true)]
    store: Option<PathBuf>,
    /// Temporary (non-persistent) mode - will not save the dataset to disk
    #[clap(long, short, action, global = true)]
    temporary: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a new dataset
    Init {
        /// Storage engine: persistent or memory
        #[clap(long, default_value = "persistent")]
        backend: Backend,
        /// Read named graphs together with the default graph
        #[clap(long, action, default_value = "false")]
        union_default_graph: bool,
    },
    /// Load an RDF file into the dataset or into one graph
    Load {
        /// File to load; the format is guessed from its extension
        file: PathBuf,
        /// Graph to load into. Created if it does not exist.
        #[clap(long, short)]
        graph: Option<String>,
        /// Override the format (nt, nq, ttl, trig, xml)
        #[clap(long, short)]
        format: Option<String>,
    },
    /// Print the number of statements in the dataset or in one graph
    Count {
        #[clap(long, short)]
        graph: Option<String>,
    },
    /// List the named graphs with their sizes
    Graphs,
    /// Write the dataset (N-Quads) or one graph (N-Triples) to stdout or a file
    Dump {
        #[clap(long, short)]
        graph: Option<String>,
        /// Output file; stdout if omitted
        #[clap(long, short)]
        output: Option<PathBuf>,
        /// Output format (nt, nq, ttl, trig, xml)
        #[clap(long, short)]
        format: Option<String>,
    },
    /// Remove a named graph and all of its statements
    DeleteGraph {
        graph: String,
    },
    /// Evaluate a SPARQL query over the dataset
    Query {
        sparql: String,
        /// Output solutions as JSON
        #[clap(long, action, default_value = "false")]
        json: bool,
    },
    /// Print the dataset configuration
    Config,
    /// Print the store type, location and sizes
    Info,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Init { .. } => "init",
            Commands::Load { .. } => "load",
            Commands::Count { .. } => "count",
            Commands::Graphs => "graphs",
            Commands::Dump { .. } => "dump",
            Commands::DeleteGraph { .. } => "delete-graph",
            Commands::Query { .. } => "query",
            Commands::Config => "config",
            Commands::Info => "info",
        }
    }
}

pub fn run() -> Result<()> {
    graphstore::init_logging();
    let cmd = Cli::parse();
    execute(cmd)
}

pub fn run_from_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    graphstore::init_logging();
    let cmd = Cli::try_parse_from(args).map_err(Error::from)?;
    execute(cmd)
}

fn parse_graph(graph: &str) -> Result<NamedNode> {
    NamedNode::new(graph).map_err(|e| anyhow!("invalid graph IRI '{}': {}", graph, e))
}

fn parse_format(format: Option<&str>) -> Result<Option<RdfFormat>> {
    match format {
        None => Ok(None),
        Some(name) => format_from_name(name)
            .map(Some)
            .ok_or_else(|| anyhow!("unknown RDF format '{}'", name)),
    }
}

fn resolve_root(cmd: &Cli) -> Result<PathBuf> {
    if let Some(store) = &cmd.store {
        return Ok(store.clone());
    }
    if matches!(cmd.command, Commands::Init { .. }) || cmd.temporary {
        return Ok(current_dir()?);
    }
    graphstore::find_dataset_root().ok_or_else(|| {
        anyhow!(
            "No dataset found. Run `graphstore init` or pass --store. Searched for {} from the current directory.",
            CONFIG_FILE
        )
    })
}

fn open_existing(root: &Path, temporary: bool) -> Result<Dataset> {
    if temporary {
        return Dataset::open(Config::temporary_at(root));
    }
    if !root.join(CONFIG_FILE).is_file() {
        return Err(anyhow!(
            "No dataset at {}. Run `graphstore init` first.",
            root.display()
        ));
    }
    Dataset::open_dir(root)
}

fn execute(cmd: Cli) -> Result<()> {
    // The RUST_LOG env var is set by `init_logging` if GRAPHSTORE_LOG is present.
    // CLI flags for verbosity take precedence. If nothing is set, we default to "warn".
    if cmd.debug {
        std::env::set_var("RUST_LOG", "debug");
    } else if cmd.verbose {
        std::env::set_var("RUST_LOG", "info");
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    let _ = env_logger::try_init();

    let root = resolve_root(&cmd)?;
    info!("Running {} against {}", cmd.command.name(), root.display());

    if let Commands::Init {
        backend,
        union_default_graph,
    } = &cmd.command
    {
        let config = Config::builder()
            .root(root)
            .backend(*backend)
            .temporary(cmd.temporary)
            .union_default_graph(UnionWithDefault::from(*union_default_graph))
            .build()?;
        if !cmd.temporary && *backend == Backend::Memory {
            return Err(anyhow!(
                "--backend memory keeps nothing on disk; pass --temporary to use it"
            ));
        }
        let dataset = Dataset::open(config)?;
        dataset.config().print();
        return dataset.close();
    }

    let dataset = open_existing(&root, cmd.temporary)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cmd.command {
        Commands::Init { .. } => unreachable!(), // handled above
        Commands::Load {
            file,
            graph,
            format,
        } => {
            let format = parse_format(format.as_deref())?;
            let loaded = match graph {
                Some(graph) => {
                    let name = parse_graph(&graph)?;
                    if !dataset.has_graph(Some(&name))? {
                        dataset.insert_graph(Some(&name), Vec::<Result<serde_json::Value>>::new())?;
                    }
                    let view = dataset.graph(&name)?;
                    match format {
                        Some(format) => {
                            let reader = std::io::BufReader::new(std::fs::File::open(&file)?);
                            view.insert_reader(reader, Some(format))?
                        }
                        None => view.insert_file(&file)?,
                    }
                }
                None => match format {
                    Some(format) => {
                        let reader = std::io::BufReader::new(std::fs::File::open(&file)?);
                        dataset.insert_reader(reader, Some(format))?
                    }
                    None => dataset.insert_file(&file)?,
                },
            };
            writeln!(out, "Loaded {} statements from {}", loaded, file.display())?;
        }
        Commands::Count { graph } => {
            let count = match graph {
                Some(graph) => dataset.graph(&parse_graph(&graph)?)?.count()?,
                None => dataset.count()?,
            };
            writeln!(out, "{}", count)?;
        }
        Commands::Graphs => {
            for view in dataset.each_graph()? {
                let view = view?;
                if let Some(name) = view.graph_name() {
                    writeln!(out, "{}\t{}", name.as_str(), view.count()?)?;
                }
            }
        }
        Commands::Dump {
            graph,
            output,
            format,
        } => {
            let format = parse_format(format.as_deref())?
                .or_else(|| output.as_deref().and_then(format_from_path));
            let mut sink: Box<dyn Write + '_> = match &output {
                Some(path) => Box::new(std::fs::File::create(path)?),
                None => Box::new(&mut out),
            };
            let written = match graph {
                Some(graph) => {
                    let view = dataset.graph(&parse_graph(&graph)?)?;
                    let quads = view.iter()?.map(|triple| {
                        triple.map(|t| Quad::new(t.subject, t.predicate, t.object, GraphName::DefaultGraph))
                    });
                    write_quads(&mut sink, format.unwrap_or(RdfFormat::NTriples), quads)?
                }
                None => write_quads(
                    &mut sink,
                    format.unwrap_or(RdfFormat::NQuads),
                    dataset.quads()?,
                )?,
            };
            sink.flush()?;
            info!("Wrote {} statements", written);
        }
        Commands::DeleteGraph { graph } => {
            let name = parse_graph(&graph)?;
            dataset.delete_graph(Some(&name))?;
            writeln!(out, "Deleted graph {}", name.as_str())?;
        }
        Commands::Query { sparql, json } => match dataset.query(&sparql, &[])? {
            QueryOutcome::Boolean(value) => writeln!(out, "{}", value)?,
            QueryOutcome::Solutions(rows) => {
                for row in rows {
                    if json {
                        let object: serde_json::Map<String, serde_json::Value> = row
                            .iter()
                            .map(|(name, term)| (name.to_string(), term_to_host(term)))
                            .collect();
                        writeln!(out, "{}", serde_json::Value::Object(object))?;
                    } else {
                        let cells: Vec<String> = row
                            .iter()
                            .map(|(name, term)| format!("?{}={}", name, term))
                            .collect();
                        writeln!(out, "{}", cells.join("\t"))?;
                    }
                }
            }
            QueryOutcome::Graph(triples) => {
                let quads = triples.into_iter().map(|t| {
                    Ok(Quad::new(t.subject, t.predicate, t.object, GraphName::DefaultGraph))
                });
                write_quads(&mut out, RdfFormat::NTriples, quads)?;
            }
        },
        Commands::Config => dataset.config().print(),
        Commands::Info => {
            let stats = dataset.stats()?;
            writeln!(out, "Store: {}", dataset.store().store_type())?;
            if let Some(location) = dataset.store().location() {
                writeln!(out, "Location: {}", location.display())?;
            }
            writeln!(out, "Named graphs: {}", stats.num_graphs)?;
            writeln!(out, "Quads: {}", stats.num_quads)?;
        }
    }
    drop(out);
    dataset.close()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["graphstore", "count", "--graph", "http://ex/g", "-v"])
            .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Count { graph: Some(ref g) } if g == "http://ex/g"));
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["graphstore", "init", "--backend", "tdb"]).is_err());
    }

    #[test]
    fn format_names() {
        assert_eq!(parse_format(Some("ttl")).unwrap(), Some(RdfFormat::Turtle));
        assert!(parse_format(Some("bogus")).is_err());
        assert_eq!(parse_format(None).unwrap(), None);
    }
}
