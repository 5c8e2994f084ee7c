//! Command line host for the rowtodoc pipeline.
//!
//! Streams a source query, resolves the configured child queries for every
//! batch, and writes one JSON document per line.
//!
//! ```bash
//! rowtodoc --url postgres://localhost/shop \
//!     --query "select * from orders" \
//!     --child-queries orders.json > orders.jsonl
//!
//! rowtodoc --config pipeline.toml --explain
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::Parser;
use sqlx::postgres::PgConnection;
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rowtodoc::config::PipelineConfig;
use rowtodoc::document::DocumentWriter;
use rowtodoc::pipeline::{DocumentSink, FailurePolicy, Pipeline, RunSummary};
use rowtodoc::{transport, Database, RowToDocError, RowToDocResult};

#[derive(Parser, Debug)]
#[command(
    name = "rowtodoc",
    version,
    about = "Turn relational rows into nested JSON documents"
)]
struct Args {
    /// Pipeline configuration file (TOML)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database URL (postgres:// or sqlite:)
    #[arg(long, env = "ROWTODOC_DATABASE_URL")]
    url: Option<String>,

    /// Source query, overrides the configuration
    #[arg(short = 'q', long)]
    query: Option<String>,

    /// Rows per batch, overrides the configuration
    #[arg(short = 'b', long)]
    batch_size: Option<usize>,

    /// Child query tree (JSON), overrides the configuration
    #[arg(long, value_name = "FILE")]
    child_queries: Option<PathBuf>,

    /// strftime pattern for dates, overrides the configuration
    #[arg(long)]
    date_format: Option<String>,

    /// Write documents here instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write the rows of rejected batches here, one JSON object per line
    #[arg(long, value_name = "FILE")]
    failed_output: Option<PathBuf>,

    /// Print the child query tree and exit
    #[arg(long)]
    explain: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "ROWTODOC_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;
    let pipeline = Pipeline::from_config(&config).context("invalid pipeline configuration")?;

    if args.explain {
        println!("source: {}", pipeline.query());
        match pipeline.child_queries() {
            Some(tree) => println!("{}", tree.explain()),
            None => println!("(no child queries)"),
        }
        return Ok(());
    }

    let url = match &args.url {
        Some(url) => url.as_str(),
        None => bail!("a database URL is required (--url or ROWTODOC_DATABASE_URL)"),
    };

    if args.failed_output.is_some() && config.failure_policy != FailurePolicy::Route {
        warn!("--failed-output has no effect unless failure_policy is \"route\"");
    }

    let mut sink = LineSink::open(
        args.output.as_ref(),
        args.failed_output.as_ref(),
        pipeline.writer().clone(),
    )?;

    let summary = if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        run_on::<PgConnection, _>(url, &pipeline, &mut sink).await?
    } else if url.starts_with("sqlite:") {
        run_on::<SqliteConnection, _>(url, &pipeline, &mut sink).await?
    } else {
        bail!("unsupported database URL `{}`", url);
    };

    sink.finish()?;

    info!(
        batches = summary.batches,
        rows = summary.rows,
        documents = summary.documents,
        failed_batches = summary.failed_batches,
        child_queries = summary.child_queries,
        "done"
    );
    Ok(())
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("rowtodoc={}", args.log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(query) = &args.query {
        config.query = Some(query.clone());
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(path) = &args.child_queries {
        config.child_query_file = Some(path.clone());
        config.child_query_json = None;
    }
    if let Some(date_format) = &args.date_format {
        config.date_format = date_format.clone();
    }

    Ok(config)
}

/// Open two connections to `url`: one streams the source query while the
/// other serves the child queries.
async fn run_on<C, K>(url: &str, pipeline: &Pipeline, sink: &mut K) -> Result<RunSummary>
where
    C: Connection + Database,
    K: DocumentSink,
{
    let mut source = C::connect(url)
        .await
        .with_context(|| format!("failed to connect to {}", url))?;
    let mut children = C::connect(url)
        .await
        .context("failed to open the child query connection")?;

    let summary = pipeline.run(&mut source, &mut children, sink).await?;

    children.close().await?;
    source.close().await?;
    Ok(summary)
}

type Output = BufWriter<Box<dyn Write + Send>>;

fn create(path: &PathBuf) -> Result<Output> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(Box::new(file) as Box<dyn Write + Send>))
}

/// JSON lines output. Rows of rejected batches go to `failed` when set,
/// and are otherwise only logged.
struct LineSink<W> {
    out: W,
    failed: Option<W>,
    writer: DocumentWriter,
}

impl LineSink<Output> {
    fn open(
        path: Option<&PathBuf>,
        failed_path: Option<&PathBuf>,
        writer: DocumentWriter,
    ) -> Result<Self> {
        let out = match path {
            Some(path) => create(path)?,
            None => BufWriter::new(Box::new(std::io::stdout()) as Box<dyn Write + Send>),
        };
        let failed = failed_path.map(create).transpose()?;
        Ok(Self {
            out,
            failed,
            writer,
        })
    }
}

impl<W: Write> LineSink<W> {
    fn finish(mut self) -> Result<()> {
        self.out.flush().context("failed to flush output")?;
        if let Some(failed) = self.failed.as_mut() {
            failed.flush().context("failed to flush failed output")?;
        }
        Ok(())
    }
}

fn sink_error(e: std::io::Error) -> RowToDocError {
    RowToDocError::Sink(e.to_string())
}

#[async_trait]
impl<W: Write + Send> DocumentSink for LineSink<W> {
    async fn write_document(&mut self, document: String) -> RowToDocResult<()> {
        writeln!(self.out, "{}", document).map_err(sink_error)
    }

    async fn reject_batch(&mut self, frame: Vec<u8>, error: &RowToDocError) -> RowToDocResult<()> {
        let rows = transport::decode_batch(&frame)?;
        error!(rows = rows.len(), %error, "batch rejected");

        if let Some(failed) = self.failed.as_mut() {
            for document in self.writer.write_batch(&rows)? {
                writeln!(failed, "{}", document).map_err(sink_error)?;
            }
        }
        Ok(())
    }
}
