//! treestream CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use ts_stream::schema::RawRow;
use ts_stream::{
    ChainSource, ColumnSource, Config, EventBuffer, FileSink, FileSource, RecordSink, Schema,
    VariablesFile,
};

#[derive(Parser)]
#[command(name = "treestream")]
#[command(about = "treestream - typed columnar record streams")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// JSON config file (schema, stream and store options)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the column listing of one or more chained files
    Ls {
        /// Input files, read as one chain
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print column descriptions as JSON instead of the text listing
        #[arg(long)]
        json: bool,
    },

    /// Write a variables.txt schema describing a file
    Variables {
        /// Input file
        file: PathBuf,

        /// Output schema; variables_skipped.txt is written next to it
        #[arg(short, long, default_value = "variables.txt")]
        output: PathBuf,

        /// Prefix field names with the tree name
        #[arg(long)]
        tree_prefix: bool,
    },

    /// Parse a variables.txt schema and summarise it
    Check {
        /// Schema file
        schema: PathBuf,
    },

    /// Copy entries from chained inputs into a new file
    Copy {
        /// Input files, read as one chain
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Whitespace-separated branch prefixes to keep (default: all)
        #[arg(long, default_value = "")]
        select: String,

        /// Stop after this many entries
        #[arg(long)]
        max_entries: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ls { files, json } => cmd_ls(&files, json),
        Commands::Variables { file, output, tree_prefix } => {
            cmd_variables(&file, &output, tree_prefix, &config)
        }
        Commands::Check { schema } => cmd_check(&schema, &config),
        Commands::Copy { inputs, output, select, max_entries } => {
            cmd_copy(&inputs, &output, &select, max_entries, &config)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    tracing::info!(path = %path.display(), "loading config");
    Config::from_json_file(path).with_context(|| format!("reading config {}", path.display()))
}

fn open_chain(files: &[PathBuf]) -> Result<ChainSource> {
    let mut sources: Vec<Box<dyn ColumnSource>> = Vec::with_capacity(files.len());
    for path in files {
        let source =
            FileSource::open(path).with_context(|| format!("opening {}", path.display()))?;
        tracing::debug!(path = %path.display(), entries = source.entries(), "opened input");
        sources.push(Box::new(source));
    }
    Ok(ChainSource::new(sources))
}

fn cmd_ls(files: &[PathBuf], json: bool) -> Result<()> {
    let chain = open_chain(files)?;
    if json {
        let value = serde_json::json!({
            "tree": chain.tree_name(),
            "entries": chain.entries(),
            "columns": chain.columns(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", chain.ls());
    }
    Ok(())
}

fn cmd_variables(file: &Path, output: &Path, tree_prefix: bool, config: &Config) -> Result<()> {
    let source = FileSource::open(file).with_context(|| format!("opening {}", file.display()))?;
    let mut schema_config = config.schema.clone();
    schema_config.use_tree_prefix |= tree_prefix;

    let vars = VariablesFile::from_listing(&source.ls(), &schema_config)
        .with_context(|| format!("describing {}", file.display()))?;
    std::fs::write(output, vars.render())
        .with_context(|| format!("writing {}", output.display()))?;

    let skipped_path = output.with_file_name("variables_skipped.txt");
    match vars.render_skipped() {
        Some(text) => {
            std::fs::write(&skipped_path, text)
                .with_context(|| format!("writing {}", skipped_path.display()))?;
            tracing::warn!(
                count = vars.skipped.len(),
                path = %skipped_path.display(),
                "some columns cannot be described"
            );
        }
        None if skipped_path.exists() => {
            std::fs::remove_file(&skipped_path)
                .with_context(|| format!("removing stale {}", skipped_path.display()))?;
        }
        None => {}
    }

    println!("wrote {} ({} fields)", output.display(), vars.rows.len());
    Ok(())
}

fn cmd_check(path: &Path, config: &Config) -> Result<()> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let schema = Schema::parse_with(&text, &config.schema)
        .with_context(|| format!("parsing {}", path.display()))?;

    println!("Trees   {}", schema.tree_names().join(" "));
    println!("Fields  {}", schema.fields().len());
    for field in schema.fields() {
        let mut row = format!(
            "  {:<32} {:<16} {}",
            field.field_name,
            field.field_type.to_string(),
            field.max_count
        );
        if let Some(counter) = &field.counter_name {
            row.push_str(&format!(" <- {counter}"));
        }
        if field.is_counter {
            row.push_str(" *");
        }
        println!("{row}");
    }
    for group in schema.groups() {
        let members: Vec<&str> = group.members.iter().map(|m| m.name.as_str()).collect();
        println!("Group   {} [{}]: {}", group.name, group.max_count, members.join(" "));
    }
    for (requested, assigned) in schema.renamed() {
        println!("Renamed {requested} -> {assigned}");
    }
    for skipped in schema.skipped() {
        println!("Skipped {skipped} ({})", skipped.reason);
    }
    Ok(())
}

fn cmd_copy(
    inputs: &[PathBuf],
    output: &Path,
    select: &str,
    max_entries: Option<u64>,
    config: &Config,
) -> Result<()> {
    let chain = open_chain(inputs)?;
    let tree = chain.tree_name().to_string();

    let vars = VariablesFile::from_listing(&chain.ls(), &config.schema)?;
    for skipped in &vars.skipped {
        tracing::warn!(column = %skipped.branch_name, "column not copied");
    }
    let prefixes: Vec<&str> = select.split_whitespace().collect();
    let rows: Vec<RawRow> = vars
        .rows
        .into_iter()
        .filter(|r| prefixes.is_empty() || prefixes.iter().any(|p| r.branch_name.starts_with(p)))
        .collect();
    if rows.is_empty() {
        anyhow::bail!("no column matches '{select}'");
    }
    let schema = Schema::build(vars.tree_names, rows, &config.schema)?;

    let mut input = EventBuffer::with_config(schema, config.stream.clone());
    input.open_read(chain, "")?;
    let sink = FileSink::create(output, &tree, &config.store)
        .with_context(|| format!("creating {}", output.display()))?;
    let mut out = RecordSink::open(sink, input.buffers())?;

    let total = max_entries.map_or(input.size(), |n| n.min(input.size()));
    for entry in 0..total {
        input.read(entry).with_context(|| format!("reading entry {entry}"))?;
        out.commit(input.buffers_mut()).with_context(|| format!("writing entry {entry}"))?;
    }
    out.close()?;
    input.close()?;

    tracing::info!(entries = total, path = %output.display(), "copy done");
    println!("copied {total} entries to {}", output.display());
    Ok(())
}
