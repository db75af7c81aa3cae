use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use notesweb_core::config::{Settings, load_config};
use notesweb_core::identifier::ensure_identifier;
use notesweb_core::render::{PandocClient, PandocServer};
use notesweb_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, resolve_paths, write_text_file,
};
use notesweb_core::site::{BuildOptions, build_site};
use notesweb_core::views::search_index;
use notesweb_core::walk::walk_notes;
use notesweb_core::{PropertyStore, SiteLayout};
use tracing::Level;
use tracing::subscriber::set_global_default;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "notesweb",
    version,
    about = "Publish a directory of notes as a static website"
)]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Decrease log verbosity (-q, -qq)
    #[arg(short = 'q', action = ArgAction::Count, global = true)]
    quiet: u8,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render the notes tree into a static site
    Build(BuildArgs),
    /// Print the resolved properties of one file or directory as JSON
    Inspect(InspectArgs),
    /// Print the search index as JSON without rendering anything
    #[command(name = "search-data")]
    SearchData(SearchDataArgs),
    /// Give a Markdown note a permanent `uuid` identifier
    #[command(name = "add-uuid")]
    AddUuid(AddUuidArgs),
}

#[derive(Debug, Args)]
struct BuildArgs {
    /// Notes directory (defaults to NOTESWEB_NOTES_DIR, then ./notes)
    notes: Option<PathBuf>,
    #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Regenerate outputs even when they are newer than their sources
    #[arg(short = 'F', long)]
    force: bool,
    #[arg(long, value_name = "N")]
    workers: Option<usize>,
    /// Skip the pandoc-server readiness check
    #[arg(long, conflicts_with = "start_server")]
    skip_probe: bool,
    /// Launch pandoc-server for this build and wait until it answers
    #[arg(
        long,
        value_name = "PROGRAM",
        num_args = 0..=1,
        default_missing_value = "pandoc-server"
    )]
    start_server: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct InspectArgs {
    path: PathBuf,
    #[arg(long, value_name = "DIR")]
    notes: Option<PathBuf>,
    /// Own properties only, without inherited tags
    #[arg(long, conflicts_with = "index_entries")]
    raw: bool,
    /// Include the listing of a directory's children
    #[arg(long)]
    index_entries: bool,
}

#[derive(Debug, Args)]
struct SearchDataArgs {
    notes: Option<PathBuf>,
    /// Write to a file instead of stdout
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
    /// Overwrite an existing --out file
    #[arg(long, requires = "out")]
    force: bool,
}

#[derive(Debug, Args)]
struct AddUuidArgs {
    file: PathBuf,
    /// Write to the file instead of stdout
    #[arg(short = 'w', long)]
    write: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    dotenvy::dotenv().ok();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Build(args)) => run_build(&runtime, args),
        Some(Commands::Inspect(args)) => run_inspect(&runtime, args),
        Some(Commands::SearchData(args)) => run_search_data(&runtime, args),
        Some(Commands::AddUuid(args)) => run_add_uuid(args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8, quiet: u8) {
    // Default INFO; each -v/-q moves one step.
    let level = match 2 + i16::from(verbose) - i16::from(quiet) {
        i16::MIN..=0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let env_filter = EnvFilter::from_default_env().add_directive(level.into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    let _ = set_global_default(subscriber);
}

fn run_build(runtime: &RuntimeOptions, args: BuildArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime, args.notes.clone(), args.output_dir.clone())?;
    paths.ensure_ready_for_build()?;
    let settings = load_settings(&paths)?;

    let client = PandocClient::new(&settings.render)?;
    let _server = match &args.start_server {
        Some(program) => {
            let server = PandocServer::start(program, &client)?;
            println!("pandoc: {} (started)", server.version());
            Some(server)
        }
        None => None,
    };
    if !args.skip_probe && args.start_server.is_none() {
        let version = client
            .version()
            .with_context(|| format!("pandoc server at {} is not reachable", client.url()))?;
        println!("pandoc: {version}");
    }

    let mut store = open_store(&paths, &settings);
    let options = BuildOptions {
        force: args.force,
        workers: args.workers.unwrap_or(settings.render.workers),
    };
    let report = build_site(&mut store, &paths.output_dir, &client, &options)?;

    println!("site build");
    println!("notes_dir: {}", normalize_path(&paths.notes_dir));
    println!("output_dir: {}", normalize_path(&paths.output_dir));
    println!("force: {}", format_flag(options.force));
    println!("workers: {}", options.workers);
    println!("directories: {}", report.walk.directories.len());
    println!("files: {}", report.walk.files.len());
    println!("pages_written: {}", report.pages_written);
    println!("files_copied: {}", report.files_copied);
    println!("unchanged: {}", report.unchanged);
    println!("tags: {}", report.tags);
    println!("permalinks: {}", report.permalinks);
    println!("elapsed_ms: {}", report.elapsed_ms);
    let skipped: Vec<_> = report
        .walk
        .skipped
        .iter()
        .chain(report.failed.iter())
        .collect();
    if !skipped.is_empty() {
        println!("skipped:");
        for entry in skipped {
            println!("  - {}: {}", entry.path, entry.reason);
        }
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_inspect(runtime: &RuntimeOptions, args: InspectArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime, args.notes.clone(), None)?;
    let settings = load_settings(&paths)?;
    let mut store = open_store(&paths, &settings);

    let record = if args.raw {
        store.get_raw(&args.path)?
    } else if args.index_entries {
        store.get_with_index_entries(&args.path)?
    } else {
        store.get(&args.path)?
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_search_data(runtime: &RuntimeOptions, args: SearchDataArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime, args.notes.clone(), None)?;
    let settings = load_settings(&paths)?;
    let mut store = open_store(&paths, &settings);

    walk_notes(&mut store)?;
    let records = store.records()?;
    let json = serde_json::to_string_pretty(&search_index(&records))?;
    match args.out {
        Some(out) => {
            let wrote = write_text_file(&out, &json, args.force)?;
            println!("search data");
            println!("path: {}", normalize_path(&out));
            println!("entries: {}", records.len());
            println!("written: {}", format_flag(wrote));
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_add_uuid(args: AddUuidArgs) -> Result<()> {
    let report = ensure_identifier(&args.file, args.write)?;
    if args.write {
        println!("path: {}", normalize_path(&args.file));
        println!("uuid: {}", report.identifier);
        println!("assigned: {}", format_flag(report.assigned));
    } else {
        print!("{}", report.content);
    }
    Ok(())
}

fn resolve_runtime_paths(
    runtime: &RuntimeOptions,
    notes_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<ResolvedPaths> {
    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        notes_dir,
        output_dir,
        config: runtime.config.clone(),
    };
    resolve_paths(&context, &overrides)
}

fn load_settings(paths: &ResolvedPaths) -> Result<Settings> {
    Ok(load_config(&paths.config_path)?.settings())
}

fn open_store(paths: &ResolvedPaths, settings: &Settings) -> PropertyStore {
    let layout = SiteLayout::new(
        &paths.notes_dir,
        &paths.site_root(&settings.base_url),
        &settings.base_url,
    );
    PropertyStore::new(layout)
        .with_index_filename(settings.index_filename.clone())
        .with_tag_policy(settings.tag_policy)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
