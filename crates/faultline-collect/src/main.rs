use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use faultline_collect::cli::{
    Cli, CollectArgs, Commands, ComponentArgs, LogFormat, VerifyArgs, WindowArgs,
};
use faultline_collect::{
    Collector, CollectorSettings, RandomPool, run_collection, verification_summary, verify_records,
};
use faultline_config::{
    FaultlineConfig, config_path, ensure_workspace_config, load_config, load_workspace_config,
    validate_config,
};
use faultline_core::{CatastropheRecord, Language, load_records};
use faultline_fetch::{GitWindowFetcher, HistoryWindow, WindowFetcher, WindowRequest};
use faultline_parse::{ComponentExtractor, Snapshot};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    run(cli)
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Human => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

fn run(cli: Cli) -> Result<()> {
    if cli.command == Commands::Init {
        let config = ensure_workspace_config(&cli.workspace).with_context(|| {
            format!(
                "failed to load or create config at {}",
                config_path(&cli.workspace).display()
            )
        })?;
        report_warnings(&config);
        println!("{}", config_path(&cli.workspace).display());
        return Ok(());
    }

    let config = load_effective_config(&cli)?;
    report_warnings(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    match cli.command {
        Commands::Collect(args) => runtime.block_on(run_collect(&config, args)),
        Commands::Window(args) => runtime.block_on(run_window(&config, args)),
        Commands::Verify(args) => runtime.block_on(run_verify(&config, args)),
        Commands::Component(args) => run_component(&config, args),
        Commands::Init => Ok(()),
    }
}

fn load_effective_config(cli: &Cli) -> Result<FaultlineConfig> {
    match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => load_workspace_config(&cli.workspace).with_context(|| {
            format!(
                "failed to load config {}",
                config_path(&cli.workspace).display()
            )
        }),
    }
}

fn report_warnings(config: &FaultlineConfig) {
    for warning in validate_config(config) {
        tracing::warn!(code = warning.code, "{}", warning.message);
    }
}

fn load_selected_records(path: &Path, only: &[String]) -> Result<Vec<CatastropheRecord>> {
    let mut records = load_records(path)
        .with_context(|| format!("failed to read catastrophes {}", path.display()))?;
    if !only.is_empty() {
        records.retain(|record| only.contains(&record.id));
        if records.is_empty() {
            bail!("none of the requested catastrophes exist: {}", only.join(", "));
        }
    }
    Ok(records)
}

async fn run_collect(config: &FaultlineConfig, args: CollectArgs) -> Result<()> {
    let records = load_selected_records(&args.records, &args.only)?;

    let fetcher = GitWindowFetcher::from_config(&config.fetch)
        .context("failed to configure history fetcher")?;
    let extractor = ComponentExtractor::new().context("failed to load language grammars")?;
    let collector = Arc::new(Collector::new(
        Arc::new(fetcher),
        extractor,
        Arc::new(RandomPool::new(config.random_pool.clone())),
        CollectorSettings::from_config(config),
    ));

    let concurrency = args.concurrency.unwrap_or(config.run.concurrency);
    let outcome = run_collection(collector, records, concurrency).await;

    write_json(args.output.as_deref(), &outcome.dataset)?;
    if let Some(report_path) = args.report.as_deref() {
        #[derive(Serialize)]
        struct ReportFile<'a> {
            started_at: &'a str,
            finished_at: &'a str,
            #[serde(flatten)]
            report: &'a faultline_core::CollectionReport,
        }
        write_json(
            Some(report_path),
            &ReportFile {
                started_at: &outcome.started_at,
                finished_at: &outcome.finished_at,
                report: &outcome.report,
            },
        )?;
    }
    eprintln!("{}", outcome.summary_line());
    Ok(())
}

#[derive(Serialize)]
struct WindowView<'a> {
    repository: &'a str,
    pivot: &'a faultline_core::CommitRef,
    ancestors: &'a [faultline_core::CommitRef],
    descendants: &'a [faultline_core::CommitRef],
    failures: &'a [faultline_fetch::FetchFailure],
}

async fn run_window(config: &FaultlineConfig, args: WindowArgs) -> Result<()> {
    let mut fetcher = GitWindowFetcher::from_config(&config.fetch)
        .context("failed to configure history fetcher")?;
    if args.no_github {
        fetcher = fetcher.without_github();
    }
    let request = WindowRequest {
        repository: args.repo.clone(),
        pivot: args.commit.clone(),
        ancestors: args.ancestors.unwrap_or(config.window.ancestors),
        descendants: args.descendants.unwrap_or(config.window.descendants),
    };
    let window = fetcher
        .fetch_window(&request)
        .await
        .with_context(|| format!("failed to fetch window around {} in {}", args.commit, args.repo))?;

    write_json(
        None,
        &WindowView {
            repository: window.repository(),
            pivot: window.pivot(),
            ancestors: window.ancestors(),
            descendants: window.descendants(),
            failures: window.failures(),
        },
    )
}

async fn run_verify(config: &FaultlineConfig, args: VerifyArgs) -> Result<()> {
    let records = load_selected_records(&args.records, &args.only)?;
    let fetcher = GitWindowFetcher::from_config(&config.fetch)
        .context("failed to configure history fetcher")?;
    let limit = Duration::from_secs(config.run.catastrophe_timeout_secs.max(1));
    let verifications = verify_records(&fetcher, &records, limit).await;

    if args.json {
        write_json(None, &verifications)?;
    } else {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{:<28} {:<12} {:<12} {:>5}  DETAIL", "ID", "STATUS", "FIX", "FILES")?;
        for verification in &verifications {
            let detail = verification
                .message
                .clone()
                .unwrap_or_else(|| verification.changed_files.join(", "));
            writeln!(
                out,
                "{:<28} {:<12} {:<12} {:>5}  {}",
                verification.catastrophe_id,
                verification.status,
                verification.fix_commit.chars().take(12).collect::<String>(),
                verification.total_changed_files,
                detail
            )?;
        }
    }
    eprintln!("{}", verification_summary(&verifications));
    Ok(())
}

fn run_component(config: &FaultlineConfig, args: ComponentArgs) -> Result<()> {
    let k = args.k.unwrap_or(config.sampling.k_hops);
    let after = read_source(&args.file)?;
    let file_path = args.file.to_string_lossy().replace('\\', "/");
    let language = resolve_language(args.language.as_deref(), &args.file)?;
    let extractor = ComponentExtractor::new().context("failed to load language grammars")?;

    let component = match &args.before {
        Some(before_path) => {
            let before = read_source(before_path)?;
            extractor.change_component(&before, &after, language, &file_path, k)?
        }
        None => {
            if args.symbols.is_empty() {
                bail!("--symbol is required unless --before is given");
            }
            extractor.extract_component(
                Snapshot::new(&file_path, language, &after),
                &args.symbols,
                k,
            )?
        }
    };

    let mut out = std::io::stdout().lock();
    for symbol in component.iter() {
        writeln!(out, "{symbol}")?;
    }
    Ok(())
}

fn resolve_language(tag: Option<&str>, path: &Path) -> Result<Language> {
    match tag {
        Some(tag) => tag.parse::<Language>().map_err(|err| anyhow!(err)),
        None => Language::for_path(path)
            .ok_or_else(|| anyhow!("cannot infer language of {}; pass --language", path.display())),
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    match path {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            serde_json::to_writer_pretty(file, value)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => {
            let mut out = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut out, value).context("failed to write stdout")?;
            writeln!(out)?;
        }
    }
    Ok(())
}
