use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use multisearch::{Granularity, SearchResults, ShardId, ShardRegistry};
use tracing::{info, warn};

use crate::config::{BuildSettings, QuerySettings, StatsSettings, load_settings};
use crate::telemetry::{init_telemetry, write_profile};

/// Arguments of the `query` command after parsing.
#[derive(Debug, Clone)]
pub struct QueryArgs {
    pub archive: PathBuf,
    pub text: String,
    pub k: Option<usize>,
    pub all: bool,
    pub shard: Option<String>,
    pub sentences: bool,
}

pub fn run_build(config_path: Option<PathBuf>, input: &Path, output: &Path) -> Result<()> {
    let settings = load_settings::<BuildSettings>("build", config_path)?;
    let profiler_guard = init_telemetry(settings.profile_output.is_some());

    let raw = fs::read_to_string(input)
        .with_context(|| format!("failed to read dialogue from {}", input.display()))?;
    let registry = build_registry(&settings, &raw)?;
    info!(
        input = %input.display(),
        shards = registry.len(),
        phrases = registry.num_phrases(None)?,
        sentences = registry.num_sentences(None)?,
        "registry built"
    );

    ensure_parent(output)?;
    registry
        .save(output, &settings.dirname)
        .with_context(|| format!("failed to save archive to {}", output.display()))?;
    println!(
        "Archive with {} shards written to {}",
        registry.len(),
        output.display()
    );

    finish_profile(profiler_guard, settings.profile_output.as_deref())
}

pub fn run_query(config_path: Option<PathBuf>, args: &QueryArgs) -> Result<()> {
    let settings = load_settings::<QuerySettings>("query", config_path)?;
    let profiler_guard = init_telemetry(settings.profile_output.is_some());

    let registry = load_registry(&settings.embedder, &settings.dirname, &args.archive)?;
    let results = execute_query(&registry, &settings, args)?;
    if results.is_empty() {
        warn!(query = args.text.as_str(), "no results");
    }
    for (rank, (text, distance)) in results.iter().enumerate() {
        println!("{:>3}. {text} ({distance:.4})", rank + 1);
    }

    finish_profile(profiler_guard, settings.profile_output.as_deref())
}

pub fn run_stats(config_path: Option<PathBuf>, archive: &Path) -> Result<()> {
    let settings = load_settings::<StatsSettings>("stats", config_path)?;
    let _ = init_telemetry(false);

    let registry = load_registry(&settings.embedder, &settings.dirname, archive)?;
    print!("{}", render_stats(&registry)?);
    Ok(())
}

/// Parses `shard<TAB>phrase` lines and adds them to a fresh registry.
pub fn build_registry(settings: &BuildSettings, dialogue: &str) -> Result<ShardRegistry> {
    let embedder = settings.embedder.build()?;
    let mut registry = ShardRegistry::new(embedder, settings.shard_config());
    for (line_number, line) in dialogue.lines().enumerate() {
        let Some((shard, text)) = parse_line(line) else {
            continue;
        };
        registry
            .add(text, shard)
            .with_context(|| format!("failed to add line {}", line_number + 1))?;
    }
    Ok(registry)
}

/// Splits a dialogue line; lines without a tab belong to the default shard.
fn parse_line(line: &str) -> Option<(ShardId, &str)> {
    let (shard, text) = match line.split_once('\t') {
        Some((shard, text)) => (ShardId::from(shard.trim()), text.trim()),
        None => (ShardId::Default, line.trim()),
    };
    if text.is_empty() {
        None
    } else {
        Some((shard, text))
    }
}

fn load_registry(
    embedder: &crate::config::EmbedderSettings,
    dirname: &str,
    archive: &Path,
) -> Result<ShardRegistry> {
    if !archive.exists() {
        bail!("archive not found at {}", archive.display());
    }
    let model = embedder.build()?;
    ShardRegistry::load(model, archive, dirname)
        .with_context(|| format!("failed to load archive {}", archive.display()))
}

fn execute_query(
    registry: &ShardRegistry,
    settings: &QuerySettings,
    args: &QueryArgs,
) -> Result<SearchResults> {
    let k = if args.all {
        None
    } else {
        Some(args.k.unwrap_or(settings.k))
    };
    let shard = args.shard.as_deref().map(ShardId::from);
    let granularity = if args.sentences {
        Granularity::Sentence
    } else {
        Granularity::Phrase
    };
    let results = registry.search(&args.text, k, shard.as_ref(), granularity)?;
    Ok(results)
}

fn render_stats(registry: &ShardRegistry) -> Result<String> {
    let mut lines = vec![format!("{:<24} {:>8} {:>10}", "shard", "phrases", "sentences")];
    for id in registry.shard_ids() {
        lines.push(format!(
            "{:<24} {:>8} {:>10}",
            id.to_string(),
            registry.num_phrases(Some(id))?,
            registry.num_sentences(Some(id))?
        ));
    }
    lines.push(format!(
        "{:<24} {:>8} {:>10}",
        "total",
        registry.num_phrases(None)?,
        registry.num_sentences(None)?
    ));
    let mut body = lines.join("\n");
    body.push('\n');
    Ok(body)
}

fn finish_profile(
    guard: Option<pprof::ProfilerGuard<'static>>,
    profile_output: Option<&Path>,
) -> Result<()> {
    if let (Some(guard), Some(profile_path)) = (guard, profile_output) {
        ensure_parent(profile_path)?;
        write_profile(guard, profile_path);
        println!("CPU profile written to {}", profile_path.display());
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}
