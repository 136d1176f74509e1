// src/main.rs
//
// CLI entrypoint for salesgym.
//
// Subcommands:
// - validate <CONFIG>: load and validate a config, print a summary
// - show: print the resolved config (preset or file) as YAML or JSON
// - play: run one episode and print its transcript
// - eval: evaluate a baseline policy over many seeded episodes
// - collect: write a trajectory dataset for offline training
//
// Config resolution: --config wins; otherwise --preset, then
// SALESGYM_PRESET, then the default preset. SALESGYM_* overrides are applied
// on top either way. Logs go to stderr so stdout stays machine-readable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use salesgym::config::{resolve_effective_preset, EnvConfig, Preset};
use salesgym::rl::trajectory::{TrajectoryCollector, TrajectoryWriter};
use salesgym::rl::{
    evaluate, run_episode, ConversationEnv, EpisodeConfig, EvalConfig, Policy, RandomPolicy,
    ReadinessPolicy, ScriptedPolicy,
};
use salesgym::store::ConfigStore;
use salesgym::telemetry::TelemetrySink;

#[derive(Debug, Parser)]
#[command(
    name = "salesgym",
    about = "Conversation environment for training persuasion policies",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate a config file.
    Validate {
        /// YAML or JSON config.
        config: PathBuf,
    },
    /// Print the resolved config.
    Show {
        #[command(flatten)]
        source: ConfigSource,
        /// Print JSON instead of YAML.
        #[arg(long)]
        json: bool,
    },
    /// Run one episode and print its transcript.
    Play {
        #[command(flatten)]
        source: ConfigSource,
        #[command(flatten)]
        policy: PolicyArgs,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Force a persona id.
        #[arg(long)]
        persona: Option<String>,
        /// Print the transcript as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Evaluate a baseline policy.
    Eval {
        #[command(flatten)]
        source: ConfigSource,
        #[command(flatten)]
        policy: PolicyArgs,
        #[arg(long, default_value_t = 100)]
        episodes: u32,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 1)]
        threads: usize,
        /// Force a persona id for every episode.
        #[arg(long)]
        persona: Option<String>,
        /// Write the summary as JSON to this path.
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Collect trajectories into a directory.
    Collect {
        #[command(flatten)]
        source: ConfigSource,
        #[command(flatten)]
        policy: PolicyArgs,
        /// Output directory (metadata.json + trajectories.jsonl).
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 100)]
        episodes: u32,
        /// Parallel environments.
        #[arg(long, default_value_t = 8)]
        envs: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Debug, Args)]
struct ConfigSource {
    /// Built-in preset (appointment, prompt).
    /// If omitted, uses SALESGYM_PRESET (default appointment).
    #[arg(long, value_parser = parse_preset, conflicts_with = "config")]
    preset: Option<Preset>,
    /// YAML or JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PolicyKind {
    Random,
    Readiness,
    Scripted,
}

#[derive(Debug, Args)]
struct PolicyArgs {
    #[arg(long, value_enum, default_value_t = PolicyKind::Readiness)]
    policy: PolicyKind,
    /// Comma-separated action ids for --policy scripted.
    #[arg(long, value_delimiter = ',')]
    script: Vec<String>,
    /// Seed for --policy random.
    #[arg(long, default_value_t = 0)]
    policy_seed: u64,
}

fn parse_preset(s: &str) -> std::result::Result<Preset, String> {
    Preset::parse(s).ok_or_else(|| {
        let names: Vec<&str> = Preset::ALL.iter().map(|p| p.as_str()).collect();
        format!("unknown preset '{s}' (expected one of: {})", names.join(", "))
    })
}

fn load_config_file(path: &Path) -> Result<EnvConfig> {
    EnvConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}

fn resolve_config(source: &ConfigSource) -> Result<EnvConfig> {
    let mut cfg = match &source.config {
        Some(path) => load_config_file(path)?,
        None => {
            let effective = resolve_effective_preset(source.preset);
            effective.log_startup();
            effective.preset.config()
        }
    };
    cfg.apply_env_overrides();
    Ok(cfg)
}

fn build_store(source: &ConfigSource) -> Result<Arc<ConfigStore>> {
    let store = ConfigStore::new(resolve_config(source)?).context("validating config")?;
    tracing::info!(
        config = store.name(),
        fingerprint = store.fingerprint(),
        "config loaded"
    );
    Ok(Arc::new(store))
}

/// Returns a factory so threaded runners can build one policy per worker.
fn policy_factory(
    args: &PolicyArgs,
    store: &ConfigStore,
) -> Result<impl Fn() -> Box<dyn Policy> + Sync> {
    let kind = args.policy;
    let seed = args.policy_seed;
    let scripted = match kind {
        PolicyKind::Scripted => {
            if args.script.is_empty() {
                bail!("--policy scripted needs --script");
            }
            Some(ScriptedPolicy::from_ids(store, args.script.as_slice())?)
        }
        _ => None,
    };
    Ok(move || -> Box<dyn Policy> {
        match (kind, &scripted) {
            (PolicyKind::Scripted, Some(p)) => Box::new(p.clone()),
            (PolicyKind::Random, _) => Box::new(RandomPolicy::new(seed)),
            _ => Box::new(ReadinessPolicy::new()),
        }
    })
}

fn cmd_validate(path: &Path) -> Result<()> {
    let store = ConfigStore::new(load_config_file(path)?).context("validating config")?;
    println!("ok: {} ({})", store.name(), store.fingerprint());
    println!("  traits:   {}", store.trait_names().join(", "));
    let actions: Vec<String> = store
        .actions()
        .iter()
        .map(|a| if a.closing { format!("{}*", a.id) } else { a.id.clone() })
        .collect();
    println!("  actions:  {}", actions.join(", "));
    let personas: Vec<&str> = store.personas().iter().map(|p| p.id.as_str()).collect();
    println!("  personas: {}", personas.join(", "));
    println!("  max_turns: {}", store.max_turns());
    Ok(())
}

fn cmd_show(source: &ConfigSource, json: bool) -> Result<()> {
    let cfg = resolve_config(source)?;
    let text = if json {
        cfg.to_json_pretty()?
    } else {
        cfg.to_yaml_string()?
    };
    println!("{}", text.trim_end());
    Ok(())
}

fn cmd_play(
    source: &ConfigSource,
    policy: &PolicyArgs,
    seed: u64,
    persona: Option<String>,
    json: bool,
) -> Result<()> {
    let store = build_store(source)?;
    let mut policy = policy_factory(policy, &store)?();
    let mut env = ConversationEnv::new(Arc::clone(&store), seed);
    run_episode(
        &mut env,
        policy.as_mut(),
        &EpisodeConfig {
            seed,
            episode_id: 0,
            persona,
        },
    )?;
    let transcript = env.transcript();
    if json {
        println!("{}", serde_json::to_string_pretty(&transcript)?);
    } else {
        print!("{}", transcript.render_text());
    }
    Ok(())
}

fn cmd_eval(
    source: &ConfigSource,
    policy: &PolicyArgs,
    episodes: u32,
    seed: u64,
    threads: usize,
    persona: Option<String>,
    json: Option<&Path>,
) -> Result<()> {
    let store = build_store(source)?;
    let factory = policy_factory(policy, &store)?;
    let cfg = EvalConfig {
        episodes,
        base_seed: seed,
        threads,
        persona,
    };
    let (summary, per_episode) = evaluate(Arc::clone(&store), factory, &cfg)?;

    let mut telemetry = TelemetrySink::from_env();
    for episode in &per_episode {
        telemetry.log_episode(episode);
    }
    telemetry.log_eval_summary(&summary);
    telemetry.flush();

    println!(
        "{} | policy={} | episodes={} | success={:.3} | timeout={:.3} | mean_turns={:.2} | mean_reward={:.3}",
        summary.config_name,
        summary.policy_version,
        summary.episodes,
        summary.success_rate,
        summary.timeout_rate,
        summary.mean_turns,
        summary.mean_reward
    );
    for p in &summary.per_persona {
        println!(
            "  {:<16} n={:<5} success={:.3} mean_turns={:.2}",
            p.persona_id, p.episodes, p.success_rate, p.mean_turns
        );
    }

    if let Some(path) = json {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn cmd_collect(
    source: &ConfigSource,
    policy: &PolicyArgs,
    out: &Path,
    episodes: u32,
    envs: usize,
    seed: u64,
) -> Result<()> {
    let store = build_store(source)?;
    let factory = policy_factory(policy, &store)?;
    let (records, metadata) = TrajectoryCollector::new(store, envs, seed).collect(episodes, factory)?;
    TrajectoryWriter::new(out)
        .write(&records, &metadata)
        .with_context(|| format!("writing trajectories to {}", out.display()))?;
    println!(
        "wrote {} transitions from {} episodes to {} (success={:.3})",
        metadata.num_transitions,
        metadata.num_episodes,
        out.display(),
        metadata.success_rate
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate { config } => cmd_validate(&config),
        Command::Show { source, json } => cmd_show(&source, json),
        Command::Play {
            source,
            policy,
            seed,
            persona,
            json,
        } => cmd_play(&source, &policy, seed, persona, json),
        Command::Eval {
            source,
            policy,
            episodes,
            seed,
            threads,
            persona,
            json,
        } => cmd_eval(&source, &policy, episodes, seed, threads, persona, json.as_deref()),
        Command::Collect {
            source,
            policy,
            out,
            episodes,
            envs,
            seed,
        } => cmd_collect(&source, &policy, &out, episodes, envs, seed),
    }
}
