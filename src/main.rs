use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use playground_rl::game::{GridWorld, GridWorldConfig};
use playground_rl::modes::{EvaluateMode, TrainConfig, TrainMode};
use playground_rl::rl::{
    Algorithm, DqnAlgorithm, DqnConfig, PpoAlgorithm, PpoConfig, TrainingBackend,
    default_device, load_checkpoint,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "playground_rl")]
#[command(version, about = "Train and evaluate PPO and DQN agents on a grid world")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train an agent, optionally continuing from a checkpoint
    Train {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of training episodes
        #[arg(long, default_value = "500")]
        episodes: usize,

        /// Where to save the final weights (checkpoints go next to it)
        #[arg(long)]
        save: Option<PathBuf>,

        /// Save a checkpoint every N episodes
        #[arg(long, default_value = "100")]
        checkpoint_frequency: usize,

        /// Log progress every N episodes
        #[arg(long, default_value = "10")]
        log_frequency: usize,

        /// Force a PPO update at the end of every episode
        #[arg(long)]
        flush_on_episode_end: bool,
    },

    /// Play episodes with a saved agent
    Evaluate {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of evaluation episodes
        #[arg(long, default_value = "10")]
        episodes: usize,

        /// Log every frame of the first episode at debug level
        #[arg(long)]
        render: bool,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Learning algorithm
    #[arg(long, value_enum, default_value = "ppo")]
    algorithm: AlgorithmKind,

    /// Hyperparameter JSON file (camelCase keys, missing keys use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Checkpoint to load before running
    #[arg(long)]
    load: Option<PathBuf>,

    /// Seed for network init and action sampling
    #[arg(long, default_value = "0")]
    seed: String,

    /// Side length of the square grid
    #[arg(long, default_value = "25")]
    grid_size: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmKind {
    Ppo,
    Dqn,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train {
            common,
            episodes,
            save,
            checkpoint_frequency,
            log_frequency,
            flush_on_episode_end,
        } => {
            let mut config = TrainConfig::new(episodes, save);
            config.checkpoint_frequency = checkpoint_frequency;
            config.log_frequency = log_frequency;
            config.seed = common.seed.clone();
            config.flush_on_episode_end = flush_on_episode_end;

            match common.algorithm {
                AlgorithmKind::Ppo => train(build_ppo(&common)?, &common, config),
                AlgorithmKind::Dqn => train(build_dqn(&common, false)?, &common, config),
            }
        }
        Command::Evaluate {
            common,
            episodes,
            render,
        } => match common.algorithm {
            AlgorithmKind::Ppo => evaluate(build_ppo(&common)?, &common, episodes, render),
            AlgorithmKind::Dqn => evaluate(build_dqn(&common, true)?, &common, episodes, render),
        },
    }
}

fn build_ppo(common: &CommonArgs) -> Result<PpoAlgorithm<TrainingBackend>> {
    let config = match &common.config {
        Some(path) => PpoConfig::from_json_file(path)?,
        None => PpoConfig::default(),
    };
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid PPO config: {e}"))?;
    Ok(PpoAlgorithm::new(config, default_device()))
}

/// `greedy` pins epsilon to its final value for evaluation
fn build_dqn(common: &CommonArgs, greedy: bool) -> Result<DqnAlgorithm<TrainingBackend>> {
    let mut config = match &common.config {
        Some(path) => DqnConfig::from_json_file(path)?,
        None => DqnConfig::default(),
    };
    if greedy {
        config.epsilon_start = config.epsilon_final;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid DQN config: {e}"))?;
    Ok(DqnAlgorithm::new(config, default_device()))
}

fn build_env(common: &CommonArgs) -> Result<GridWorld> {
    let config = GridWorldConfig::new(common.grid_size);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid grid world: {e}"))?;
    Ok(GridWorld::new(config))
}

fn restore<A: Algorithm>(algorithm: &mut A, path: &Path, seed: &str) -> Result<()> {
    let metadata = load_checkpoint(algorithm, path, seed)?;
    info!(
        path = %path.display(),
        obs_shape = ?metadata.obs_shape,
        action_size = metadata.action_size,
        version = %metadata.version,
        "resuming from checkpoint"
    );
    Ok(())
}

fn train<A: Algorithm>(mut algorithm: A, common: &CommonArgs, config: TrainConfig) -> Result<()> {
    if let Some(path) = &common.load {
        restore(&mut algorithm, path, &common.seed)?;
    }
    let env = build_env(common)?;
    let mut train_mode = TrainMode::new(algorithm, env, config)?;
    train_mode.run()?;
    Ok(())
}

fn evaluate<A: Algorithm>(
    mut algorithm: A,
    common: &CommonArgs,
    episodes: usize,
    render: bool,
) -> Result<()> {
    let path = common
        .load
        .as_deref()
        .context("evaluate needs a checkpoint, pass --load <path>")?;
    restore(&mut algorithm, path, &common.seed)?;

    let mut evaluate_mode = EvaluateMode::new(algorithm, build_env(common)?)?;
    if render && episodes > 0 {
        let summary = evaluate_mode.run_rendered_episode()?;
        info!(
            reward = summary.reward,
            steps = summary.steps,
            success = summary.success,
            "rendered episode finished"
        );
    }
    evaluate_mode.run(episodes)?;
    Ok(())
}
