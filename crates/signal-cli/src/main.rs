//! Command-line interface for the signal consensus engine

mod render;
mod scripted;

use anyhow::{Context as _, bail};
use clap::{Args, Parser, Subcommand};
use signal_consensus::{
    ConsensusEngine, ConsensusStrategy, EngineConfig, ProfileTable, RegimeIndicators, StageScore,
    StrategyKind, TagFilter, TracingSink,
};
use signal_core::{Direction, Signal};
use signal_utils::{Config, LogFormat};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "signal-cli")]
#[command(about = "Aggregate agent signals into a consensus", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scripted consensus round from a scenario file
    Consensus {
        /// Scenario file listing agents and context
        scenario: PathBuf,
        /// Subject to evaluate; defaults to the scenario's subject
        #[arg(short, long)]
        subject: Option<String>,
        /// majority, weighted, confidence_weighted or veto
        #[arg(long)]
        strategy: Option<String>,
        /// Only count agents with this tag
        #[arg(long)]
        tag: Option<String>,
        /// Default per-agent timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Combine stage scores with a preset weight profile
    Ensemble {
        /// analysis, technical or macro
        #[arg(long, default_value = "analysis")]
        preset: String,
        /// name=score:direction:confidence or name=direction:confidence
        #[arg(long = "stage", required = true)]
        stages: Vec<String>,
        #[command(flatten)]
        indicators: IndicatorArgs,
    },
    /// Classify the market regime from macro indicators
    Regime {
        #[command(flatten)]
        indicators: IndicatorArgs,
    },
    /// List the available consensus strategies
    Strategies,
}

#[derive(Args, Debug, Default)]
struct IndicatorArgs {
    /// Volatility index level
    #[arg(long)]
    vix: Option<f64>,
    /// GDP growth, percent
    #[arg(long)]
    growth: Option<f64>,
    /// Policy rate, percent
    #[arg(long)]
    policy_rate: Option<f64>,
    /// 10Y minus 2Y spread, percentage points
    #[arg(long)]
    yield_spread: Option<f64>,
}

impl IndicatorArgs {
    fn to_indicators(&self) -> RegimeIndicators {
        RegimeIndicators {
            volatility_index: self.vix,
            growth_rate: self.growth,
            policy_rate: self.policy_rate,
            yield_spread: self.yield_spread,
        }
    }

    fn any(&self) -> bool {
        self.to_indicators().available() > 0
    }
}

/// Parse `name=score:direction:confidence` or `name=direction:confidence`
fn parse_stage(raw: &str) -> anyhow::Result<StageScore> {
    let (name, rest) = raw
        .split_once('=')
        .with_context(|| format!("stage {raw:?} is missing '='"))?;
    let parts: Vec<&str> = rest.split(':').collect();

    let (score, direction, confidence) = match parts.as_slice() {
        [score, direction, confidence] => (Some(score.trim().parse::<f64>()?), *direction, *confidence),
        [direction, confidence] => (None, *direction, *confidence),
        _ => bail!("stage {raw:?} must be name=score:direction:confidence"),
    };
    let direction: Direction = direction.parse()?;
    let confidence: f64 = confidence.trim().parse()?;
    let signal = Signal::new(direction, confidence, format!("{name} stage"), "signal-cli")?;

    Ok(match score {
        Some(score) => StageScore::unit(name.trim(), score, signal, confidence),
        None => StageScore::from_signal(name.trim(), signal),
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut app_config = Config::default().with_env_overrides();
    if cli.json_logs {
        app_config.log_format = LogFormat::Json;
    }
    signal_utils::init_tracing_with(&app_config)?;

    let engine_config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    }
    .with_env_overrides()?;

    info!(environment = %app_config.environment, "Starting signal-cli");

    match cli.command {
        Command::Consensus {
            scenario,
            subject,
            strategy,
            tag,
            timeout_ms,
        } => {
            let mut engine_config = engine_config;
            if let Some(ms) = timeout_ms {
                engine_config.agent_timeout = Duration::from_millis(ms);
            }
            let engine = ConsensusEngine::new(engine_config)?.with_sink(Arc::new(TracingSink));

            let scenario = scripted::Scenario::load(&scenario)?;
            let subject = subject
                .or_else(|| scenario.subject.clone())
                .context("no subject given and the scenario has none")?;
            let registry = scenario.registry()?;
            let context = Arc::new(scenario.context());

            let kind = match strategy {
                Some(name) => name.parse::<StrategyKind>()?,
                None => engine.config().default_strategy,
            };
            let base = kind.build(&engine.config().strategy_params);
            let strategy: Box<dyn ConsensusStrategy> = match tag {
                Some(tag) => Box::new(TagFilter::new(tag, base)),
                None => base,
            };

            let report = engine
                .run_consensus(&subject, &registry.snapshot(), strategy.as_ref(), context)
                .await?;

            if cli.json {
                print_json(&report)?;
            } else {
                println!("{}", render::consensus(&report));
            }
        }
        Command::Ensemble {
            preset,
            stages,
            indicators,
        } => {
            let engine = ConsensusEngine::new(engine_config)?;
            let table = ProfileTable::preset(&preset)
                .with_context(|| format!("unknown preset {preset:?} (analysis, technical, macro)"))?;
            let scores = stages
                .iter()
                .map(|raw| parse_stage(raw))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let outcome = if indicators.any() {
                let (regime, outcome) =
                    engine.run_regime_ensemble(&scores, &table, &indicators.to_indicators())?;
                info!(regime = %regime.regime, confidence = regime.confidence, "Regime applied");
                outcome
            } else {
                engine.run_stage_ensemble(&scores, &table)?
            };

            if cli.json {
                print_json(&outcome)?;
            } else {
                println!("{}", render::ensemble(&outcome));
            }
        }
        Command::Regime { indicators } => {
            let engine = ConsensusEngine::new(engine_config)?;
            let state = engine.detect_regime(&indicators.to_indicators());

            if cli.json {
                print_json(&state)?;
            } else {
                println!("{}", render::regime(&state));
            }
        }
        Command::Strategies => {
            for kind in StrategyKind::ALL {
                let marker = if kind == engine_config.default_strategy { " (default)" } else { "" };
                println!("{kind}{marker}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_stage_with_score() {
        let stage = parse_stage("quantitative=0.72:bullish:0.6").unwrap();
        assert_eq!(stage.stage, "quantitative");
        assert_eq!(stage.directional_value(), 0.72);
        assert_eq!(stage.confidence, 0.6);
    }

    #[test]
    fn test_parse_stage_direction_only() {
        let stage = parse_stage("trend=bearish:0.7").unwrap();
        assert_eq!(stage.directional_value(), 0.0);
        assert_eq!(stage.signal.direction(), Direction::Bearish);
    }

    #[test]
    fn test_parse_stage_rejects_malformed() {
        assert!(parse_stage("trend").is_err());
        assert!(parse_stage("trend=sideways:0.5").is_err());
        assert!(parse_stage("trend=bullish:1.5").is_err());
        assert!(parse_stage("trend=a:b:c:d").is_err());
    }

    #[test]
    fn test_parse_args() {
        let cli = Cli::try_parse_from([
            "signal-cli",
            "ensemble",
            "--preset",
            "technical",
            "--stage",
            "trend=bullish:0.7",
            "--stage",
            "momentum=bullish:0.6",
            "--vix",
            "12",
        ])
        .unwrap();
        match cli.command {
            Command::Ensemble { preset, stages, indicators } => {
                assert_eq!(preset, "technical");
                assert_eq!(stages.len(), 2);
                assert!(indicators.any());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
