//! Subcommands.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use dpr_core::catalog::CharacterClass;
use dpr_core::dice::Advantage;
use dpr_core::optimizer::{Milestone, MilestoneRequirement, Objective, ResourceStrategy};
use dpr_core::{
    calculate_dpr_curves, BuildConfiguration, CombatOptimizationConfig, CombatOptimizerStore,
    DeltaEngine, DprConfiguration, DprWorker, EngineSettings, PathExplorerStore,
    PathOptimizerConfig, Toggle,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::report;

pub async fn load_settings(path: Option<&Path>) -> Result<EngineSettings> {
    match path {
        Some(path) => EngineSettings::load(path)
            .await
            .with_context(|| format!("Failed to load settings: {}", path.display())),
        None => Ok(EngineSettings::default()),
    }
}

async fn load_build(path: &Path) -> Result<BuildConfiguration> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read build: {}", path.display()))?;
    let build: BuildConfiguration = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse build: {}", path.display()))?;
    build
        .validate()
        .with_context(|| format!("Invalid build: {}", path.display()))?;
    Ok(build)
}

/// Options shared by every command.
#[derive(Args)]
pub struct BuildArgs {
    /// Build JSON file
    #[arg(value_name = "BUILD")]
    build: PathBuf,

    /// Armor class to report at (defaults to the settings' target AC)
    #[arg(long, value_name = "AC")]
    target_ac: Option<i32>,

    /// Roll state: normal, advantage or disadvantage
    #[arg(long, default_value = "normal")]
    advantage: Advantage,
}

impl BuildArgs {
    fn target_ac(&self, settings: &EngineSettings) -> i32 {
        self.target_ac.unwrap_or(settings.target_ac)
    }

    fn dpr_config(&self, settings: &EngineSettings) -> DprConfiguration {
        DprConfiguration::centered_on(self.target_ac(settings)).with_advantage(self.advantage)
    }
}

#[derive(Parser)]
pub struct Curve {
    #[command(flatten)]
    args: BuildArgs,

    /// Lowest AC on the curve
    #[arg(long)]
    ac_min: Option<i32>,

    /// Highest AC on the curve
    #[arg(long)]
    ac_max: Option<i32>,

    /// Never spend slots on smites
    #[arg(long)]
    conservative: bool,
}

impl Curve {
    pub async fn execute(self, settings: &EngineSettings, json: bool) -> Result<()> {
        let build = load_build(&self.args.build).await?;
        let mut config = self
            .args
            .dpr_config(settings)
            .with_greedy_resource_use(!self.conservative);
        if let Some(min) = self.ac_min {
            config.ac_min = min;
        }
        if let Some(max) = self.ac_max {
            config.ac_max = max;
        }

        let curves = calculate_dpr_curves(&build, &config)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&curves)?);
        } else {
            report::print_curves(&build, &curves, self.args.target_ac(settings));
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct Delta {
    #[command(flatten)]
    args: BuildArgs,

    /// Buff to toggle (e.g. haste, bless)
    #[arg(long, conflicts_with = "feat", required_unless_present = "feat")]
    buff: Option<String>,

    /// Feat to toggle (e.g. gwm, sharpshooter)
    #[arg(long)]
    feat: Option<String>,
}

impl Delta {
    pub async fn execute(self, settings: &EngineSettings, json: bool) -> Result<()> {
        let build = load_build(&self.args.build).await?;
        let toggle = match (self.buff, self.feat) {
            (Some(buff), _) => Toggle::Buff(buff),
            (None, Some(feat)) => Toggle::Feat(feat),
            (None, None) => bail!("Pass --buff or --feat"),
        };

        let target_ac = self.args.target_ac(settings);
        let config = self.args.dpr_config(settings);
        let (worker, task) = DprWorker::spawn(settings.worker_queue_size);
        let engine = DeltaEngine::new(Arc::new(worker.clone()), settings.clone());
        // One-shot: no need to wait out the debounce.
        let id =
            engine.calculate_toggle_delta_with(&toggle, &build, &config, target_ac, Duration::ZERO);
        let state = engine
            .wait_for(&id)
            .await
            .context("Delta was cleared before it resolved")?;

        worker.shutdown().await?;
        task.await?;
        info!(delta = %id, value = state.value, "Delta resolved");

        if let Some(error) = &state.error {
            bail!("{id}: {error}");
        }
        if json {
            println!("{}", serde_json::to_string_pretty(&state)?);
        } else {
            report::print_delta(&id, &state, target_ac, settings.neutral_threshold);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Conservative,
    Balanced,
    Aggressive,
}

impl From<Strategy> for ResourceStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Conservative => ResourceStrategy::Conservative,
            Strategy::Balanced => ResourceStrategy::Balanced,
            Strategy::Aggressive => ResourceStrategy::Aggressive,
        }
    }
}

#[derive(Parser)]
pub struct Combat {
    #[command(flatten)]
    args: BuildArgs,

    /// Number of enemies in range of area effects
    #[arg(long, default_value_t = 1)]
    targets: u32,

    /// How freely to spend spell slots
    #[arg(long, value_enum, default_value = "balanced")]
    strategy: Strategy,

    /// At most one spell slot per round
    #[arg(long)]
    no_nova: bool,
}

impl Combat {
    pub async fn execute(self, settings: &EngineSettings, json: bool) -> Result<()> {
        let build = load_build(&self.args.build).await?;
        let config = CombatOptimizationConfig {
            target_ac: self.args.target_ac(settings),
            num_targets: self.targets,
            advantage_state: self.args.advantage,
            resource_strategy: self.strategy.into(),
            allow_nova: !self.no_nova,
            max_alternatives: settings.max_alternatives,
            ..Default::default()
        };

        let store = CombatOptimizerStore::new();
        let result = store
            .run_optimization(build.clone(), config)
            .await
            .map_err(anyhow::Error::msg)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            report::print_combat(&build, &result);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ObjectiveArg {
    /// DPR at level 20
    L20,
    /// Average over the four tiers of play
    TierAverage,
}

#[derive(Parser)]
pub struct Paths {
    #[command(flatten)]
    args: BuildArgs,

    /// Classes the search may take levels in (defaults to all)
    #[arg(long, value_delimiter = ',', value_name = "CLASS")]
    classes: Vec<String>,

    #[arg(long, value_enum, default_value = "l20")]
    objective: ObjectiveArg,

    /// Require Extra Attack by this character level
    #[arg(long, value_name = "LEVEL")]
    extra_attack_by: Option<u8>,

    /// Require this spell slot level by the given character level, as SLOT@LEVEL (e.g. 3@6)
    #[arg(long, value_name = "SLOT@LEVEL")]
    spell_slot: Option<String>,
}

impl Paths {
    pub async fn execute(self, settings: &EngineSettings, json: bool) -> Result<()> {
        let template = load_build(&self.args.build).await?;

        let mut config = PathOptimizerConfig {
            objective: match self.objective {
                ObjectiveArg::L20 => Objective::L20Dpr,
                ObjectiveArg::TierAverage => Objective::TierAverage,
            },
            beam_width: settings.beam_width,
            max_paths: settings.max_paths,
            target_ac: self.args.target_ac(settings),
            dpr_config: self.args.dpr_config(settings),
            ..Default::default()
        };
        if !self.classes.is_empty() {
            config.allowed_classes = self.classes.clone();
        }
        if let Some(level) = self.extra_attack_by {
            config = config.with_milestone(Milestone::new(
                "Extra Attack",
                MilestoneRequirement::ExtraAttack,
                level,
            ));
        }
        if let Some(value) = &self.spell_slot {
            let (slot, level) = parse_slot_milestone(value)?;
            config = config.with_milestone(Milestone::new(
                format!("Level {slot} spells"),
                MilestoneRequirement::SpellSlotLevel { level: slot },
                level,
            ));
        }

        let store = PathExplorerStore::new();
        let paths = store
            .run_optimization(template, config)
            .await
            .map_err(|e| {
                if e.starts_with("Unknown class") {
                    anyhow::anyhow!("{e} (known classes: {})", class_ids())
                } else {
                    anyhow::Error::msg(e)
                }
            })?;

        if json {
            println!("{}", serde_json::to_string_pretty(&paths)?);
        } else {
            report::print_paths(&paths);
        }
        Ok(())
    }
}

fn parse_slot_milestone(value: &str) -> Result<(u8, u8)> {
    let (slot, level) = value
        .split_once('@')
        .with_context(|| format!("Expected SLOT@LEVEL, got '{value}'"))?;
    let slot: u8 = slot.trim().parse().context("Invalid spell slot level")?;
    let level: u8 = level.trim().parse().context("Invalid character level")?;
    if !(1..=9).contains(&slot) {
        bail!("Spell slot level must be 1-9, got {slot}");
    }
    Ok((slot, level))
}

fn class_ids() -> String {
    CharacterClass::all()
        .iter()
        .map(|c| c.id())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slot_milestone() {
        assert_eq!(parse_slot_milestone("3@6").unwrap(), (3, 6));
        assert_eq!(parse_slot_milestone(" 5 @ 9 ").unwrap(), (5, 9));
        assert!(parse_slot_milestone("3").is_err());
        assert!(parse_slot_milestone("10@20").is_err());
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        crate::Cli::command().debug_assert();
    }
}
