//! Plain-text output.

use dpr_core::{
    BuildConfiguration, CombatOptimizationResult, DeltaState, DeltaTrend, DprCurves, LevelPath,
};

pub fn print_curves(build: &BuildConfiguration, curves: &DprCurves, target_ac: i32) {
    println!("{} (level {})", build.name, build.total_level());
    println!("{:>4}  {:>8}  {:>8}  {:>8}", "AC", "normal", "adv", "disadv");

    for (i, point) in curves.normal_curve.iter().enumerate() {
        let marker = if point.ac == target_ac { "<" } else { "" };
        println!(
            "{:>4}  {:>8.2}  {:>8.2}  {:>8.2} {marker}",
            point.ac,
            point.dpr,
            curves.advantage_curve.get(i).map_or(0.0, |p| p.dpr),
            curves.disadvantage_curve.get(i).map_or(0.0, |p| p.dpr),
        );
    }
}

pub fn print_delta(id: &str, state: &DeltaState, target_ac: i32, threshold: f64) {
    let sign = match DeltaTrend::classify(state.value, threshold) {
        DeltaTrend::Positive => "+",
        DeltaTrend::Negative => "",
        DeltaTrend::Neutral => "~",
    };
    println!("{id} at AC {target_ac}: {sign}{:.2} DPR", state.value);
    if let Some(metrics) = &state.additional_metrics {
        print!("  {:.2} -> {:.2}", metrics.base_dpr, metrics.modified_dpr);
        match metrics.percent_change {
            Some(percent) => println!(" ({percent:+.1}%)"),
            None => println!(),
        }
    }
}

pub fn print_combat(build: &BuildConfiguration, result: &CombatOptimizationResult) {
    println!(
        "{}: {:.2} expected damage over {} rounds",
        build.name,
        result.total_expected_damage,
        result.rounds.len()
    );
    for round in &result.rounds {
        println!("  Round {}: {} ({:.2})", round.round, round.summary(), round.expected_damage);
        if !round.resources_consumed.is_empty() {
            println!("    spends {}", round.resources_consumed.join(", "));
        }
    }
    println!(
        "  Resources: {:.1} ({:.2} damage per point)",
        result.resource_value, result.resource_efficiency
    );

    if !result.alternatives.is_empty() {
        println!("Alternatives:");
        for alt in &result.alternatives {
            println!(
                "  {}: {:.2} ({:+.2})",
                alt.name, alt.total_expected_damage, alt.damage_difference
            );
        }
    }
}

pub fn print_paths(paths: &[LevelPath]) {
    for (rank, path) in paths.iter().enumerate() {
        println!("{}. {} (score {:.2})", rank + 1, path.summary(), path.score);

        let order: Vec<&str> = path.classes.iter().map(|c| c.id()).collect();
        println!("   {}", order.join(" "));

        let checkpoints: Vec<String> = [1usize, 5, 11, 17, 20]
            .iter()
            .filter_map(|&lvl| {
                path.dpr_progression
                    .get(lvl - 1)
                    .map(|dpr| format!("L{lvl} {dpr:.1}"))
            })
            .collect();
        println!("   DPR: {}", checkpoints.join(", "));

        for milestone in &path.milestones {
            match milestone.level_achieved {
                Some(level) => println!("   {} at level {level}", milestone.name),
                None => println!("   {} not reached", milestone.name),
            }
        }
    }
}

