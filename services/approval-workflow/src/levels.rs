//! Approval ladder: tier selection and the YAML configuration format.

use serde::{Deserialize, Serialize};

use covenant_models::ApprovalLevel;
use covenant_utils::{validate_model, CovenantError, CovenantResult};

/// One tier as written in the levels file. Ids are assigned when loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSpec {
    pub name: String,
    pub min_amount: f64,
    #[serde(default)]
    pub max_amount: Option<f64>,
    pub required_role: String,
    pub escalation_days: i64,
    pub sequence: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelFile {
    pub levels: Vec<LevelSpec>,
}

impl From<LevelSpec> for ApprovalLevel {
    fn from(spec: LevelSpec) -> Self {
        ApprovalLevel::new(
            spec.name,
            spec.min_amount,
            spec.max_amount,
            spec.required_role,
            spec.escalation_days,
            spec.sequence,
        )
    }
}

/// `[0, 1000)`, `[1000, 10000)`, `[10000, ∞)`.
pub fn default_ladder() -> Vec<ApprovalLevel> {
    vec![
        ApprovalLevel::new("Accounts Payable Review", 0.0, Some(1_000.0), "ap_clerk", 2, 1),
        ApprovalLevel::new("Finance Manager Approval", 1_000.0, Some(10_000.0), "finance_manager", 3, 2),
        ApprovalLevel::new("Finance Director Approval", 10_000.0, None, "finance_director", 5, 3),
    ]
}

pub fn parse_levels(yaml: &str) -> CovenantResult<Vec<ApprovalLevel>> {
    let file: LevelFile = serde_yaml::from_str(yaml)?;
    let levels: Vec<ApprovalLevel> = file.levels.into_iter().map(ApprovalLevel::from).collect();
    check_ladder(&levels)?;
    Ok(levels)
}

pub fn load_levels_file(path: &str) -> CovenantResult<Vec<ApprovalLevel>> {
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| CovenantError::configuration(format!("cannot read {}: {}", path, e)))?;
    parse_levels(&yaml)
}

fn check_ladder(levels: &[ApprovalLevel]) -> CovenantResult<()> {
    if levels.is_empty() {
        return Err(CovenantError::configuration("approval ladder has no levels"));
    }

    let mut sequences: Vec<u32> = Vec::with_capacity(levels.len());
    for level in levels {
        validate_model(level)?;
        if sequences.contains(&level.sequence) {
            return Err(CovenantError::configuration(format!(
                "duplicate approval level sequence {}",
                level.sequence
            )));
        }
        sequences.push(level.sequence);
    }

    Ok(())
}

/// Tier for `amount`. Overlapping ranges resolve to the highest sequence;
/// amounts outside every range go to the highest tier whose floor they
/// clear, or the lowest tier when they clear none.
pub fn select_level(levels: &[ApprovalLevel], amount: f64) -> Option<&ApprovalLevel> {
    levels
        .iter()
        .filter(|level| level.contains(amount))
        .max_by_key(|level| level.sequence)
        .or_else(|| {
            levels
                .iter()
                .filter(|level| level.min_amount <= amount)
                .max_by_key(|level| level.sequence)
        })
        .or_else(|| levels.iter().min_by_key(|level| level.sequence))
}

/// The tier directly above `current_sequence`, if any.
pub fn next_level(levels: &[ApprovalLevel], current_sequence: u32) -> Option<&ApprovalLevel> {
    levels
        .iter()
        .filter(|level| level.sequence > current_sequence)
        .min_by_key(|level| level.sequence)
}
