//! Gradient-boosted tree ensemble loaded from an XGBoost JSON model (`save_model("*.json")`).
//! Binary objectives only: probability = sigmoid(logit(base_score) + sum of leaf values).

use super::ModelError;
use crate::features::{FeatureVector, FEATURE_COUNT};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct ModelFile {
    learner: Learner,
}

#[derive(Deserialize)]
struct Learner {
    gradient_booster: GradientBooster,
    learner_model_param: LearnerModelParam,
    objective: Objective,
}

#[derive(Deserialize)]
struct GradientBooster {
    name: String,
    #[serde(default)]
    model: Option<GbTreeModel>,
}

#[derive(Deserialize)]
struct GbTreeModel {
    trees: Vec<RawTree>,
}

#[derive(Deserialize)]
struct LearnerModelParam {
    base_score: String,
    #[serde(default)]
    num_feature: Option<String>,
}

#[derive(Deserialize)]
struct Objective {
    name: String,
}

#[derive(Deserialize)]
struct RawTree {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f32>,
    default_left: Vec<Flag>,
    #[serde(default)]
    split_type: Vec<i32>,
}

/// Older exports write `default_left` as 0/1, newer ones as booleans.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(i) => *i != 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    left: i32,
    right: i32,
    feature: usize,
    /// Split threshold, or the leaf value when `left == -1`
    condition: f32,
    default_left: bool,
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_raw(index: usize, raw: RawTree) -> Result<Self, ModelError> {
        let len = raw.left_children.len();
        let malformed = |reason: String| ModelError::MalformedTree { tree: index, reason };
        if len == 0 {
            return Err(malformed("no nodes".into()));
        }
        if raw.right_children.len() != len
            || raw.split_indices.len() != len
            || raw.split_conditions.len() != len
            || raw.default_left.len() != len
        {
            return Err(malformed("node arrays differ in length".into()));
        }
        if raw.split_type.iter().any(|t| *t != 0) {
            return Err(malformed("categorical splits are not supported".into()));
        }

        let mut nodes = Vec::with_capacity(len);
        for i in 0..len {
            let (left, right) = (raw.left_children[i], raw.right_children[i]);
            let feature = raw.split_indices[i] as usize;
            if left != -1 {
                // children always follow their parent, which also rules out cycles
                for child in [left, right] {
                    if child <= i as i32 || child as usize >= len {
                        return Err(malformed(format!("node {i} has invalid child {child}")));
                    }
                }
                if feature >= FEATURE_COUNT {
                    return Err(malformed(format!("node {i} splits on feature {feature}")));
                }
            }
            nodes.push(Node {
                left,
                right,
                feature,
                condition: raw.split_conditions[i],
                default_left: raw.default_left[i].is_set(),
            });
        }
        Ok(Self { nodes })
    }

    fn leaf_value(&self, x: &[f32; FEATURE_COUNT]) -> f32 {
        let mut i = 0usize;
        loop {
            let node = &self.nodes[i];
            if node.left == -1 {
                return node.condition;
            }
            let v = x[node.feature];
            let go_left = if v.is_nan() { node.default_left } else { v < node.condition };
            i = if go_left { node.left } else { node.right } as usize;
        }
    }
}

#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    trees: Vec<Tree>,
    base_margin: f64,
}

impl TreeEnsemble {
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> Result<Self, ModelError> {
        let file: ModelFile = serde_json::from_str(data)?;
        let learner = file.learner;

        let objective = learner.objective.name;
        if objective != "binary:logistic" && objective != "reg:logistic" {
            return Err(ModelError::UnsupportedObjective(objective));
        }
        if learner.gradient_booster.name != "gbtree" {
            return Err(ModelError::UnsupportedBooster(learner.gradient_booster.name));
        }

        let params = learner.learner_model_param;
        if let Some(found) = params.num_feature.as_deref().and_then(|n| n.trim().parse::<usize>().ok()) {
            if found != FEATURE_COUNT {
                return Err(ModelError::FeatureMismatch {
                    expected: FEATURE_COUNT,
                    found,
                });
            }
        }
        let base_score = parse_base_score(&params.base_score)?;

        let raw_trees = learner
            .gradient_booster
            .model
            .map(|m| m.trees)
            .unwrap_or_default();
        let trees = raw_trees
            .into_iter()
            .enumerate()
            .map(|(i, raw)| Tree::from_raw(i, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            trees,
            base_margin: (base_score / (1.0 - base_score)).ln(),
        })
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn margin(&self, features: &FeatureVector) -> f64 {
        let x = features.to_f32();
        self.trees
            .iter()
            .fold(self.base_margin, |acc, t| acc + t.leaf_value(&x) as f64)
    }

    pub fn predict(&self, features: &FeatureVector) -> f64 {
        1.0 / (1.0 + (-self.margin(features)).exp())
    }
}

/// `"5E-1"` in 1.x exports, `"[5E-1]"` in 2.x.
fn parse_base_score(raw: &str) -> Result<f64, ModelError> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    match trimmed.parse::<f64>() {
        Ok(v) if v > 0.0 && v < 1.0 => Ok(v),
        _ => Err(ModelError::BaseScore(raw.to_string())),
    }
}
