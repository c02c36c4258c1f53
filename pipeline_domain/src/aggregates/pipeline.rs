// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Aggregate
//!
//! Owns the graph of [`StageConfig`]s, computes its endpoints (stages no
//! other stage names as an input), builds per-stage dependency chains, and
//! groups a collected input-artifact set by fan-out parameters. The
//! scheduling loop that drives stage execution lives in the infrastructure
//! crate's Arbiter; this aggregate is pure graph bookkeeping.

use crate::entities::{Artifact, StageConfig};
use crate::error::PipelineError;
use crate::value_objects::StageName;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Stage configs in declaration order; order only matters for
    /// deterministic iteration, not for scheduling semantics.
    order: Vec<StageName>,
    stages: HashMap<StageName, StageConfig>,
    endpoints: BTreeSet<StageName>,
}

impl Pipeline {
    /// Builds a pipeline from its stage configs, in declaration order.
    /// Rejects dangling input references and cyclic dependencies.
    pub fn new(configs: Vec<StageConfig>) -> Result<Self, PipelineError> {
        let mut order = Vec::with_capacity(configs.len());
        let mut stages = HashMap::with_capacity(configs.len());
        for config in configs {
            if stages.contains_key(&config.name) {
                return Err(PipelineError::DuplicateStageName(config.name.to_string()));
            }
            order.push(config.name.clone());
            stages.insert(config.name.clone(), config);
        }

        for config in stages.values() {
            for input in &config.inputs {
                if !stages.contains_key(input) {
                    return Err(PipelineError::config_error(format!(
                        "stage '{}' declares unknown input '{}'",
                        config.name, input
                    )));
                }
            }
        }

        let endpoints = Self::find_endpoints(&order, &stages);
        let pipeline = Self { order, stages, endpoints };
        pipeline.reject_cycles()?;
        Ok(pipeline)
    }

    fn find_endpoints(order: &[StageName], stages: &HashMap<StageName, StageConfig>) -> BTreeSet<StageName> {
        let mut endpoints: BTreeSet<StageName> = order.iter().cloned().collect();
        for config in stages.values() {
            for input in &config.inputs {
                endpoints.remove(input);
            }
        }
        endpoints
    }

    fn reject_cycles(&self) -> Result<(), PipelineError> {
        #[derive(PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            name: &'a StageName,
            stages: &'a HashMap<StageName, StageConfig>,
            marks: &mut HashMap<&'a StageName, Mark>,
        ) -> Result<(), PipelineError> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(PipelineError::CyclicDependency(name.to_string())),
                None => {}
            }
            marks.insert(name, Mark::Visiting);
            if let Some(config) = stages.get(name) {
                for input in &config.inputs {
                    visit(input, stages, marks)?;
                }
            }
            marks.insert(name, Mark::Done);
            Ok(())
        }

        let mut marks: HashMap<&StageName, Mark> = HashMap::new();
        for name in &self.order {
            visit(name, &self.stages, &mut marks)?;
        }
        Ok(())
    }

    pub fn stage_names(&self) -> &[StageName] {
        &self.order
    }

    pub fn endpoints(&self) -> &BTreeSet<StageName> {
        &self.endpoints
    }

    pub fn stage(&self, name: &StageName) -> Option<&StageConfig> {
        self.stages.get(name)
    }

    /// The stage's direct predecessors, i.e. dependency-chain level 1.
    pub fn direct_inputs(&self, name: &StageName) -> &[StageName] {
        self.stages.get(name).map(|c| c.inputs.as_slice()).unwrap_or(&[])
    }

    /// Groups a flattened set of input artifacts into one group per point
    /// in the Cartesian product of their fan-out parameters. An artifact
    /// lacking a given parameter is included in every group (it does not
    /// constrain that axis); the empty parameter set yields one group
    /// containing every input artifact.
    pub fn group_by_fanout(input_artifacts: &[Artifact]) -> Vec<Vec<Artifact>> {
        let mut keys: Vec<String> = Vec::new();
        let mut value_lists: Vec<Vec<serde_json::Value>> = Vec::new();
        for artifact in input_artifacts {
            for (param, value) in artifact.fanout_parameters.iter() {
                match keys.iter().position(|k| k == param) {
                    Some(idx) => {
                        if !value_lists[idx].contains(value) {
                            value_lists[idx].push(value.clone());
                        }
                    }
                    None => {
                        keys.push(param.clone());
                        value_lists.push(vec![value.clone()]);
                    }
                }
            }
        }

        if keys.is_empty() {
            return vec![input_artifacts.to_vec()];
        }

        cartesian_product(&value_lists)
            .into_iter()
            .map(|point| {
                input_artifacts
                    .iter()
                    .filter(|artifact| {
                        keys.iter().zip(point.iter()).all(|(key, value)| {
                            match artifact.fanout_parameters.get(key) {
                                Some(artifact_value) => artifact_value == value,
                                None => true,
                            }
                        })
                    })
                    .cloned()
                    .collect()
            })
            .collect()
    }

    /// Full transitive closure of a stage's predecessors; used for
    /// diagnostics and tests, not by the scheduling loop itself, which
    /// only ever needs `direct_inputs`.
    pub fn transitive_inputs(&self, name: &StageName) -> HashSet<StageName> {
        let mut seen = HashSet::new();
        let mut stack = vec![name.clone()];
        while let Some(current) = stack.pop() {
            for input in self.direct_inputs(&current) {
                if seen.insert(input.clone()) {
                    stack.push(input.clone());
                }
            }
        }
        seen
    }
}

fn cartesian_product(lists: &[Vec<serde_json::Value>]) -> Vec<Vec<serde_json::Value>> {
    lists.iter().fold(vec![vec![]], |acc, list| {
        acc.into_iter()
            .flat_map(|prefix| {
                list.iter().map(move |value| {
                    let mut next = prefix.clone();
                    next.push(value.clone());
                    next
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Item, StageKind};
    use crate::value_objects::SerializationType;
    use std::collections::BTreeMap;

    fn name(s: &str) -> StageName {
        StageName::new(s).unwrap()
    }

    #[test]
    fn endpoint_is_a_stage_no_other_stage_names_as_input() {
        let configs = vec![
            StageConfig::new(name("A"), StageKind::Parameter { params: BTreeMap::new() }, vec![]),
            StageConfig::new(name("B"), StageKind::Identity, vec![name("A")]),
        ];
        let pipeline = Pipeline::new(configs).unwrap();
        assert_eq!(pipeline.endpoints(), &BTreeSet::from([name("B")]));
    }

    #[test]
    fn rejects_dangling_input_reference() {
        let configs = vec![StageConfig::new(name("B"), StageKind::Identity, vec![name("A")])];
        assert!(Pipeline::new(configs).is_err());
    }

    #[test]
    fn rejects_duplicate_stage_names() {
        let configs = vec![
            StageConfig::new(name("A"), StageKind::Identity, vec![]),
            StageConfig::new(name("A"), StageKind::Identity, vec![]),
        ];
        assert!(matches!(Pipeline::new(configs), Err(PipelineError::DuplicateStageName(_))));
    }

    #[test]
    fn rejects_cycles() {
        let configs = vec![
            StageConfig::new(name("A"), StageKind::Identity, vec![name("B")]),
            StageConfig::new(name("B"), StageKind::Identity, vec![name("A")]),
        ];
        assert!(matches!(Pipeline::new(configs), Err(PipelineError::CyclicDependency(_))));
    }

    fn artifact_with_fanout(lr: f64, bs: i64) -> Artifact {
        let config = StageConfig::new(name("G"), StageKind::Parameter { params: BTreeMap::new() }, vec![]);
        let mut a = Artifact::new(&config, Item::new(serde_json::json!(null)), SerializationType::Json, "d".into());
        a.fanout_parameters.insert("lr", serde_json::json!(lr));
        a.fanout_parameters.insert("bs", serde_json::json!(bs));
        a
    }

    #[test]
    fn fanout_grouping_produces_one_group_per_cartesian_point() {
        let a = artifact_with_fanout(0.1, 8);
        let b = artifact_with_fanout(0.2, 8);
        let groups = Pipeline::group_by_fanout(&[a, b]);
        assert_eq!(groups.len(), 2);
        for group in &groups {
            assert_eq!(group.len(), 1);
        }
    }

    #[test]
    fn artifacts_without_fanout_params_join_every_group() {
        let tagged = artifact_with_fanout(0.1, 8);
        let config = StageConfig::new(name("Data"), StageKind::Parameter { params: BTreeMap::new() }, vec![]);
        let untagged = Artifact::new(&config, Item::new(serde_json::json!(1)), SerializationType::Json, "d".into());
        let groups = Pipeline::group_by_fanout(&[tagged, untagged]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn empty_input_set_yields_single_empty_group() {
        let groups = Pipeline::group_by_fanout(&[]);
        assert_eq!(groups, vec![Vec::<Artifact>::new()]);
    }
}
