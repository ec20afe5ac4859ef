//! Dependency graph ordering
//!
//! Computes the launch order over declared `depends_on` edges. The order is
//! deterministic: among services whose dependencies are all satisfied, the
//! one declared first in the manifest launches first.

use std::collections::HashMap;

use crate::topology::{ServiceSpec, TopologyError};

/// Topologically sorts services so every dependency precedes its dependents
///
/// Ties break by declaration order, so repeated runs of the same manifest
/// launch in the same sequence. Fails on self edges, edges to undeclared
/// services, and cycles.
pub fn launch_order(services: &[ServiceSpec]) -> Result<Vec<&ServiceSpec>, TopologyError> {
    let index_by_name: HashMap<&str, usize> = services
        .iter()
        .enumerate()
        .map(|(i, spec)| (spec.name.as_str(), i))
        .collect();

    // dependents[i] lists services that wait on i; indegree counts distinct deps
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); services.len()];
    let mut indegree: Vec<usize> = vec![0; services.len()];

    for (i, spec) in services.iter().enumerate() {
        let mut seen: Vec<usize> = Vec::new();
        for dep in &spec.depends_on {
            if dep == &spec.name {
                return Err(TopologyError::SelfDependency(spec.name.clone()));
            }
            let Some(&j) = index_by_name.get(dep.as_str()) else {
                return Err(TopologyError::UnknownDependency {
                    service: spec.name.clone(),
                    dependency: dep.clone(),
                });
            };
            // A dependency listed twice still only gates once
            if seen.contains(&j) {
                continue;
            }
            seen.push(j);
            dependents[j].push(i);
            indegree[i] += 1;
        }
    }

    // Kahn's algorithm with the ready set kept sorted by declaration index
    let mut ready: Vec<usize> = (0..services.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order: Vec<&ServiceSpec> = Vec::with_capacity(services.len());

    while !ready.is_empty() {
        let i = ready.remove(0);
        order.push(&services[i]);
        for &j in &dependents[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                let pos = ready.partition_point(|&k| k < j);
                ready.insert(pos, j);
            }
        }
    }

    if order.len() < services.len() {
        let stuck: Vec<&str> = services
            .iter()
            .enumerate()
            .filter(|(i, _)| indegree[*i] > 0)
            .map(|(_, spec)| spec.name.as_str())
            .collect();
        return Err(TopologyError::DependencyCycle(stuck.join(", ")));
    }

    Ok(order)
}
