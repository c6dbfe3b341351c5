//! Task graph assembly.
//!
//! Every target gets one gate task per [`Gate`], chained in sequence. Each
//! planned task waits for its stage's start gate and is waited for by its
//! stage's end gate; tasks reading a node wait for every task producing it.
//! A dependent target's entry gate waits for its dependencies'
//! generated-headers gate (their exit gate for aggregate and external
//! targets), so interface consumers start early.

use std::collections::{HashMap, HashSet};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::DiGraph;

use crate::builder::diagnostics::{DiagnosticsCollector, ASSEMBLY_SCOPE};
use crate::builder::graph::{TaskGraph, TaskNode};
use crate::builder::producers::TargetOutput;
use crate::builder::task::{gate_node, is_virtual, Gate, PlannedTask};
use crate::builder::ConstructionError;
use crate::util::diagnostic::Diagnostic;

/// Assemble the per-target outputs (in build order) into a frozen graph.
pub fn assemble(
    outputs: Vec<TargetOutput>,
    collector: &DiagnosticsCollector,
) -> Result<TaskGraph, ConstructionError> {
    let mut diagnostics = Vec::new();
    let projects: HashMap<String, String> = outputs
        .iter()
        .map(|o| (o.summary.name.clone(), o.summary.project.clone()))
        .collect();

    let mut tasks: Vec<PlannedTask> = Vec::new();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut targets = Vec::with_capacity(outputs.len());
    // gate task positions per target, indexed by `Gate::index`
    let mut gates: HashMap<String, [usize; 9]> = HashMap::new();

    for output in &outputs {
        let name = output.name();
        let mut positions = [0; 9];
        for gate in Gate::SEQUENCE {
            let mut task = PlannedTask::gate(name, gate);
            match gate {
                Gate::Entry => {
                    for &dep in &output.dependencies {
                        let Some(dependency) = outputs.get(dep) else {
                            return Err(ConstructionError::Internal {
                                message: format!("dependency position {} of `{}` out of range", dep, name),
                            });
                        };
                        let dep_gate = if dependency.gates_on_exit {
                            Gate::Exit
                        } else {
                            Gate::GeneratedHeadersReady
                        };
                        task.inputs.push(gate_node(dependency.name(), dep_gate));
                    }
                }
                Gate::CopyHeadersCompletion => {
                    for &dep in &output.dependencies {
                        if let Some(dependency) = outputs.get(dep) {
                            task.inputs
                                .push(gate_node(dependency.name(), Gate::CopyHeadersCompletion));
                        }
                    }
                }
                _ => {}
            }
            positions[gate.index()] = tasks.len();
            seen.insert(task.rule_info.clone());
            tasks.push(task);
        }
        gates.insert(name.to_string(), positions);
        tracing::trace!("inserted gates for `{}`", name);

        for task in &output.tasks {
            if !seen.insert(task.rule_info.clone()) {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Unexpected duplicate tasks: {}",
                        task.rule_info.join(" ")
                    ))
                    .in_target(name, &output.summary.project),
                );
                continue;
            }
            tasks.push(task.clone());
        }
        targets.push(output.summary.clone());
    }

    // producers of every node, in task order
    let mut producers: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut output_order: Vec<&str> = Vec::new();
    for (i, task) in tasks.iter().enumerate() {
        for out in &task.outputs {
            let entry = producers.entry(out.as_str()).or_default();
            if entry.is_empty() {
                output_order.push(out.as_str());
            }
            if !entry.contains(&i) {
                entry.push(i);
            }
        }
    }

    let mut valid = true;
    for out in &output_order {
        let owners = &producers[out];
        if owners.len() < 2 || is_virtual(out) {
            continue;
        }
        valid = false;
        let first = &tasks[owners[0]];
        let mut diagnostic = Diagnostic::error(format!("Multiple commands produce '{}'", out));
        if let Some(project) = projects.get(&first.target) {
            diagnostic = diagnostic.in_target(first.target.as_str(), project.as_str());
        }
        for &owner in owners {
            let task = &tasks[owner];
            diagnostic = diagnostic.with_context(format!(
                "Target '{}': {}",
                task.target,
                task.rule_info.join(" ")
            ));
        }
        diagnostics.push(diagnostic);
    }

    let mut antecedents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (i, task) in tasks.iter().enumerate() {
        if !task.is_gate() {
            let Some(positions) = gates.get(&task.target) else {
                return Err(ConstructionError::Internal {
                    message: format!("task `{}` has no owning target", task.rule_info.join(" ")),
                });
            };
            let (start, end) = task.stage.gates();
            antecedents[i].push(positions[start.index()]);
            antecedents[positions[end.index()]].push(i);
        }
        for input in &task.inputs {
            if let Some(owners) = producers.get(input.as_str()) {
                antecedents[i].extend(owners.iter().copied().filter(|&j| j != i));
            }
        }
    }
    for list in &mut antecedents {
        list.sort_unstable();
        list.dedup();
    }

    check_cycles(&tasks, &antecedents)?;

    let nodes: Vec<TaskNode> = tasks
        .into_iter()
        .zip(antecedents)
        .map(|(task, antecedents)| TaskNode { task, antecedents })
        .collect();
    let graph = TaskGraph {
        tasks: nodes,
        targets,
        valid,
    };
    tracing::debug!(
        "assembled {} task(s) with {} edge(s) across {} target(s)",
        graph.len(),
        graph.edge_count(),
        graph.targets.len()
    );
    if !valid {
        tracing::warn!("task graph has conflicting outputs");
    }
    collector.append(ASSEMBLY_SCOPE, diagnostics);
    Ok(graph)
}

/// A task-level cycle is a producer defect and fails the whole pass.
fn check_cycles(tasks: &[PlannedTask], antecedents: &[Vec<usize>]) -> Result<(), ConstructionError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(tasks.len(), 0);
    let nodes: Vec<_> = (0..tasks.len()).map(|i| graph.add_node(i)).collect();
    for (i, list) in antecedents.iter().enumerate() {
        for &j in list {
            graph.add_edge(nodes[j], nodes[i], ());
        }
    }
    tracing::trace!("checking {} task(s) for cycles", tasks.len());
    if toposort(&graph, None).is_ok() {
        return Ok(());
    }

    let cycle = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .min_by_key(|scc| scc.iter().map(|n| graph[*n]).min().unwrap_or(usize::MAX))
        .map(|mut scc| {
            scc.sort_by_key(|n| graph[*n]);
            scc.into_iter()
                .map(|n| tasks[graph[n]].rule_info.join(" "))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Err(ConstructionError::TaskCycle { tasks: cycle })
}
