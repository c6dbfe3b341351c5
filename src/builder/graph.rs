//! The frozen task graph handed to the execution engine.

use serde::Serialize;

use crate::builder::task::PlannedTask;
use crate::core::platform::PlatformFilter;
use crate::util::hash::Fingerprint;

/// A task plus the positions of the tasks it must wait for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskNode {
    #[serde(flatten)]
    pub task: PlannedTask,
    /// Indices into [`TaskGraph::tasks`], ascending.
    pub antecedents: Vec<usize>,
}

/// A declared dependency as recorded in a target summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencySummary {
    pub name: String,
    /// Canonical (sorted) platform filters.
    pub platform_filters: Vec<PlatformFilter>,
}

/// What was built for a target, for logs and downstream tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
    pub name: String,
    pub project: String,
    pub kind: String,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zippered_platform: Option<String>,
    pub archs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub module_only_archs: Vec<String>,
    pub variants: Vec<String>,
    pub dependencies: Vec<DependencySummary>,
}

/// Immutable result of a construction pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskGraph {
    pub tasks: Vec<TaskNode>,
    /// Targets in build order.
    pub targets: Vec<TargetSummary>,
    /// False when output collisions were found; the graph is still
    /// complete so every colliding producer can be shown.
    pub valid: bool,
}

impl TaskGraph {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Total number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.tasks.iter().map(|t| t.antecedents.len()).sum()
    }

    /// Tasks whose rule name is `rule`, in graph order.
    pub fn tasks_with_rule<'g>(&'g self, rule: &'g str) -> impl Iterator<Item = &'g PlannedTask> + 'g {
        self.tasks
            .iter()
            .map(|n| &n.task)
            .filter(move |t| t.rule_name() == rule)
    }

    /// Position of the task with exactly this rule-info.
    pub fn position(&self, rule_info: &[&str]) -> Option<usize> {
        self.tasks
            .iter()
            .position(|n| n.task.rule_info.iter().map(String::as_str).eq(rule_info.iter().copied()))
    }

    /// Tasks (not gates) belonging to `target`.
    pub fn tasks_of<'g>(&'g self, target: &'g str) -> impl Iterator<Item = &'g PlannedTask> + 'g {
        self.tasks
            .iter()
            .map(|n| &n.task)
            .filter(move |t| t.target == target && !t.is_gate())
    }

    /// Whether `later` transitively depends on `earlier`.
    pub fn depends_on(&self, later: usize, earlier: usize) -> bool {
        let mut seen = vec![false; self.tasks.len()];
        let mut stack = vec![later];
        while let Some(i) = stack.pop() {
            for &a in &self.tasks[i].antecedents {
                if a == earlier {
                    return true;
                }
                if !seen[a] {
                    seen[a] = true;
                    stack.push(a);
                }
            }
        }
        false
    }

    /// Stable fingerprint of everything the execution engine consumes.
    pub fn signature(&self) -> String {
        let mut fp = Fingerprint::new();
        fp.update_bool(self.valid);
        for node in &self.tasks {
            let task = &node.task;
            fp.update_strs(task.rule_info.iter().map(String::as_str))
                .update_strs(task.command_line.iter().map(String::as_str))
                .update_str(&task.working_directory)
                .update_strs(task.environment.iter().flat_map(|(k, v)| [k.as_str(), v.as_str()]))
                .update_strs(task.inputs.iter().map(String::as_str))
                .update_strs(task.outputs.iter().map(String::as_str))
                .update_opt(task.action.as_deref())
                .update_opt(task.aux_contents.as_deref())
                .update_bool(task.always_out_of_date);
            for a in &node.antecedents {
                fp.update_usize(*a);
            }
        }
        for target in &self.targets {
            fp.update_str(&target.name).update_str(&target.platform);
            fp.update_strs(target.archs.iter().map(String::as_str));
            for dep in &target.dependencies {
                fp.update_str(&dep.name);
                let filters: Vec<String> = dep.platform_filters.iter().map(|f| f.to_string()).collect();
                fp.update_strs(filters.iter().map(String::as_str));
            }
        }
        fp.finish()
    }

    /// Pretty JSON for the execution engine.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
