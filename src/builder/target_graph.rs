//! Target ordering.
//!
//! Targets are ordered by explicit dependencies plus implicit ones (a
//! Frameworks or Copy Files entry naming another target's product). The
//! sort is Kahn's algorithm with declaration order as the tie-break, so the
//! result never depends on hash iteration. Cycles are reported and broken
//! at their first-declared edge.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::builder::context::BuildContext;
use crate::core::phase::{BuildPhase, BuildableRef};
use crate::core::platform::filters_admit;
use crate::core::target::Target;
use crate::core::workspace::Project;
use crate::util::diagnostic::Diagnostic;

/// A target at its position in the build order.
#[derive(Debug, Clone)]
pub struct OrderedTarget<'a> {
    /// Position in the build order
    pub ordinal: usize,
    pub project: &'a Project,
    pub target: &'a Target,
    /// Positions of the targets this one depends on, in declaration order
    pub dependencies: Vec<usize>,
}

/// Result of ordering.
#[derive(Debug, Clone)]
pub struct TargetOrder<'a> {
    pub targets: Vec<OrderedTarget<'a>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl TargetOrder<'_> {
    /// Target names in build order.
    pub fn names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.target.name()).collect()
    }
}

/// Edge weight: declaration rank, used to pick which cycle edge to break.
type TargetGraph = StableDiGraph<usize, usize>;

fn add_edge(graph: &mut TargetGraph, nodes: &[NodeIndex], dep: usize, dependent: usize, rank: &mut usize) {
    if dep == dependent || graph.contains_edge(nodes[dep], nodes[dependent]) {
        return;
    }
    graph.add_edge(nodes[dep], nodes[dependent], *rank);
    *rank += 1;
}

/// Order every target of the workspace.
pub fn order<'a>(ctx: &BuildContext<'a>) -> TargetOrder<'a> {
    let decl: Vec<(&'a Project, &'a Target)> = ctx.workspace.targets_with_projects().collect();
    let index: HashMap<&str, usize> = decl
        .iter()
        .enumerate()
        .map(|(i, (_, t))| (t.name(), i))
        .collect();
    let mut diagnostics = Vec::new();

    let mut graph = TargetGraph::default();
    let nodes: Vec<NodeIndex> = (0..decl.len()).map(|i| graph.add_node(i)).collect();
    let mut rank = 0;

    for (i, (project, target)) in decl.iter().enumerate() {
        for dep in target.dependencies() {
            if !filters_admit(&dep.platform_filters, ctx.platform) {
                tracing::debug!(
                    "dependency `{}` of `{}` filtered out on {}",
                    dep.name,
                    target.name(),
                    ctx.platform
                );
                continue;
            }
            match index.get(dep.name.as_str()) {
                Some(&j) => add_edge(&mut graph, &nodes, j, i, &mut rank),
                None => diagnostics.push(
                    Diagnostic::warning(format!(
                        "dependency '{}' does not name a target in the workspace",
                        dep.name
                    ))
                    .in_target(target.name(), &project.name),
                ),
            }
        }

        for file in implicit_refs(target) {
            let found = match file {
                BuildableRef::TargetProduct(name) => index.get(name.as_str()).copied(),
                BuildableRef::Auto(name) if project.file_by_name(name).is_none() => ctx
                    .product_named(name)
                    .and_then(|p| index.get(p.target.as_str()).copied()),
                _ => None,
            };
            if let Some(j) = found {
                add_edge(&mut graph, &nodes, j, i, &mut rank);
            }
        }
    }

    let mut indegree: Vec<usize> = nodes
        .iter()
        .map(|&n| graph.edges_directed(n, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut done = vec![false; decl.len()];
    let mut sequence = Vec::with_capacity(decl.len());

    loop {
        while let Some(Reverse(i)) = ready.pop() {
            done[i] = true;
            sequence.push(i);
            for edge in graph.edges_directed(nodes[i], Direction::Outgoing) {
                let t = graph[edge.target()];
                indegree[t] -= 1;
                if indegree[t] == 0 {
                    ready.push(Reverse(t));
                }
            }
        }
        if sequence.len() == decl.len() {
            break;
        }

        let Some(cycle) = first_cycle(&graph, &done) else {
            // unreachable with a consistent indegree count
            break;
        };
        let Some(edge) = graph
            .edge_indices()
            .filter(|e| {
                graph
                    .edge_endpoints(*e)
                    .is_some_and(|(a, b)| cycle.contains(&graph[a]) && cycle.contains(&graph[b]))
            })
            .min_by_key(|e| graph[*e])
        else {
            break;
        };
        let Some((from, to)) = graph.edge_endpoints(edge) else {
            break;
        };
        let (from, to) = (graph[from], graph[to]);

        let names: Vec<String> = cycle
            .iter()
            .map(|&i| format!("'{}'", decl[i].1.name()))
            .collect();
        let (project, target) = decl[to];
        diagnostics.push(
            Diagnostic::error(format!(
                "Cycle in dependencies between targets {}",
                join_names(&names)
            ))
            .in_target(target.name(), &project.name)
            .with_context(format!(
                "ignoring the dependency of '{}' on '{}'",
                target.name(),
                decl[from].1.name()
            )),
        );
        tracing::warn!("breaking target cycle at {} -> {}", decl[from].1.name(), target.name());

        graph.remove_edge(edge);
        indegree[to] -= 1;
        if indegree[to] == 0 {
            ready.push(Reverse(to));
        }
    }

    let position: HashMap<usize, usize> = sequence
        .iter()
        .enumerate()
        .map(|(pos, &i)| (i, pos))
        .collect();
    let targets = sequence
        .iter()
        .enumerate()
        .map(|(ordinal, &i)| {
            let mut deps: Vec<(usize, usize)> = graph
                .edges_directed(nodes[i], Direction::Incoming)
                .map(|e| (*e.weight(), graph[e.source()]))
                .collect();
            deps.sort();
            OrderedTarget {
                ordinal,
                project: decl[i].0,
                target: decl[i].1,
                dependencies: deps.into_iter().filter_map(|(_, d)| position.get(&d).copied()).collect(),
            }
        })
        .collect::<Vec<_>>();

    tracing::info!(
        "target order: {}",
        targets.iter().map(|t| t.target.name()).collect::<Vec<_>>().join(", ")
    );
    TargetOrder {
        targets,
        diagnostics,
    }
}

/// References from Frameworks and Copy Files phases that may name products.
fn implicit_refs(target: &Target) -> Vec<&BuildableRef> {
    let mut refs: Vec<&BuildableRef> = Vec::new();
    for phase in target.build_phases() {
        if matches!(phase, BuildPhase::Frameworks { .. } | BuildPhase::CopyFiles { .. }) {
            refs.extend(phase.files().iter().map(|f| &f.item));
        }
    }
    if let Target::PackageProduct(p) = target {
        refs.extend(p.frameworks.iter().map(|f| &f.item));
    }
    refs
}

/// Members (declaration indices, sorted) of the earliest-declared cycle
/// among targets not yet ordered.
fn first_cycle(graph: &TargetGraph, done: &[bool]) -> Option<Vec<usize>> {
    tarjan_scc(graph)
        .into_iter()
        .map(|scc| {
            let mut members: Vec<usize> = scc.into_iter().map(|n| graph[n]).collect();
            members.sort_unstable();
            members
        })
        .filter(|m| m.len() > 1 && m.iter().all(|&i| !done[i]))
        .min_by_key(|m| m[0])
}

fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::{ToolInfoCache, Toolchain};
    use crate::core::platform::{PlatformFilter, PlatformRegistry};
    use crate::core::target::ProductType;
    use crate::core::workspace::Workspace;
    use crate::settings::SettingsTable;
    use crate::test_support::{ProjectBuilder, TargetBuilder};

    fn with_order(ws: &Workspace, platform: &str, check: impl FnOnce(&TargetOrder<'_>)) {
        let platforms = PlatformRegistry::builtin();
        let toolchain = Toolchain::new("default", "/tc/usr/bin");
        let info = ToolInfoCache::default();
        let ctx = BuildContext::new(
            ws,
            &platforms,
            platform,
            &toolchain,
            &info,
            "Debug",
            SettingsTable::new(),
        )
        .unwrap();
        check(&order(&ctx));
    }

    #[test]
    fn test_declaration_order_tie_break() {
        let ws = ProjectBuilder::new("P")
            .target(TargetBuilder::standard("App", ProductType::Application).depends_on("B").depends_on("A"))
            .target(TargetBuilder::standard("B", ProductType::StaticLibrary))
            .target(TargetBuilder::standard("A", ProductType::StaticLibrary))
            .into_workspace();
        with_order(&ws, "macosx", |order| {
            assert_eq!(order.names(), vec!["B", "A", "App"]);
            assert_eq!(order.targets[2].dependencies, vec![0, 1]);
            assert!(order.diagnostics.is_empty());
        });
    }

    #[test]
    fn test_implicit_dependency_from_frameworks_phase() {
        let ws = ProjectBuilder::new("P")
            .target(
                TargetBuilder::standard("App", ProductType::Tool)
                    .frameworks(&["libCore.a"])
                    .link_target("Kit"),
            )
            .target(TargetBuilder::standard("Kit", ProductType::Framework))
            .target(TargetBuilder::standard("Core", ProductType::StaticLibrary))
            .into_workspace();
        with_order(&ws, "macosx", |order| {
            assert_eq!(order.names(), vec!["Kit", "Core", "App"]);
        });
    }

    #[test]
    fn test_cycle_reported_and_broken() {
        let ws = ProjectBuilder::new("P")
            .target(TargetBuilder::standard("A", ProductType::StaticLibrary).depends_on("B"))
            .target(TargetBuilder::standard("B", ProductType::StaticLibrary).depends_on("A"))
            .target(TargetBuilder::standard("C", ProductType::Tool).depends_on("A"))
            .into_workspace();
        with_order(&ws, "macosx", |order| {
            // "A depends on B" is declared first, so that edge is dropped
            assert_eq!(order.names(), vec!["A", "B", "C"]);
            assert_eq!(order.targets[1].dependencies, vec![0]);
            assert_eq!(order.diagnostics.len(), 1);
            let diag = &order.diagnostics[0];
            assert!(diag.is_error());
            assert_eq!(diag.message, "Cycle in dependencies between targets 'A' and 'B'");
            assert_eq!(diag.target.as_deref(), Some("A"));
            assert_eq!(diag.context, vec!["ignoring the dependency of 'A' on 'B'".to_string()]);
        });
    }

    #[test]
    fn test_filtered_and_unknown_dependencies() {
        let mut app = TargetBuilder::standard("App", ProductType::Application)
            .depends_on("Missing")
            .depends_on_filtered("IOSOnly", [PlatformFilter::new("ios")]);
        app = app.depends_on("Lib");
        let ws = ProjectBuilder::new("P")
            .target(app)
            .target(TargetBuilder::standard("IOSOnly", ProductType::StaticLibrary))
            .target(TargetBuilder::standard("Lib", ProductType::StaticLibrary))
            .into_workspace();
        with_order(&ws, "macosx", |order| {
            assert_eq!(order.names(), vec!["IOSOnly", "Lib", "App"]);
            assert_eq!(order.targets[2].dependencies, vec![1]);
            assert_eq!(order.diagnostics.len(), 1);
            assert!(order.diagnostics[0].message.contains("'Missing'"));
        });
    }

    #[test]
    fn test_join_names() {
        let names = vec!["'A'".to_string(), "'B'".to_string(), "'C'".to_string()];
        assert_eq!(join_names(&names), "'A', 'B' and 'C'");
    }
}
