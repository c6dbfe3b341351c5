//! Planned tasks.
//!
//! A [`PlannedTask`] is the unit handed to the execution engine: a rule-info
//! tuple identifying it, a command line, a working directory, environment
//! bindings and declared input/output nodes. Nodes are file paths, or
//! virtual nodes written `<name>` that only express ordering.

use std::collections::BTreeMap;

use serde::Serialize;

/// Where in the per-target gate sequence a task sits.
///
/// Each stage names the gate a task waits for and the gate that waits for
/// the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Auxiliary files and other setup work.
    Prepare,
    /// Module interfaces and generated headers.
    Interface,
    /// Header copies into the product.
    Headers,
    /// Compilation of C-family sources (waits for headers).
    CompileC,
    /// All other compilation and script work.
    Compile,
    /// Linking and product assembly.
    Link,
    /// Copies into the product and other bundles.
    Copy,
    /// Code signing.
    Sign,
    /// Product validation.
    Validate,
}

impl Stage {
    /// The (start, end) gates of this stage.
    pub fn gates(&self) -> (Gate, Gate) {
        match self {
            Stage::Prepare => (Gate::Entry, Gate::BeginCompiling),
            Stage::Interface => (Gate::Compiling, Gate::GeneratedHeadersReady),
            Stage::Headers => (Gate::GeneratedHeadersReady, Gate::CopyHeadersCompletion),
            Stage::CompileC => (Gate::CopyHeadersCompletion, Gate::WillSign),
            Stage::Compile | Stage::Link | Stage::Copy => (Gate::Compiling, Gate::WillSign),
            Stage::Sign => (Gate::WillSign, Gate::Signing),
            Stage::Validate => (Gate::Signing, Gate::BarrierValidate),
        }
    }
}

/// Synthetic ordering points of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Gate {
    Entry,
    BeginCompiling,
    Compiling,
    GeneratedHeadersReady,
    CopyHeadersCompletion,
    WillSign,
    Signing,
    BarrierValidate,
    Exit,
}

impl Gate {
    /// Gates in sequence order.
    pub const SEQUENCE: [Gate; 9] = [
        Gate::Entry,
        Gate::BeginCompiling,
        Gate::Compiling,
        Gate::GeneratedHeadersReady,
        Gate::CopyHeadersCompletion,
        Gate::WillSign,
        Gate::Signing,
        Gate::BarrierValidate,
        Gate::Exit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Gate::Entry => "entry",
            Gate::BeginCompiling => "begin-compiling",
            Gate::Compiling => "compiling",
            Gate::GeneratedHeadersReady => "generated-headers-ready",
            Gate::CopyHeadersCompletion => "copy-headers-completion",
            Gate::WillSign => "will-sign",
            Gate::Signing => "signing",
            Gate::BarrierValidate => "barrier-validate",
            Gate::Exit => "exit",
        }
    }

    /// Position in [`Gate::SEQUENCE`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Virtual node name.
pub fn virtual_node(name: impl AsRef<str>) -> String {
    format!("<{}>", name.as_ref())
}

/// Whether a node is virtual.
pub fn is_virtual(node: &str) -> bool {
    node.starts_with('<') && node.ends_with('>')
}

/// Virtual node produced by a target's gate.
pub fn gate_node(target: &str, gate: Gate) -> String {
    virtual_node(format!("target-{}-{}", target, gate.name()))
}

/// A task produced by task construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTask {
    /// Identity: rule name followed by identifying tokens.
    pub rule_info: Vec<String>,
    /// Full command line; empty for gates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command_line: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub working_directory: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// In-process action that performs the task instead of a subprocess.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Contents written by auxiliary-file tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aux_contents: Option<String>,
    /// The task can never be considered up to date.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub always_out_of_date: bool,
    /// Human-readable description for logs.
    pub description: String,
    /// Owning target name.
    pub target: String,
    pub stage: Stage,
}

impl PlannedTask {
    /// Start a task from its rule-info tuple.
    pub fn new<I, S>(rule_info: I, stage: Stage) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rule_info: Vec<String> = rule_info.into_iter().map(Into::into).collect();
        let description = rule_info.join(" ");
        PlannedTask {
            rule_info,
            command_line: Vec::new(),
            working_directory: String::new(),
            environment: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            action: None,
            aux_contents: None,
            always_out_of_date: false,
            description,
            target: String::new(),
            stage,
        }
    }

    /// The gate task of `target` for `gate`, chained after the previous
    /// gate in [`Gate::SEQUENCE`].
    pub fn gate(target: &str, gate: Gate) -> Self {
        let mut task = PlannedTask::new(
            ["Gate".to_string(), format!("target-{}-{}", target, gate.name())],
            Stage::Prepare,
        )
        .output(gate_node(target, gate));
        if let Some(previous) = gate.index().checked_sub(1) {
            task.inputs.push(gate_node(target, Gate::SEQUENCE[previous]));
        }
        task.target = target.to_string();
        task
    }

    /// Rule name (first rule-info token).
    pub fn rule_name(&self) -> &str {
        self.rule_info.first().map(String::as_str).unwrap_or("")
    }

    pub fn is_gate(&self) -> bool {
        self.rule_name() == "Gate"
    }

    /// Add a command-line argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command_line.push(arg.into());
        self
    }

    /// Add multiple command-line arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command_line.extend(args.into_iter().map(|a| a.into()));
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Merge environment bindings.
    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.environment.extend(vars);
        self
    }

    pub fn cwd(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = dir.into();
        self
    }

    pub fn input(mut self, node: impl Into<String>) -> Self {
        self.inputs.push(node.into());
        self
    }

    pub fn inputs(mut self, nodes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs.extend(nodes.into_iter().map(|n| n.into()));
        self
    }

    pub fn output(mut self, node: impl Into<String>) -> Self {
        self.outputs.push(node.into());
        self
    }

    pub fn outputs(mut self, nodes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.outputs.extend(nodes.into_iter().map(|n| n.into()));
        self
    }

    /// Perform the task with an in-process action.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Make this an auxiliary file task writing `contents`.
    pub fn aux_contents(mut self, contents: impl Into<String>) -> Self {
        self.aux_contents = Some(contents.into());
        self
    }

    pub fn always_out_of_date(mut self, value: bool) -> Self {
        self.always_out_of_date = value;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// An auxiliary file task writing `contents` to `path`.
pub fn write_aux_file(path: &str, contents: String) -> PlannedTask {
    PlannedTask::new(["WriteAuxiliaryFile", path], Stage::Prepare)
        .output(path)
        .action("auxiliary-file")
        .aux_contents(contents)
        .describe(format!("Write {}", path))
}
