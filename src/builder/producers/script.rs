//! Run Script phases.
//!
//! The script body is written to an auxiliary file and run by the phase's
//! shell. Consecutive script phases of a target are chained through
//! virtual nodes so they keep their declared order.

use super::TargetProducer;
use crate::builder::task::{virtual_node, write_aux_file, PlannedTask, Stage};
use crate::core::phase::ShellScriptPhase;
use crate::util::diagnostic::{suggestions, Diagnostic};

pub(super) fn produce(p: &mut TargetProducer<'_, '_>, index: usize, phase: &ShellScriptPhase) {
    let target = p.target;
    let base = p.base();
    if phase.run_only_when_installing && base.get("ACTION") != "install" {
        tracing::debug!("`{}`: skipping install-only script '{}'", target.name(), phase.name);
        return;
    }

    let guid = target.target.guid().as_str();
    let script_path = base.evaluate(&format!("$(SCRIPTS_DIR)/Script-{}-{}.sh", guid, index));
    p.emit(write_aux_file(
        &script_path,
        format!("#!{}\n{}\n", phase.shell, phase.script),
    ));

    let inputs: Vec<String> = phase.input_paths.iter().map(|i| base.evaluate(i)).collect();
    let outputs: Vec<String> = phase.output_paths.iter().map(|o| base.evaluate(o)).collect();
    let input_lists: Vec<String> = phase
        .input_file_list_paths
        .iter()
        .map(|i| base.evaluate(i))
        .collect();
    let output_lists: Vec<String> = phase
        .output_file_list_paths
        .iter()
        .map(|o| base.evaluate(o))
        .collect();

    if phase.has_no_outputs() && !phase.always_out_of_date {
        p.diagnostics.push(
            Diagnostic::warning(format!(
                "Run script build phase '{}' will be run during every build because it does not specify any outputs. To address this issue, either add output dependencies to the script phase, or mark it as always out of date.",
                phase.name
            ))
            .with_suggestion(suggestions::SCRIPT_OUTPUTS),
        );
    }

    let mut task = PlannedTask::new(
        ["PhaseScriptExecution", phase.name.as_str(), script_path.as_str()],
        Stage::Compile,
    )
    .args([phase.shell.as_str(), "-c", script_path.as_str()]);
    if phase.export_build_settings {
        task = task.envs(base.environment());
    }
    task = task
        .envs(numbered("SCRIPT_INPUT_FILE", &inputs))
        .envs(numbered("SCRIPT_OUTPUT_FILE", &outputs))
        .envs(numbered("SCRIPT_INPUT_FILE_LIST", &input_lists))
        .envs(numbered("SCRIPT_OUTPUT_FILE_LIST", &output_lists));

    let chain = virtual_node(format!("script-{}-{}", target.name(), index));
    task = task
        .input(script_path.as_str())
        .inputs(inputs)
        .inputs(input_lists)
        .inputs(p.last_script.take())
        .outputs(outputs)
        .outputs(output_lists)
        .output(chain.as_str())
        .always_out_of_date(phase.always_out_of_date || phase.has_no_outputs())
        .describe(format!("Run script '{}'", phase.name));
    p.emit(task);
    p.last_script = Some(chain);
}

/// `<PREFIX>_COUNT` plus `<PREFIX>_<n>` bindings.
fn numbered(prefix: &str, values: &[String]) -> Vec<(String, String)> {
    let mut vars = vec![(format!("{}_COUNT", prefix), values.len().to_string())];
    vars.extend(
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("{}_{}", prefix, i), v.clone())),
    );
    vars
}
