//! Generation pipeline invocation.

use std::path::Path;

use crate::dataset::TaskUnit;
use crate::runner::CommandSpec;

use super::config::PipelineConfig;

/// File inside a task's output directory that receives pipeline stdout.
pub const PIPELINE_LOG: &str = "pipeline.log";

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Builds the pipeline command for one task.
///
/// The pipeline writes its round directories under `output_dir`.
pub fn build_pipeline_command(
    config: &PipelineConfig,
    task: &TaskUnit,
    output_dir: &Path,
) -> CommandSpec {
    let mut spec = CommandSpec::new(&config.python)
        .arg(path_arg(&config.pipeline_entry))
        .flag("--mode", &config.mode)
        .flag("--vision-model", &config.vision_model);

    if let Some(ref key) = config.api_key {
        spec = spec.secret_flag("--api-key", key);
    }

    spec.flag("--max-rounds", config.max_rounds.to_string())
        .flag("--task-name", task.category.dir_name())
        .flag("--init-code-path", path_arg(&task.init_code_path))
        .flag("--init-image-path", path_arg(&task.init_image_path))
        .flag("--target-description", path_arg(&task.target_description_path))
        .flag("--generator-script", path_arg(&config.generator_script))
        .flag("--verifier-script", path_arg(&config.verifier_script))
        .flag("--slides-server-path", path_arg(&config.slides_server_path))
        .flag("--output-dir", path_arg(output_dir))
        .flag("--image-server-path", path_arg(&config.image_server_path))
        .with_log_path(output_dir.join(PIPELINE_LOG))
}
