use super::{
    colorize_state, display_path, json_pretty, load_artifacts, make_engine, spin_fail, spin_ok,
    spinner, EXIT_RUN_FAILED, EXIT_SUCCESS,
};
use std::path::Path;

pub fn run(
    project_dir: &Path,
    config: Option<&Path>,
    artifacts: &Path,
    skip_compile: bool,
    json: bool,
) -> Result<u8, String> {
    let engine = make_engine(project_dir, config)?;
    let artifacts = load_artifacts(project_dir, artifacts)?;

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("packaging {} artifacts...", artifacts.len())))
    };

    let report = match engine.package_report(&artifacts, skip_compile) {
        Ok(report) => report,
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "packaging failed");
            }
            return Err(e.to_string());
        }
    };
    let success = report.is_success();
    if let Some(ref pb) = pb {
        if success {
            spin_ok(pb, "external modules packaged");
        } else {
            spin_fail(pb, "packaging failed");
        }
    }

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        for artifact in &report.artifacts {
            println!(
                "{:<16} {} ({} modules)",
                colorize_state(artifact.state),
                display_path(&artifact.output_path, project_dir).display(),
                artifact.dependencies.len()
            );
            if let Some(error) = &artifact.error {
                println!("  {error}");
            }
        }
    }

    if success {
        return Ok(EXIT_SUCCESS);
    }
    if let Err(e) = report.into_result() {
        eprintln!("error: {e}");
    }
    Ok(EXIT_RUN_FAILED)
}
