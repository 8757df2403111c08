use super::{display_path, json_pretty, load_artifacts, make_engine, EXIT_SUCCESS};
use serde::Serialize;
use std::path::{Path, PathBuf};
use stowage_schema::ResolvedDependencySet;

#[derive(Serialize)]
struct ResolvedArtifact {
    output_path: PathBuf,
    dependencies: ResolvedDependencySet,
}

pub fn run(
    project_dir: &Path,
    config: Option<&Path>,
    artifacts: &Path,
    json: bool,
) -> Result<u8, String> {
    let engine = make_engine(project_dir, config)?;
    let artifacts = load_artifacts(project_dir, artifacts)?;
    let resolved = engine.resolve(&artifacts).map_err(|e| e.to_string())?;

    if json {
        let payload: Vec<ResolvedArtifact> = resolved
            .into_iter()
            .map(|(output_path, dependencies)| ResolvedArtifact {
                output_path,
                dependencies,
            })
            .collect();
        println!("{}", json_pretty(&payload)?);
    } else {
        for (output_path, dependencies) in &resolved {
            println!("{}", display_path(output_path, project_dir).display());
            if dependencies.is_empty() {
                println!("  (no external modules)");
            }
            for (name, spec) in dependencies.iter() {
                if spec.is_empty() {
                    println!("  {name}");
                } else {
                    println!("  {name} {spec}");
                }
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
