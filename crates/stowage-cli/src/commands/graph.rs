use super::{json_pretty, make_engine, EXIT_SUCCESS};
use std::path::Path;

pub fn run(project_dir: &Path, config: Option<&Path>, depth: Option<usize>) -> Result<u8, String> {
    let engine = make_engine(project_dir, config)?;
    let depth = depth.unwrap_or_else(|| engine.context().settings().dependency_depth);
    if depth == 0 {
        return Err("config error: --depth must be at least 1".to_owned());
    }
    let graph = engine
        .dependency_graph_at(depth)
        .map_err(|e| e.to_string())?;
    println!("{}", json_pretty(&graph.to_tree())?);
    Ok(EXIT_SUCCESS)
}
