use super::{load_config, CONFIG_FILE, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_SUCCESS};
use std::path::Path;
use stowage_packager::{known_packagers, select_packager, PackagerBackend};
use stowage_schema::parse_manifest_file;

pub fn run(project_dir: &Path, config: Option<&Path>, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    let config = match load_config(project_dir, config) {
        Ok(config) => {
            checks.push(Check::pass("config", "Configuration is valid"));
            config
        }
        Err(e) => {
            checks.push(Check::fail("config", &e));
            print_results(&checks, false, json_output)?;
            return Ok(EXIT_CONFIG_ERROR);
        }
    };
    if !project_dir.join(CONFIG_FILE).is_file() {
        checks.push(Check::info(
            "config_file",
            &format!("No {CONFIG_FILE} in project, using defaults"),
        ));
    }
    if !config.include_modules.is_enabled() {
        checks.push(Check::info(
            "include_modules",
            "include_modules is disabled, packaging is a no-op",
        ));
    }

    check_manifest(project_dir, &config.include_modules.settings().package_path, &mut checks, &mut all_pass);

    match select_packager(&config.packager) {
        Ok(backend) => check_packager(backend.as_ref(), &mut checks, &mut all_pass),
        Err(e) => {
            all_pass = false;
            checks.push(Check::fail(
                "packager",
                &format!("{e}; known packagers: {}", known_packagers().join(", ")),
            ));
        }
    }

    print_results(&checks, all_pass, json_output)
}

fn check_manifest(project_dir: &Path, package_path: &str, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let path = project_dir.join(package_path);
    match parse_manifest_file(&path) {
        Ok(manifest) => checks.push(Check::pass(
            "project_manifest",
            &format!(
                "{} readable ({} dependencies, {} devDependencies)",
                path.display(),
                manifest.dependencies.len(),
                manifest.dev_dependencies.len()
            ),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("project_manifest", &format!("{}: {e}", path.display())));
        }
    }
}

fn check_packager(backend: &dyn PackagerBackend, checks: &mut Vec<Check>, all_pass: &mut bool) {
    if !backend.available() {
        *all_pass = false;
        checks.push(Check::fail(
            "packager",
            &format!("{} executable not found in PATH", backend.name()),
        ));
        return;
    }
    match backend.version() {
        Ok(version) => checks.push(Check::pass(
            "packager",
            &format!("{} {version} available", backend.name()),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "packager",
                &format!("{} --version failed: {e}", backend.name()),
            ));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Stowage Doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn pass(name: &'static str, message: &str) -> Self {
        Self {
            name,
            status: "pass",
            message: message.to_owned(),
        }
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self {
            name,
            status: "fail",
            message: message.to_owned(),
        }
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self {
            name,
            status: "info",
            message: message.to_owned(),
        }
    }
}
