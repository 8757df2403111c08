use crate::resolver::Resolution;
use crate::CoreError;
use stowage_schema::{ProjectManifest, ResolvedDependencySet};
use tracing::{info, warn};

/// Packages the deployment runtime provides on its own.
const RUNTIME_PROVIDED: &[&str] = &["aws-sdk"];
const RUNTIME_PROVIDED_SCOPES: &[&str] = &["@aws-sdk/"];

pub fn is_runtime_provided(name: &str) -> bool {
    RUNTIME_PROVIDED.contains(&name)
        || RUNTIME_PROVIDED_SCOPES
            .iter()
            .any(|scope| name.starts_with(scope))
}

/// What to do with an external module that has no production version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Declared for development, but the runtime ships it anyway.
    RuntimeProvided,
    /// Declared for development and explicitly excluded.
    Excluded,
    /// Declared for development only and needed at runtime.
    DevDependencyAtRuntime,
    /// Declared nowhere; left for the installer to resolve.
    Unknown,
}

pub struct Validator<'a> {
    manifest: &'a ProjectManifest,
    force_exclude: &'a [String],
}

impl<'a> Validator<'a> {
    pub fn new(manifest: &'a ProjectManifest, force_exclude: &'a [String]) -> Self {
        Self {
            manifest,
            force_exclude,
        }
    }

    pub fn verdict(&self, name: &str) -> Verdict {
        if !self.manifest.is_dev_dependency(name) {
            return Verdict::Unknown;
        }
        if self.force_exclude.iter().any(|n| n == name) {
            Verdict::Excluded
        } else if is_runtime_provided(name) {
            Verdict::RuntimeProvided
        } else {
            Verdict::DevDependencyAtRuntime
        }
    }

    /// Turn a resolution into the final dependency set, failing on the first
    /// (alphabetically) development dependency needed at runtime.
    pub fn validate(&self, resolution: Resolution) -> Result<ResolvedDependencySet, CoreError> {
        let mut dependencies = resolution.resolved;
        for module in &resolution.unresolved {
            match self.verdict(&module.name) {
                Verdict::RuntimeProvided => {
                    info!(
                        "skipping '{}': declared in devDependencies and provided by the runtime",
                        module.name
                    );
                }
                Verdict::Excluded => {}
                Verdict::DevDependencyAtRuntime => {
                    return Err(CoreError::DevDependencyAtRuntime {
                        package: module.name.clone(),
                    });
                }
                Verdict::Unknown => {
                    if self.force_exclude.iter().any(|n| n == &module.name) {
                        continue;
                    }
                    match &module.origin {
                        Some(origin) => warn!(
                            "could not determine version of '{}' (required by {origin})",
                            module.name
                        ),
                        None => warn!("could not determine version of '{}'", module.name),
                    }
                    dependencies.insert(module.name.clone(), String::new());
                }
            }
        }
        Ok(dependencies.into())
    }
}
