use crate::assembler::ManifestAssembler;
use crate::concurrency::CancelToken;
use crate::copy::move_modules;
use crate::lifecycle::{validate_transition, ArtifactState};
use crate::lookup::{ManifestLookup, NodeModulesLookup};
use crate::resolver::Resolver;
use crate::validator::Validator;
use crate::CoreError;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use stowage_packager::PackagerBackend;
use stowage_schema::{
    parse_manifest_file, ArtifactInput, DependencyGraph, IncludeModulesTable, ProjectManifest,
    ResolvedDependencySet, StowageConfig,
};
use tracing::{debug, error, info, warn};

/// Install directory used below an artifact when the backend needs modules
/// copied into place afterwards.
pub const STAGING_DIR: &str = ".stowage";

/// Project-level inputs shared by every artifact of a run.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// Directory containing the project `package.json`.
    pub package_root: PathBuf,
    pub manifest: ProjectManifest,
    pub config: StowageConfig,
    pub service: String,
}

impl ProjectContext {
    /// Load the project manifest named by `include_modules.package_path`.
    /// A missing manifest is only an error when packaging is enabled.
    pub fn load(project_dir: &Path, config: StowageConfig) -> Result<Self, CoreError> {
        let settings = config.include_modules.settings();
        let relative: PathBuf = Path::new(&settings.package_path)
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        let manifest_path = project_dir.join(relative);
        let package_root = manifest_path
            .parent()
            .map_or_else(|| project_dir.to_path_buf(), Path::to_path_buf);

        let manifest = match parse_manifest_file(&manifest_path) {
            Ok(manifest) => manifest,
            Err(e) if !config.include_modules.is_enabled() => {
                debug!("packaging disabled, ignoring {}: {e}", manifest_path.display());
                ProjectManifest::default()
            }
            Err(e) => return Err(e.into()),
        };

        let service = config
            .service
            .clone()
            .or_else(|| manifest.name.clone())
            .or_else(|| {
                project_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "service".to_owned());

        Ok(Self {
            package_root,
            manifest,
            config,
            service,
        })
    }

    pub fn settings(&self) -> IncludeModulesTable {
        self.config.include_modules.settings()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactReport {
    pub output_path: PathBuf,
    pub state: ArtifactState,
    pub dependencies: ResolvedDependencySet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub artifacts: Vec<ArtifactReport>,
    /// Non-fatal problems reported while listing dependencies.
    pub problems: Vec<String>,
}

impl RunReport {
    pub fn failed(&self) -> impl Iterator<Item = &ArtifactReport> {
        self.artifacts
            .iter()
            .filter(|a| a.state == ArtifactState::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.artifacts
            .iter()
            .all(|a| a.state == ArtifactState::Done)
    }

    /// `Err(RunFailed)` naming the first failed artifact when any failed,
    /// `Err(RunCancelled)` when the run stopped before every artifact was done.
    pub fn into_result(self) -> Result<Self, CoreError> {
        let failed: Vec<&ArtifactReport> = self.failed().collect();
        let Some(first) = failed.first() else {
            if self.is_success() {
                return Ok(self);
            }
            return Err(CoreError::RunCancelled {
                cancelled: self
                    .artifacts
                    .iter()
                    .filter(|a| a.state != ArtifactState::Done)
                    .count(),
                total: self.artifacts.len(),
            });
        };
        Err(CoreError::RunFailed {
            failed: failed.len(),
            total: self.artifacts.len(),
            first: format!(
                "{}: {}",
                first.output_path.display(),
                first.error.as_deref().unwrap_or("unknown error")
            ),
        })
    }
}

/// State tracker for one artifact.
struct Pipeline {
    output_path: PathBuf,
    state: ArtifactState,
    dependencies: ResolvedDependencySet,
    digest: Option<String>,
}

impl Pipeline {
    fn new(output_path: &Path) -> Self {
        Self {
            output_path: output_path.to_path_buf(),
            state: ArtifactState::Idle,
            dependencies: ResolvedDependencySet::default(),
            digest: None,
        }
    }

    fn advance(&mut self, to: ArtifactState) -> Result<(), CoreError> {
        validate_transition(self.state, to)?;
        debug!("{}: {} -> {to}", self.output_path.display(), self.state);
        self.state = to;
        Ok(())
    }

    fn into_report(self, error: Option<String>) -> ArtifactReport {
        ArtifactReport {
            output_path: self.output_path,
            state: self.state,
            dependencies: self.dependencies,
            manifest_digest: self.digest,
            error,
        }
    }
}

/// Central orchestration engine for packaging a project's artifacts.
///
/// Holds the project context and one package-manager backend for the whole
/// run; the dependency graph is fetched once and shared by all artifacts.
pub struct Engine {
    context: ProjectContext,
    backend: Arc<dyn PackagerBackend>,
    lookup: Arc<dyn ManifestLookup>,
    cancel: CancelToken,
}

impl Engine {
    pub fn new(context: ProjectContext, backend: Arc<dyn PackagerBackend>) -> Self {
        let settings = context.settings();
        let lookup = NodeModulesLookup::for_project(
            &context.package_root,
            settings.node_modules_relative_dir.as_deref(),
        );
        Self {
            context,
            backend,
            lookup: Arc::new(lookup),
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_lookup(mut self, lookup: Arc<dyn ManifestLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    pub fn backend(&self) -> &dyn PackagerBackend {
        self.backend.as_ref()
    }

    /// Token observed by every pipeline of this engine.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Production dependency graph of the project, listing problems logged.
    pub fn dependency_graph(&self) -> Result<DependencyGraph, CoreError> {
        self.dependency_graph_at(self.context.settings().dependency_depth)
    }

    pub fn dependency_graph_at(&self, depth: usize) -> Result<DependencyGraph, CoreError> {
        info!(
            "fetching production dependencies with {} (depth {depth})",
            self.backend.name()
        );
        let started = Instant::now();
        let graph = self.backend.prod_dependencies(
            &self.context.package_root,
            depth,
            &self.context.config.packager_options,
        )?;
        for problem in &graph.problems {
            warn!("{}: {problem}", self.backend.name());
        }
        if !graph.problems.is_empty() {
            info!("ignored {} packager problems", graph.problems.len());
        }
        debug!(
            "dependency graph has {} packages ({}ms)",
            graph.len(),
            started.elapsed().as_millis()
        );
        Ok(graph)
    }

    /// Resolve and validate each artifact without writing anything.
    pub fn resolve(
        &self,
        artifacts: &[ArtifactInput],
    ) -> Result<Vec<(PathBuf, ResolvedDependencySet)>, CoreError> {
        let graph = self.dependency_graph()?;
        artifacts
            .iter()
            .map(|artifact| {
                self.resolve_one(artifact, &graph)
                    .map(|set| (artifact.output_path.clone(), set))
                    .map_err(|e| e.for_artifact(&artifact.output_path))
            })
            .collect()
    }

    fn resolve_one(
        &self,
        artifact: &ArtifactInput,
        graph: &DependencyGraph,
    ) -> Result<ResolvedDependencySet, CoreError> {
        let settings = self.context.settings();
        let resolution = Resolver::new(&self.context.manifest, graph, &settings, self.lookup.as_ref())
            .resolve(&artifact.external_modules);
        Validator::new(&self.context.manifest, &settings.force_exclude).validate(resolution)
    }

    /// Package every artifact and fail when any of them failed.
    pub fn package(
        &self,
        artifacts: &[ArtifactInput],
        skip_compile: bool,
    ) -> Result<RunReport, CoreError> {
        self.package_report(artifacts, skip_compile)?.into_result()
    }

    /// Package every artifact on a bounded pool and report per-artifact
    /// outcomes. Errors only for failures before any artifact started.
    pub fn package_report(
        &self,
        artifacts: &[ArtifactInput],
        skip_compile: bool,
    ) -> Result<RunReport, CoreError> {
        if !self.context.config.include_modules.is_enabled() || skip_compile {
            info!("external module packaging disabled, nothing to do");
            let artifacts = artifacts
                .iter()
                .map(|artifact| {
                    let mut pipeline = Pipeline::new(&artifact.output_path);
                    let error = pipeline.advance(ArtifactState::Done).err();
                    pipeline.into_report(error.map(|e| e.to_string()))
                })
                .collect();
            return Ok(RunReport {
                artifacts,
                problems: Vec::new(),
            });
        }

        let graph = self.dependency_graph()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.context.config.concurrency.max(1))
            .build()
            .map_err(std::io::Error::other)?;
        info!(
            "packaging {} artifacts with {} workers",
            artifacts.len(),
            pool.current_num_threads()
        );

        let reports: Vec<ArtifactReport> = pool.install(|| {
            artifacts
                .par_iter()
                .map(|artifact| self.run_artifact(artifact, &graph))
                .collect()
        });

        Ok(RunReport {
            artifacts: reports,
            problems: graph.problems,
        })
    }

    fn run_artifact(&self, artifact: &ArtifactInput, graph: &DependencyGraph) -> ArtifactReport {
        let mut pipeline = Pipeline::new(&artifact.output_path);
        if self.cancel.is_cancelled() {
            let _ = pipeline.advance(ArtifactState::Cancelled);
            return pipeline.into_report(None);
        }

        match self.drive(&mut pipeline, artifact, graph) {
            Ok(()) => pipeline.into_report(None),
            Err(CoreError::Cancelled) => {
                info!("{}: cancelled", artifact.output_path.display());
                discard_staging(&artifact.output_path);
                let _ = pipeline.advance(ArtifactState::Cancelled);
                pipeline.into_report(None)
            }
            Err(e) => {
                self.cancel.cancel();
                error!("{}: {e}", artifact.output_path.display());
                discard_staging(&artifact.output_path);
                let _ = pipeline.advance(ArtifactState::Failed);
                pipeline.into_report(Some(e.to_string()))
            }
        }
    }

    fn checkpoint(&self) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn drive(
        &self,
        pipeline: &mut Pipeline,
        artifact: &ArtifactInput,
        graph: &DependencyGraph,
    ) -> Result<(), CoreError> {
        let output = artifact.output_path.as_path();
        let settings = self.context.settings();
        let options = &self.context.config.packager_options;

        pipeline.advance(ArtifactState::Resolving)?;
        let resolution = Resolver::new(&self.context.manifest, graph, &settings, self.lookup.as_ref())
            .resolve(&artifact.external_modules);

        pipeline.advance(ArtifactState::Validating)?;
        let dependencies =
            Validator::new(&self.context.manifest, &settings.force_exclude).validate(resolution)?;
        if dependencies.is_empty() {
            info!("{}: no external modules needed", output.display());
            return pipeline.advance(ArtifactState::Done);
        }

        let assembler = ManifestAssembler::new(
            &self.context.package_root,
            &self.context.manifest,
            &self.context.service,
            &options.scripts,
            self.backend.as_ref(),
        );
        let written = assembler.write(&dependencies, output)?;
        pipeline.digest = Some(written.digest);
        pipeline.dependencies = dependencies;

        let capabilities = self.backend.capabilities();
        let install_dir = if capabilities.must_copy_modules {
            let staging = output.join(STAGING_DIR);
            assembler.write(&pipeline.dependencies, &staging)?;
            staging
        } else {
            output.to_path_buf()
        };
        pipeline.advance(ArtifactState::ManifestWritten)?;

        self.checkpoint()?;
        pipeline.advance(ArtifactState::Installing)?;
        timed(output, "install", || self.backend.install(&install_dir, options))?;

        self.checkpoint()?;
        pipeline.advance(ArtifactState::Pruning)?;
        timed(output, "prune", || self.backend.prune(&install_dir, options))?;

        if !options.scripts.is_empty() {
            self.checkpoint()?;
            pipeline.advance(ArtifactState::RunningScripts)?;
            let names = assembler.script_names();
            timed(output, "scripts", || self.backend.run_scripts(&install_dir, &names))?;
        }

        if capabilities.must_copy_modules {
            if self.context.config.out_of_band_dependencies {
                debug!("{}: dependencies installed out of band, not copying", output.display());
            } else {
                pipeline.advance(ArtifactState::Copying)?;
                let copied = timed(output, "copy", || {
                    move_modules(&install_dir.join("node_modules"), &output.join("node_modules"))
                })?;
                debug!("{}: copied {copied} files", output.display());
            }
            fs::remove_dir_all(&install_dir)?;
        }

        pipeline.advance(ArtifactState::Done)
    }
}

/// Remove a partially populated staging directory left by an unfinished install.
fn discard_staging(output: &Path) {
    let staging = output.join(STAGING_DIR);
    if !staging.exists() {
        return;
    }
    if let Err(e) = fs::remove_dir_all(&staging) {
        warn!("failed to remove {}: {e}", staging.display());
    }
}

fn timed<T, E>(output: &Path, step: &str, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
    let started = Instant::now();
    let result = f();
    debug!(
        "{}: {step} took {}ms",
        output.display(),
        started.elapsed().as_millis()
    );
    result
}
