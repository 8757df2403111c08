use crate::CoreError;
use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};
use stowage_packager::{LockfileContents, PackagerBackend};
use stowage_schema::{
    rebase_dependency_spec, write_atomic, CompositeManifest, ProjectManifest,
    ResolvedDependencySet,
};
use tracing::{debug, warn};

/// Files written into one directory by [`ManifestAssembler::write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenManifest {
    pub manifest_path: PathBuf,
    pub lockfile_path: Option<PathBuf>,
    pub digest: String,
}

/// Builds the composite manifest and rebased lockfile for an output directory.
pub struct ManifestAssembler<'a> {
    project_dir: &'a Path,
    manifest: &'a ProjectManifest,
    service: &'a str,
    scripts: &'a [String],
    backend: &'a dyn PackagerBackend,
}

impl<'a> ManifestAssembler<'a> {
    pub fn new(
        project_dir: &'a Path,
        manifest: &'a ProjectManifest,
        service: &'a str,
        scripts: &'a [String],
        backend: &'a dyn PackagerBackend,
    ) -> Self {
        Self {
            project_dir,
            manifest,
            service,
            scripts,
            backend,
        }
    }

    /// Script names exposed in the composite manifest, in execution order.
    pub fn script_names(&self) -> Vec<String> {
        (0..self.scripts.len()).map(|i| format!("script{i}")).collect()
    }

    pub fn composite(&self, dependencies: &ResolvedDependencySet, target_dir: &Path) -> CompositeManifest {
        let path_to_root = relative_path(target_dir, self.project_dir);
        let version = self.manifest.version.as_deref().unwrap_or("1.0.0");
        let mut composite = CompositeManifest::new(self.service, version);

        for (name, script) in self.script_names().into_iter().zip(self.scripts) {
            composite.scripts.insert(name, Value::from(script.as_str()));
        }
        for (name, spec) in dependencies.iter() {
            composite
                .dependencies
                .insert(name.to_owned(), rebase_dependency_spec(&path_to_root, spec));
        }
        for section in self.backend.capabilities().copy_package_sections {
            if let Some(value) = self.manifest.section(section) {
                composite.sections.insert((*section).to_owned(), value.clone());
            }
        }
        composite
    }

    /// The project lockfile rebased for `target_dir`, or `None` when there is
    /// no lockfile or it cannot be used.
    pub fn lockfile(&self, target_dir: &Path) -> Option<LockfileContents> {
        let capabilities = self.backend.capabilities();
        let source = self.project_dir.join(capabilities.lockfile_name);
        if !source.is_file() {
            return None;
        }
        let contents = match LockfileContents::read(&source, capabilities.lockfile_format) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("ignoring {}: {e}", source.display());
                return None;
            }
        };
        let path_to_root = relative_path(target_dir, self.project_dir);
        match self.backend.rebase_lockfile(&path_to_root, contents) {
            Ok(rebased) => Some(rebased),
            Err(e) => {
                warn!("could not rebase {}: {e}", source.display());
                None
            }
        }
    }

    /// Write `package.json` (and the lockfile, when usable) into `target_dir`.
    pub fn write(
        &self,
        dependencies: &ResolvedDependencySet,
        target_dir: &Path,
    ) -> Result<WrittenManifest, CoreError> {
        fs::create_dir_all(target_dir)?;
        let composite = self.composite(dependencies, target_dir);
        let manifest_path = target_dir.join("package.json");
        composite.write_to_file(&manifest_path)?;
        let digest = composite.digest()?;
        debug!("wrote {} ({digest})", manifest_path.display());

        let lockfile_path = match self.lockfile(target_dir) {
            Some(contents) => {
                let path = target_dir.join(self.backend.capabilities().lockfile_name);
                write_atomic(&path, contents.render()?.as_bytes())?;
                Some(path)
            }
            None => None,
        };

        Ok(WrittenManifest {
            manifest_path,
            lockfile_path,
            digest,
        })
    }
}

fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Relative path from directory `from` to directory `to`, `/`-separated.
/// Empty when both are the same directory.
pub fn relative_path(from: &Path, to: &Path) -> String {
    let from = normalize(from);
    let to = normalize(to);
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();
    let common = from
        .iter()
        .zip(&to)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = vec!["..".to_owned(); from.len() - common];
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use stowage_packager::{MockPackager, NpmPackager, YarnPackager};
    use stowage_schema::parse_manifest_str;

    fn deps(pairs: &[(&str, &str)]) -> ResolvedDependencySet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn relative_paths() {
        assert_eq!(relative_path(Path::new("/a/b/c"), Path::new("/a")), "../..");
        assert_eq!(relative_path(Path::new("/a"), Path::new("/a/b")), "b");
        assert_eq!(relative_path(Path::new("/a/x"), Path::new("/a/y/z")), "../y/z");
        assert_eq!(relative_path(Path::new("/a/b/./c/.."), Path::new("/a")), "..");
        assert_eq!(relative_path(Path::new("/a"), Path::new("/a")), "");
    }

    #[test]
    fn composite_has_expected_shape() {
        let project = tempfile::tempdir().unwrap();
        let manifest = parse_manifest_str(
            r#"{"name":"proj","version":"3.2.1","resolutions":{"ms":"2.1.3"},"dependencies":{"uuid":"^9"}}"#,
        )
        .unwrap();
        let scripts = vec!["echo one".to_owned(), "echo two".to_owned()];
        let yarn = YarnPackager::new();
        let assembler = ManifestAssembler::new(project.path(), &manifest, "orders", &scripts, &yarn);
        let composite = assembler.composite(&deps(&[("uuid", "^9")]), &project.path().join(".build/fn"));

        let value: Value = serde_json::from_str(&composite.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "orders",
                "version": "3.2.1",
                "description": "Packaged externals for orders",
                "private": true,
                "scripts": { "script0": "echo one", "script1": "echo two" },
                "dependencies": { "uuid": "^9" },
                "resolutions": { "ms": "2.1.3" }
            })
        );
        assert_eq!(assembler.script_names(), vec!["script0", "script1"]);
    }

    #[test]
    fn missing_project_version_defaults() {
        let project = tempfile::tempdir().unwrap();
        let manifest = ProjectManifest::default();
        let npm = NpmPackager::new();
        let assembler = ManifestAssembler::new(project.path(), &manifest, "svc", &[], &npm);
        let composite = assembler.composite(&deps(&[]), project.path());
        assert_eq!(composite.version, "1.0.0");
        assert!(composite.scripts.is_empty());
        assert!(composite.sections.is_empty());
    }

    #[test]
    fn local_specs_are_rebased_for_target_depth() {
        let project = tempfile::tempdir().unwrap();
        let manifest = ProjectManifest::default();
        let npm = NpmPackager::new();
        let assembler = ManifestAssembler::new(project.path(), &manifest, "svc", &[], &npm);
        let composite = assembler.composite(
            &deps(&[("lib", "file:../lib"), ("util", "./util"), ("uuid", "9.0.1")]),
            &project.path().join(".build/handler"),
        );
        let expected = BTreeMap::from([
            ("lib".to_owned(), "file:../../../lib".to_owned()),
            ("util".to_owned(), "../.././util".to_owned()),
            ("uuid".to_owned(), "9.0.1".to_owned()),
        ]);
        assert_eq!(composite.dependencies, expected);
    }

    #[test]
    fn write_is_idempotent() {
        let project = tempfile::tempdir().unwrap();
        let manifest = parse_manifest_str(r#"{"version":"1.2.3"}"#).unwrap();
        let mock = MockPackager::new();
        let assembler = ManifestAssembler::new(project.path(), &manifest, "svc", &[], &mock);
        let target = project.path().join("out");
        let set = deps(&[("uuid", "9.0.1")]);

        let first = assembler.write(&set, &target).unwrap();
        let bytes_first = fs::read(&first.manifest_path).unwrap();
        let second = assembler.write(&set, &target).unwrap();
        let bytes_second = fs::read(&second.manifest_path).unwrap();
        assert_eq!(bytes_first, bytes_second);
        assert_eq!(first.digest, second.digest);
        assert!(first.lockfile_path.is_none());
        assert!(!String::from_utf8(bytes_first).unwrap().ends_with('\n'));
    }

    #[test]
    fn lockfile_is_copied_and_rebased() {
        let project = tempfile::tempdir().unwrap();
        fs::write(
            project.path().join("package-lock.json"),
            r#"{"lockfileVersion":2,"dependencies":{"lib":{"version":"file:../lib"}}}"#,
        )
        .unwrap();
        let manifest = ProjectManifest::default();
        let npm = NpmPackager::new();
        let assembler = ManifestAssembler::new(project.path(), &manifest, "svc", &[], &npm);
        let target = project.path().join(".build/fn");
        let written = assembler.write(&deps(&[("lib", "file:../lib")]), &target).unwrap();

        let lockfile_path = written.lockfile_path.unwrap();
        let lockfile: Value = serde_json::from_str(&fs::read_to_string(lockfile_path).unwrap()).unwrap();
        assert_eq!(lockfile["dependencies"]["lib"]["version"], "file:../../../lib");
    }

    #[test]
    fn unreadable_lockfile_is_skipped() {
        let project = tempfile::tempdir().unwrap();
        fs::write(project.path().join("package-lock.json"), "{ broken").unwrap();
        let manifest = ProjectManifest::default();
        let npm = NpmPackager::new();
        let assembler = ManifestAssembler::new(project.path(), &manifest, "svc", &[], &npm);
        let written = assembler
            .write(&deps(&[("uuid", "9.0.1")]), &project.path().join("out"))
            .unwrap();
        assert!(written.lockfile_path.is_none());
        assert!(written.manifest_path.is_file());
    }
}
