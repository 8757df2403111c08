//! Mapping of external module identifiers to installable version specs.
//!
//! A name is looked up, in order, in the project's own `dependencies`, in the
//! subtree of the package that required it, and anywhere in the production
//! graph. Direct dependencies pull in their required peer dependencies.
//! Force-included names that cannot be found keep an empty spec; everything
//! else that cannot be found is handed to the validator.

use crate::lookup::ManifestLookup;
use std::collections::{BTreeMap, HashSet, VecDeque};
use stowage_schema::{
    package_name, DependencyGraph, ExternalModuleRef, IncludeModulesTable, ProjectManifest,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedModule {
    pub name: String,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub resolved: BTreeMap<String, String>,
    pub unresolved: Vec<UnresolvedModule>,
}

struct Request {
    name: String,
    origin: Option<String>,
}

pub struct Resolver<'a> {
    manifest: &'a ProjectManifest,
    graph: &'a DependencyGraph,
    force_include: &'a [String],
    force_exclude: &'a [String],
    lookup: &'a dyn ManifestLookup,
}

impl<'a> Resolver<'a> {
    pub fn new(
        manifest: &'a ProjectManifest,
        graph: &'a DependencyGraph,
        settings: &'a IncludeModulesTable,
        lookup: &'a dyn ManifestLookup,
    ) -> Self {
        Self {
            manifest,
            graph,
            force_include: &settings.force_include,
            force_exclude: &settings.force_exclude,
            lookup,
        }
    }

    /// Resolve one artifact's external modules. Excluded names never appear
    /// in the result, whether they came from the bundler, `force_include` or
    /// peer expansion.
    pub fn resolve(&self, externals: &[ExternalModuleRef]) -> Resolution {
        let mut requested: BTreeMap<String, Option<String>> = BTreeMap::new();
        for module in externals {
            let Some(name) = module.package_name() else {
                continue;
            };
            let origin = requested.entry(name).or_insert(None);
            if origin.is_none() {
                origin.clone_from(&module.origin);
            }
        }
        for name in self.force_include {
            requested.entry(name.clone()).or_insert(None);
        }

        let mut queue: VecDeque<Request> = requested
            .into_iter()
            .map(|(name, origin)| Request { name, origin })
            .collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut resolution = Resolution::default();

        while let Some(request) = queue.pop_front() {
            if self.is_excluded(&request.name) || !seen.insert(request.name.clone()) {
                continue;
            }
            match self.version_of(&request.name, request.origin.as_deref()) {
                Some((spec, direct)) => {
                    if direct {
                        self.queue_peers(&request.name, &mut queue);
                    }
                    resolution.resolved.insert(request.name, spec);
                }
                None if self.force_include.contains(&request.name) => {
                    debug!("'{}' is force-included without a known version", request.name);
                    resolution.resolved.insert(request.name, String::new());
                }
                None => resolution.unresolved.push(UnresolvedModule {
                    name: request.name,
                    origin: request.origin,
                }),
            }
        }
        resolution
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.force_exclude.iter().any(|n| n == name)
    }

    /// The spec for `name` and whether it is a direct project dependency.
    fn version_of(&self, name: &str, origin: Option<&str>) -> Option<(String, bool)> {
        if let Some(spec) = self.manifest.dependency(name) {
            return Some((spec.to_owned(), true));
        }
        if let Some(origin) = origin.and_then(package_name) {
            if let Some(version) = self.graph.find_under(&origin, name) {
                return Some((version.to_owned(), false));
            }
        }
        self.graph
            .find_version(name)
            .map(|version| (version.to_owned(), false))
    }

    fn queue_peers(&self, name: &str, queue: &mut VecDeque<Request>) {
        match self.lookup.package_manifest(name) {
            Ok(manifest) => {
                for peer in manifest.required_peers() {
                    debug!("adding peer dependency '{peer}' of '{name}'");
                    queue.push_back(Request {
                        name: peer.to_owned(),
                        origin: Some(name.to_owned()),
                    });
                }
            }
            Err(e) => warn!("could not read manifest of '{name}' to check peer dependencies: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::InMemoryLookup;
    use stowage_schema::{parse_manifest_str, DependencyTree};

    fn graph(json: &str) -> DependencyGraph {
        let tree: DependencyTree = serde_json::from_str(json).unwrap();
        DependencyGraph::from_tree(&tree)
    }

    fn externals(names: &[&str]) -> Vec<ExternalModuleRef> {
        names.iter().map(|n| ExternalModuleRef::new(*n)).collect()
    }

    fn settings(include: &[&str], exclude: &[&str]) -> IncludeModulesTable {
        IncludeModulesTable {
            force_include: include.iter().map(|s| (*s).to_owned()).collect(),
            force_exclude: exclude.iter().map(|s| (*s).to_owned()).collect(),
            ..IncludeModulesTable::default()
        }
    }

    #[test]
    fn transitive_only_dependency_uses_nested_version() {
        let manifest = parse_manifest_str(r#"{"dependencies":{"Y":"^1.0.0"}}"#).unwrap();
        let graph = graph(r#"{"Y":{"version":"1.0.0","dependencies":{"X":{"version":"2.2.6","dependencies":{}}}}}"#);
        let settings = settings(&[], &[]);
        let lookup = InMemoryLookup::new();
        let resolution = Resolver::new(&manifest, &graph, &settings, &lookup).resolve(&externals(&["X"]));
        assert_eq!(
            resolution.resolved,
            BTreeMap::from([("X".to_owned(), "2.2.6".to_owned())])
        );
        assert!(resolution.unresolved.is_empty());
    }

    #[test]
    fn direct_dependency_keeps_declared_spec() {
        let manifest = parse_manifest_str(
            r#"{"dependencies":{"lodash":"^4.17.0","local":"file:../local"}}"#,
        )
        .unwrap();
        let graph = graph(r#"{"lodash":{"version":"4.17.21"}}"#);
        let settings = settings(&[], &[]);
        let lookup = InMemoryLookup::new();
        let resolution = Resolver::new(&manifest, &graph, &settings, &lookup)
            .resolve(&externals(&["lodash/fp", "local", "fs", "./relative"]));
        assert_eq!(resolution.resolved["lodash"], "^4.17.0");
        assert_eq!(resolution.resolved["local"], "file:../local");
        assert_eq!(resolution.resolved.len(), 2);
    }

    #[test]
    fn scoped_subpaths_collapse_to_package() {
        let manifest = parse_manifest_str(r#"{"dependencies":{"@scope/pkg":"1.0.0"}}"#).unwrap();
        let graph = DependencyGraph::new();
        let settings = settings(&[], &[]);
        let lookup = InMemoryLookup::new();
        let resolution = Resolver::new(&manifest, &graph, &settings, &lookup)
            .resolve(&externals(&["@scope/pkg/a", "@scope/pkg/b/c"]));
        assert_eq!(resolution.resolved.len(), 1);
        assert_eq!(resolution.resolved["@scope/pkg"], "1.0.0");
    }

    #[test]
    fn origin_subtree_is_searched_first() {
        let manifest = ProjectManifest::default();
        let graph = graph(
            r#"{"debug":{"version":"4.3.4"},"express":{"version":"4.18.2","dependencies":{"debug":{"version":"2.6.9"}}}}"#,
        );
        let settings = settings(&[], &[]);
        let lookup = InMemoryLookup::new();
        let resolver = Resolver::new(&manifest, &graph, &settings, &lookup);

        let from_express = resolver.resolve(&[ExternalModuleRef::new("debug").with_origin("express/lib/router")]);
        assert_eq!(from_express.resolved["debug"], "2.6.9");

        let anywhere = resolver.resolve(&externals(&["debug"]));
        assert_eq!(anywhere.resolved["debug"], "4.3.4");
    }

    #[test]
    fn exclude_wins_over_include() {
        let manifest = parse_manifest_str(r#"{"dependencies":{"pg":"8.11.0"}}"#).unwrap();
        let graph = DependencyGraph::new();
        let settings = settings(&["pg", "pg-native"], &["pg", "pg-native"]);
        let lookup = InMemoryLookup::new();
        let resolution = Resolver::new(&manifest, &graph, &settings, &lookup).resolve(&externals(&["pg"]));
        assert!(resolution.resolved.is_empty());
        assert!(resolution.unresolved.is_empty());
    }

    #[test]
    fn forced_unknown_gets_empty_spec() {
        let manifest = ProjectManifest::default();
        let graph = DependencyGraph::new();
        let settings = settings(&["pg-native"], &[]);
        let lookup = InMemoryLookup::new();
        let resolution = Resolver::new(&manifest, &graph, &settings, &lookup).resolve(&[]);
        assert_eq!(resolution.resolved["pg-native"], "");
    }

    #[test]
    fn unknown_names_are_left_for_the_validator() {
        let manifest = parse_manifest_str(r#"{"devDependencies":{"eslint":"^8.0.0"}}"#).unwrap();
        let graph = DependencyGraph::new();
        let settings = settings(&[], &[]);
        let lookup = InMemoryLookup::new();
        let resolution = Resolver::new(&manifest, &graph, &settings, &lookup)
            .resolve(&[ExternalModuleRef::new("eslint").with_origin("./src/lint.js")]);
        assert_eq!(
            resolution.unresolved,
            vec![UnresolvedModule {
                name: "eslint".to_owned(),
                origin: Some("./src/lint.js".to_owned()),
            }]
        );
    }

    #[test]
    fn required_peers_of_direct_dependencies_are_added() {
        let manifest = parse_manifest_str(
            r#"{"dependencies":{"ui-kit":"2.0.0","react":"^18.2.0"}}"#,
        )
        .unwrap();
        let graph = graph(r#"{"ui-kit":{"version":"2.0.0","dependencies":{"styled":{"version":"6.0.0"}}}}"#);
        let lookup = InMemoryLookup::new().with(
            "ui-kit",
            parse_manifest_str(
                r#"{"peerDependencies":{"react":"*","styled":"*","typescript":"*"},"peerDependenciesMeta":{"typescript":{"optional":true}}}"#,
            )
            .unwrap(),
        );
        let settings = settings(&[], &[]);
        let resolution = Resolver::new(&manifest, &graph, &settings, &lookup).resolve(&externals(&["ui-kit"]));
        assert_eq!(resolution.resolved["ui-kit"], "2.0.0");
        assert_eq!(resolution.resolved["react"], "^18.2.0");
        assert_eq!(resolution.resolved["styled"], "6.0.0");
        assert!(!resolution.resolved.contains_key("typescript"));
    }

    #[test]
    fn peer_cycles_terminate() {
        let manifest = parse_manifest_str(r#"{"dependencies":{"a":"1.0.0","b":"1.0.0"}}"#).unwrap();
        let graph = DependencyGraph::new();
        let lookup = InMemoryLookup::new()
            .with("a", parse_manifest_str(r#"{"peerDependencies":{"b":"*"}}"#).unwrap())
            .with("b", parse_manifest_str(r#"{"peerDependencies":{"a":"*"}}"#).unwrap());
        let settings = settings(&[], &[]);
        let resolution = Resolver::new(&manifest, &graph, &settings, &lookup).resolve(&externals(&["a"]));
        assert_eq!(resolution.resolved.len(), 2);
    }

    #[test]
    fn exclude_wins_over_peer_expansion() {
        let manifest = parse_manifest_str(r#"{"dependencies":{"ui-kit":"2.0.0","react":"18.2.0"}}"#).unwrap();
        let graph = DependencyGraph::new();
        let lookup = InMemoryLookup::new().with(
            "ui-kit",
            parse_manifest_str(r#"{"peerDependencies":{"react":"*"}}"#).unwrap(),
        );
        let settings = settings(&[], &["react"]);
        let resolution = Resolver::new(&manifest, &graph, &settings, &lookup).resolve(&externals(&["ui-kit"]));
        assert_eq!(resolution.resolved.len(), 1);
        assert!(resolution.resolved.contains_key("ui-kit"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let manifest = parse_manifest_str(r#"{"dependencies":{"b":"1","a":"2","c":"3"}}"#).unwrap();
        let graph = DependencyGraph::new();
        let settings = settings(&[], &[]);
        let lookup = InMemoryLookup::new();
        let resolver = Resolver::new(&manifest, &graph, &settings, &lookup);
        let first = resolver.resolve(&externals(&["c", "a", "b"]));
        let second = resolver.resolve(&externals(&["b", "c", "a"]));
        assert_eq!(first, second);
        assert_eq!(first.resolved.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
