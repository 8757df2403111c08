//! Rewriting of local-path dependency specs so they stay valid when the
//! manifest is written into a different directory than the project root.

/// Rebase a `file:` spec whose path does not start with `/` (within its first
/// two characters). Returns `None` when the spec is left untouched.
///
/// `path_to_root` is the relative path from the target directory back to the
/// project root. Backslashes in the result are normalized to `/`.
pub fn rebase_file_protocol(path_to_root: &str, spec: &str) -> Option<String> {
    if path_to_root.is_empty() || path_to_root == "." {
        return None;
    }
    let rest = spec.strip_prefix("file:")?;
    let mut head = rest.chars().take(2);
    match (head.next(), head.next()) {
        (Some(a), Some(b)) if a != '/' && b != '/' => {}
        _ => return None,
    }
    Some(format!("file:{path_to_root}/{rest}").replace('\\', "/"))
}

/// Rebase a manifest dependency spec. Handles `file:` specs like
/// [`rebase_file_protocol`] plus bare `./` and `../` paths; anything else is
/// returned unchanged.
///
/// Applying this twice to the same spec prefixes the root path twice.
pub fn rebase_dependency_spec(path_to_root: &str, spec: &str) -> String {
    if let Some(rebased) = rebase_file_protocol(path_to_root, spec) {
        return rebased;
    }
    if path_to_root.is_empty() || path_to_root == "." {
        return spec.to_owned();
    }
    if spec.starts_with("./") || spec.starts_with("../") {
        return format!("{path_to_root}/{spec}").replace('\\', "/");
    }
    spec.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_protocol_is_prefixed() {
        assert_eq!(
            rebase_file_protocol("../..", "file:../mymodule").as_deref(),
            Some("file:../../../mymodule")
        );
        assert_eq!(
            rebase_file_protocol("../..", "file:libs/a").as_deref(),
            Some("file:../../libs/a")
        );
    }

    #[test]
    fn absolute_file_paths_are_kept() {
        assert_eq!(rebase_file_protocol("../..", "file:/opt/lib"), None);
        assert_eq!(rebase_file_protocol("../..", "file:a/b"), None);
        assert_eq!(rebase_file_protocol("../..", "^1.2.3"), None);
    }

    #[test]
    fn backslashes_are_normalized() {
        assert_eq!(
            rebase_file_protocol("..\\..", "file:..\\lib").as_deref(),
            Some("file:../../../lib")
        );
    }

    #[test]
    fn bare_relative_paths_are_prefixed() {
        assert_eq!(rebase_dependency_spec(".stowage/..", "./vendor/x"), ".stowage/.././vendor/x");
        assert_eq!(rebase_dependency_spec("..", "../shared"), "../../shared");
        assert_eq!(rebase_dependency_spec("..", "^4.0.0"), "^4.0.0");
        assert_eq!(rebase_dependency_spec("..", "workspace:*"), "workspace:*");
    }

    #[test]
    fn same_directory_is_a_no_op() {
        assert_eq!(rebase_dependency_spec("", "file:../lib"), "file:../lib");
        assert_eq!(rebase_dependency_spec(".", "./lib"), "./lib");
    }

    #[test]
    fn rebasing_twice_compounds() {
        let once = rebase_dependency_spec("../..", "file:../../mymodule");
        assert_eq!(once, "file:../../../../mymodule");
        let twice = rebase_dependency_spec("../../locals", &once);
        assert_eq!(twice, "file:../../locals/../../../../mymodule");
    }
}
