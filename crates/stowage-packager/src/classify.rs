//! Classification of package-manager stderr.
//!
//! Managers frequently exit non-zero while still printing a usable listing.
//! Each backend declares a table of line prefixes it knows to be benign; a
//! line that matches no rule is fatal.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePolicy {
    /// Known noise, dropped.
    Silent,
    /// Benign, but surfaced to the caller as a graph problem.
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StderrRule {
    pub prefix: &'static str,
    pub policy: LinePolicy,
}

impl StderrRule {
    pub const fn new(prefix: &'static str, policy: LinePolicy) -> Self {
        Self { prefix, policy }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StderrVerdict {
    pub fatal: Vec<String>,
    pub reported: Vec<String>,
    pub silenced: usize,
}

impl StderrVerdict {
    pub fn is_fatal(&self) -> bool {
        !self.fatal.is_empty()
    }
}

/// Split `stderr` into lines and sort each into fatal, reported or silenced
/// using the first rule whose prefix matches. Blank lines are ignored.
pub fn classify_stderr(stderr: &str, rules: &[StderrRule]) -> StderrVerdict {
    let mut verdict = StderrVerdict::default();
    for line in stderr.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match rules.iter().find(|rule| line.starts_with(rule.prefix)) {
            Some(rule) if rule.policy == LinePolicy::Silent => verdict.silenced += 1,
            Some(_) => verdict.reported.push(line.to_owned()),
            None => verdict.fatal.push(line.to_owned()),
        }
    }
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &[StderrRule] = &[
        StderrRule::new("npm ERR! extraneous", LinePolicy::Silent),
        StderrRule::new("npm WARN", LinePolicy::Report),
    ];

    #[test]
    fn empty_stderr_is_clean() {
        let verdict = classify_stderr("", RULES);
        assert_eq!(verdict, StderrVerdict::default());
        assert!(!verdict.is_fatal());
    }

    #[test]
    fn lines_are_sorted_by_policy() {
        let stderr = "npm ERR! extraneous: foo@1.0.0\n\nnpm WARN deprecated bar\nnpm ERR! code E404\n";
        let verdict = classify_stderr(stderr, RULES);
        assert_eq!(verdict.silenced, 1);
        assert_eq!(verdict.reported, vec!["npm WARN deprecated bar"]);
        assert_eq!(verdict.fatal, vec!["npm ERR! code E404"]);
        assert!(verdict.is_fatal());
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = &[
            StderrRule::new("npm WARN peer", LinePolicy::Silent),
            StderrRule::new("npm WARN", LinePolicy::Report),
        ];
        let verdict = classify_stderr("npm WARN peer react@18\nnpm WARN old lockfile", rules);
        assert_eq!(verdict.silenced, 1);
        assert_eq!(verdict.reported.len(), 1);
    }
}
