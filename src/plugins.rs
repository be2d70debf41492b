//! Plugin dispatch shared by parsers and resolvers.
//!
//! Candidates are the configured plugins whose `can_handle` matches, in
//! configured order. When none match every plugin is tried, which covers
//! files whose extension does not reflect their content.

use std::sync::Arc;

use crate::error::Error;
use crate::file::FileInfo;

/// Common surface of parser and resolver plugins.
pub trait Plugin: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Whether this plugin claims the file. A hint, not a guarantee.
    fn can_handle(&self, file: &FileInfo) -> bool;
}

/// Pick the plugins to try for `file`.
pub fn select<P: Plugin + ?Sized>(plugins: &[Arc<P>], file: &FileInfo) -> Vec<Arc<P>> {
    let matching: Vec<Arc<P>> = plugins
        .iter()
        .filter(|p| p.can_handle(file))
        .cloned()
        .collect();
    if matching.is_empty() {
        plugins.to_vec()
    } else {
        matching
    }
}

/// Outcome of a successful [`run`].
#[derive(Debug)]
pub struct Handled<T> {
    pub plugin: String,
    pub result: T,
}

/// Invoke `f` on each candidate in order; the first success wins.
///
/// Returns `Ok(None)` when there are no candidates and the last error when
/// every candidate failed.
pub fn run<P, T, F>(candidates: &[Arc<P>], mut f: F) -> Result<Option<Handled<T>>, Error>
where
    P: Plugin + ?Sized,
    F: FnMut(&P) -> Result<T, Error>,
{
    let mut last_error = None;
    for plugin in candidates {
        match f(plugin.as_ref()) {
            Ok(result) => {
                return Ok(Some(Handled {
                    plugin: plugin.name().to_string(),
                    result,
                }))
            }
            Err(e) => {
                tracing::trace!(plugin = plugin.name(), error = %e, "plugin failed");
                last_error = Some(e);
            }
        }
    }
    match last_error {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ByExtension {
        name: &'static str,
        extension: &'static str,
        fails: bool,
    }

    impl Plugin for ByExtension {
        fn name(&self) -> &str {
            self.name
        }

        fn can_handle(&self, file: &FileInfo) -> bool {
            file.extension == self.extension
        }
    }

    fn plugins() -> Vec<Arc<ByExtension>> {
        vec![
            Arc::new(ByExtension { name: "a", extension: ".json", fails: true }),
            Arc::new(ByExtension { name: "b", extension: ".yaml", fails: false }),
            Arc::new(ByExtension { name: "c", extension: ".json", fails: false }),
        ]
    }

    fn attempt(p: &ByExtension) -> Result<&'static str, Error> {
        if p.fails {
            Err(Error::parser("file:///x", p.name))
        } else {
            Ok(p.name)
        }
    }

    #[test]
    fn select_filters_in_order() {
        let selected = select(&plugins(), &FileInfo::new("file:///x.json"));
        let names: Vec<&str> = selected.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn select_falls_back_to_all() {
        let selected = select(&plugins(), &FileInfo::new("file:///x.txt"));
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn run_first_success_wins() {
        let selected = select(&plugins(), &FileInfo::new("file:///x.json"));
        let handled = run(&selected, attempt).unwrap().unwrap();
        assert_eq!(handled.plugin, "c");
        assert_eq!(handled.result, "c");
    }

    #[test]
    fn run_returns_last_error() {
        let only_failing = vec![plugins().remove(0)];
        let err = run(&only_failing, attempt).unwrap_err();
        assert!(matches!(err, Error::Parser { .. }));
    }

    #[test]
    fn run_without_candidates() {
        let none: Vec<Arc<ByExtension>> = Vec::new();
        assert!(run(&none, attempt).unwrap().is_none());
    }
}
