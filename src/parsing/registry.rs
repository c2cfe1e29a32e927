// Parser registry: shared read-only after init (spec §5 "Shared
// resources"), dispatches a file path to the `LanguageParser` that claims
// its extension.

use crate::contracts::LanguageParser;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ParserRegistry {
    by_extension: HashMap<&'static str, Arc<dyn LanguageParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, parser: Arc<dyn LanguageParser>) {
        for ext in parser.extensions() {
            self.by_extension.insert(ext, parser.clone());
        }
    }

    pub fn for_path(&self, path: &str) -> Option<Arc<dyn LanguageParser>> {
        let ext = path.rsplit('.').next()?;
        self.by_extension.get(ext).cloned()
    }

    pub fn languages(&self) -> Vec<&'static str> {
        let mut langs: Vec<_> = self.by_extension.values().map(|p| p.language()).collect();
        langs.sort_unstable();
        langs.dedup();
        langs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ParseOutcome;
    use async_trait::async_trait;

    struct StubParser;

    #[async_trait]
    impl LanguageParser for StubParser {
        fn language(&self) -> &'static str {
            "stub"
        }
        fn extensions(&self) -> &'static [&'static str] {
            &["stub"]
        }
        async fn parse(&self, _path: &str, _source: &str) -> ParseOutcome {
            ParseOutcome::default()
        }
    }

    #[test]
    fn dispatches_by_extension() {
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(StubParser));
        assert!(registry.for_path("foo.stub").is_some());
        assert!(registry.for_path("foo.unknown").is_none());
    }

    #[test]
    fn path_with_no_extension_has_no_parser() {
        let registry = ParserRegistry::new();
        assert!(registry.for_path("Makefile").is_none());
    }
}
