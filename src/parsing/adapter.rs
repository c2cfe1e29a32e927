// Wraps a `LanguageParser` call with a panic guard and a hard timeout
// (spec §7: "unhandled runtime panics from a parser are caught by the
// adapter and downgraded to per-file parse failures").

use crate::contracts::{Diagnostic, LanguageParser, ParseOutcome, Severity};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct ParserAdapter {
    parser: Arc<dyn LanguageParser>,
    timeout: Duration,
}

impl ParserAdapter {
    pub fn new(parser: Arc<dyn LanguageParser>) -> Self {
        Self {
            parser,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parse `path`, never propagating a panic or a hang: both become a
    /// diagnostic-only `ParseOutcome`.
    pub async fn parse_guarded(&self, path: &str, source: &str) -> ParseOutcome {
        let parser = self.parser.clone();
        let path_owned = path.to_string();
        let source_owned = source.to_string();

        let handle = tokio::spawn(async move { parser.parse(&path_owned, &source_owned).await });

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                warn!(path, error = %join_err, "parser panicked");
                ParseOutcome {
                    diagnostics: vec![Diagnostic {
                        message: format!("parser panicked: {join_err}"),
                        line: None,
                        severity: Severity::Error,
                    }],
                    ..Default::default()
                }
            }
            Err(_) => {
                warn!(path, timeout_secs = self.timeout.as_secs(), "parser timed out");
                ParseOutcome {
                    diagnostics: vec![Diagnostic {
                        message: "parser exceeded timeout".to_string(),
                        line: None,
                        severity: Severity::Error,
                    }],
                    ..Default::default()
                }
            }
        }
    }
}
