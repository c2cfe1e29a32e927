//! Dual-channel query parsing (spec §4.9): free-form input is split into a
//! core query (drives recall) and context/topics (drive re-rank boost).
//! Structured `q`/`context` fields, when supplied, override whatever the
//! free-form text would have yielded.

const USER_QUERY_PREFIX: &str = "User Query:";
const SYSTEM_CONTEXT_PREFIX: &str = "System Context:";
const TOPICS_PREFIX: &str = "Topics:";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub core: String,
    pub context: Option<String>,
    pub topics: Vec<String>,
}

impl ParsedQuery {
    /// Text used for re-rank context overlap: context plus topics, joined.
    pub fn context_and_topics_text(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(context) = &self.context {
            parts.push(context.clone());
        }
        if !self.topics.is_empty() {
            parts.push(self.topics.join(" "));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Parse raw free-form input into its three optional sections, falling back
/// to treating the whole input as the core query when no section headers
/// are present.
pub fn parse_dual_channel(raw: &str) -> ParsedQuery {
    let mut core = String::new();
    let mut context: Option<String> = None;
    let mut topics: Vec<String> = Vec::new();
    let mut saw_section = false;

    enum Section {
        Core,
        Context,
        Topics,
    }
    let mut current: Option<Section> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(USER_QUERY_PREFIX) {
            saw_section = true;
            current = Some(Section::Core);
            append_line(&mut core, rest.trim());
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix(SYSTEM_CONTEXT_PREFIX) {
            saw_section = true;
            current = Some(Section::Context);
            append_line(context.get_or_insert_with(String::new), rest.trim());
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix(TOPICS_PREFIX) {
            saw_section = true;
            current = Some(Section::Topics);
            topics.extend(split_topics(rest));
            continue;
        }
        match current {
            Some(Section::Core) => append_line(&mut core, trimmed),
            Some(Section::Context) => append_line(context.get_or_insert_with(String::new), trimmed),
            Some(Section::Topics) => topics.extend(split_topics(trimmed)),
            None => {}
        }
    }

    if !saw_section {
        core = raw.trim().to_string();
    }

    ParsedQuery {
        core: core.trim().to_string(),
        context: context.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        topics,
    }
}

/// Apply structured overrides: `q`/`core` replaces the extracted core text,
/// `context` replaces the extracted context text.
pub fn apply_overrides(mut parsed: ParsedQuery, core_override: Option<&str>, context_override: Option<&str>) -> ParsedQuery {
    if let Some(core) = core_override {
        parsed.core = core.to_string();
    }
    if let Some(context) = context_override {
        parsed.context = Some(context.to_string());
    }
    parsed
}

fn append_line(buffer: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(text);
}

fn split_topics(text: &str) -> Vec<String> {
    text.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
