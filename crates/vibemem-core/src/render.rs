//! Markdown rendering of memory sets.
//!
//! Rendering is a pure function of its input: the same items always give
//! byte-identical text.

use std::collections::BTreeMap;

use crate::memory::{CategoryAggregate, MemoryItem};

pub const HOT_TITLE: &str = "# vibemem - Project Memory";
pub const INDEX_TITLE: &str = "# vibemem Index";
const INDEX_HINT: &str = "Use `vibemem show -c <category>` to view details.";
const CRITICAL_PREFIX: &str = "**[!]** ";

/// How each item line is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineStyle {
    /// `- content`, critical items as `**[!]** content`.
    #[default]
    Marked,
    /// `- content` for every item.
    Plain,
    /// `- [priority] content`.
    Annotated,
}

impl LineStyle {
    fn line(self, item: &MemoryItem) -> String {
        match self {
            Self::Marked if item.is_critical() => format!("{CRITICAL_PREFIX}{}", item.content()),
            Self::Marked | Self::Plain => format!("- {}", item.content()),
            Self::Annotated => format!("- [{}] {}", item.priority(), item.content()),
        }
    }
}

/// Capitalise the first letter of every alphabetic run, lower-case the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Group items by category, categories sorted, input order within each.
pub fn group_by_category(items: &[MemoryItem]) -> BTreeMap<&str, Vec<&MemoryItem>> {
    let mut groups: BTreeMap<&str, Vec<&MemoryItem>> = BTreeMap::new();
    for item in items {
        groups.entry(item.category()).or_default().push(item);
    }
    groups
}

/// Lines for the grouped body: a `##` heading per category, item lines, and
/// a blank line after each group.
fn grouped_lines(items: &[MemoryItem], style: LineStyle) -> Vec<String> {
    let mut lines = Vec::new();
    for (category, group) in group_by_category(items) {
        lines.push(format!("## {}", title_case(category)));
        lines.extend(group.into_iter().map(|item| style.line(item)));
        lines.push(String::new());
    }
    lines
}

/// Grouped markdown body without a title.
pub fn render_grouped(items: &[MemoryItem], style: LineStyle) -> String {
    grouped_lines(items, style).join("\n")
}

/// The always-loaded "hot" artifact.
pub fn render_hot(items: &[MemoryItem]) -> String {
    let mut lines = vec![HOT_TITLE.to_string(), String::new()];
    lines.extend(grouped_lines(items, LineStyle::Marked));
    lines.join("\n")
}

/// Hot artifact for one tool, preceded by a comment line naming the tool.
pub fn render_tool_artifact(tool: &str, items: &[MemoryItem]) -> String {
    format!("<!-- vibemem: {tool} -->\n{}", render_hot(items))
}

/// One bullet per non-empty category with its item count and token sum.
pub fn render_index(aggregates: &BTreeMap<String, CategoryAggregate>) -> String {
    let mut lines = vec![INDEX_TITLE.to_string(), String::new()];
    for (category, agg) in aggregates {
        if agg.count() > 0 {
            lines.push(format!(
                "- **{}**: {} items ({} tokens)",
                category,
                agg.count(),
                agg.tokens()
            ));
        }
    }
    lines.push(String::new());
    lines.push(INDEX_HINT.to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{CategoryPath, MemoryStore, Priority};
    use crate::tokenizer::Tokenizer;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn item(cat: &str, content: &str, priority: Priority) -> MemoryItem {
        MemoryItem::new(
            &CategoryPath::parse(cat).unwrap(),
            content,
            priority,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            &Tokenizer::bytes(),
        )
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("arch"), "Arch");
        assert_eq!(title_case("API"), "Api");
        assert_eq!(title_case("foo_bar"), "Foo_Bar");
        assert_eq!(title_case("my-cat2go"), "My-Cat2Go");
    }

    #[test]
    fn test_hot_render_is_stable() {
        let items = vec![
            item("style", "prefer snake_case", Priority::Normal),
            item("arch", "API uses port 8002", Priority::Critical),
            item("arch", "SAST and DAST are separate", Priority::Normal),
        ];
        let actual = render_hot(&items);
        let expected = "# vibemem - Project Memory\n\n## Arch\n**[!]** API uses port 8002\n- SAST and DAST are separate\n\n## Style\n- prefer snake_case\n";
        assert_eq!(actual, expected);
        assert_eq!(render_hot(&items), actual);
    }

    #[test]
    fn test_hot_render_empty() {
        assert_eq!(render_hot(&[]), "# vibemem - Project Memory\n");
    }

    #[test]
    fn test_tool_artifact_names_tool() {
        let items = vec![item("api", "port 8002", Priority::Normal)];
        assert_eq!(
            render_tool_artifact("cursor", &items),
            "<!-- vibemem: cursor -->\n# vibemem - Project Memory\n\n## Api\n- port 8002\n"
        );
    }

    #[test]
    fn test_annotated_and_plain_styles() {
        let items = vec![item("api", "port 8002", Priority::Critical)];
        assert_eq!(render_grouped(&items, LineStyle::Plain), "## Api\n- port 8002\n");
        assert_eq!(
            render_grouped(&items, LineStyle::Annotated),
            "## Api\n- [critical] port 8002\n"
        );
    }

    #[test]
    fn test_index_skips_empty_categories() {
        let mut store = MemoryStore::new("/tmp/none", Arc::new(Tokenizer::bytes()));
        store.add("arch", "abcd", Priority::Normal).unwrap();
        store.add("style", "xy", Priority::Normal).unwrap();
        store.remove("xy").unwrap();

        let expected = "# vibemem Index\n\n- **arch**: 1 items (4 tokens)\n\nUse `vibemem show -c <category>` to view details.";
        assert_eq!(render_index(store.aggregates()), expected);
    }
}
