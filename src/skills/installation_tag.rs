//! Installation Tag Injector (C8): attach or verify an installation-scoped
//! tag in a skill's `SKILL.md` YAML frontmatter.
//!
//! The tag itself comes from an out-of-scope `installation-key` module; we
//! only ever treat it as an opaque, constant-time-compared string.

use subtle::ConstantTimeEq;

const FRONTMATTER_DELIM: &str = "---";
const TAG_PREFIX: &str = "agenshield-";

struct Frontmatter<'a> {
    lines: Vec<&'a str>,
    body: &'a str,
}

/// Outcome of looking for a frontmatter block at the start of a document.
enum FrontmatterResult<'a> {
    /// No `---` at all: a fresh block should be prepended.
    Absent,
    /// Started with `---` but never closed: a parse failure, leave as-is.
    Malformed,
    Found(Frontmatter<'a>),
}

fn split_frontmatter(content: &str) -> FrontmatterResult<'_> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with(FRONTMATTER_DELIM) {
        return FrontmatterResult::Absent;
    }
    let after_open = &trimmed[FRONTMATTER_DELIM.len()..];
    let Some(after_open) = after_open.strip_prefix('\n').or_else(|| after_open.strip_prefix("\r\n")) else {
        return FrontmatterResult::Malformed;
    };

    let Some(closing) = after_open.find("\n---") else {
        return FrontmatterResult::Malformed;
    };
    let block = &after_open[..closing];
    let rest = &after_open[closing + 1..];
    let body = rest.strip_prefix("---").unwrap_or(rest);
    let body = body.strip_prefix('\n').unwrap_or(body);

    FrontmatterResult::Found(Frontmatter {
        lines: block.lines().collect(),
        body,
    })
}

fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("- ") || trimmed == "-"
}

fn list_item_value(line: &str) -> String {
    let trimmed = line.trim_start();
    let value = trimmed.strip_prefix("- ").unwrap_or(trimmed).trim();
    strip_quotes(value)
}

fn strip_quotes(s: &str) -> String {
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Extract every string value of a top-level `tags:` list, in order.
fn extract_tags(lines: &[&str]) -> Vec<String> {
    let mut tags = Vec::new();
    let mut in_tags = false;

    for line in lines {
        let is_top_level = !line.starts_with(' ') && !line.starts_with('\t');

        if is_top_level {
            in_tags = line.trim_end().trim_end_matches(':') == "tags" || line.trim() == "tags:";
            continue;
        }

        if in_tags && is_list_item(line) {
            tags.push(list_item_value(line));
        }
    }

    tags
}

/// Inject the installation tag into `content`'s frontmatter, replacing any
/// existing `agenshield-`-prefixed tag. If frontmatter is absent, a new
/// block is prepended. Leaves content untouched on any parse failure.
pub fn inject(content: &str, tag: &str) -> String {
    let tagged = format!("{TAG_PREFIX}{tag}");

    let fm = match split_frontmatter(content) {
        FrontmatterResult::Absent => {
            return format!("{FRONTMATTER_DELIM}\ntags:\n  - {tagged}\n{FRONTMATTER_DELIM}\n{content}");
        }
        FrontmatterResult::Malformed => return content.to_string(),
        FrontmatterResult::Found(fm) => fm,
    };

    let mut existing = extract_tags(&fm.lines);
    existing.retain(|t| !t.starts_with(TAG_PREFIX));
    existing.push(tagged);

    let mut new_lines: Vec<String> = Vec::new();
    let mut in_tags = false;
    let mut tags_written = false;

    for line in &fm.lines {
        let is_top_level = !line.starts_with(' ') && !line.starts_with('\t');

        if is_top_level {
            let was_tags_key = line.trim_end().trim_end_matches(':') == "tags" || line.trim() == "tags:";
            in_tags = was_tags_key;
            if was_tags_key {
                new_lines.push("tags:".to_string());
                for t in &existing {
                    new_lines.push(format!("  - {t}"));
                }
                tags_written = true;
                continue;
            }
            new_lines.push(line.to_string());
            continue;
        }

        if in_tags {
            // Drop old list items; already rewritten above.
            continue;
        }

        new_lines.push(line.to_string());
    }

    if !tags_written {
        new_lines.push("tags:".to_string());
        for t in &existing {
            new_lines.push(format!("  - {t}"));
        }
    }

    format!(
        "{FRONTMATTER_DELIM}\n{}\n{FRONTMATTER_DELIM}\n{}",
        new_lines.join("\n"),
        fm.body
    )
}

/// A document is "validly tagged" iff its frontmatter's `tags` list
/// contains an element matching `current_tag` exactly, compared in
/// constant time.
pub fn verify(content: &str, current_tag: &str) -> bool {
    let fm = match split_frontmatter(content) {
        FrontmatterResult::Found(fm) => fm,
        FrontmatterResult::Absent | FrontmatterResult::Malformed => return false,
    };
    let expected = format!("{TAG_PREFIX}{current_tag}");
    let tags = extract_tags(&fm.lines);
    tags.iter()
        .any(|t| bool::from(t.as_bytes().ct_eq(expected.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG: &str = "abc123def456";

    #[test]
    fn inject_prepends_block_when_no_frontmatter() {
        let content = "# Weather\nInstructions.";
        let out = inject(content, TAG);
        assert!(out.starts_with("---\ntags:\n  - agenshield-abc123def456\n---\n"));
        assert!(out.ends_with(content));
        assert!(verify(&out, TAG));
    }

    #[test]
    fn inject_adds_tags_key_when_absent_from_existing_frontmatter() {
        let content = "---\nname: weather\ndescription: gets weather\n---\nbody\n";
        let out = inject(content, TAG);
        assert!(verify(&out, TAG));
        assert!(out.contains("name: weather"));
    }

    #[test]
    fn inject_replaces_prior_agenshield_tag_keeps_others() {
        let content = "---\nname: weather\ntags:\n  - weather\n  - agenshield-oldtag\n---\nbody\n";
        let out = inject(content, TAG);

        let FrontmatterResult::Found(fm) = split_frontmatter(&out) else {
            panic!("expected well-formed frontmatter");
        };
        let tags = extract_tags(&fm.lines);
        assert!(tags.contains(&"weather".to_string()));
        assert!(!tags.iter().any(|t| t == "agenshield-oldtag"));
        assert!(tags.contains(&format!("agenshield-{TAG}")));
    }

    #[test]
    fn verify_rejects_wrong_or_missing_tag() {
        let content = "---\ntags:\n  - agenshield-different\n---\nbody\n";
        assert!(!verify(content, TAG));

        let no_fm = "just a body";
        assert!(!verify(no_fm, TAG));
    }

    #[test]
    fn inject_leaves_content_untouched_on_unterminated_frontmatter() {
        let content = "---\nname: weather\nno closing delimiter here\n";
        let out = inject(content, TAG);
        assert_eq!(out, content);
    }
}
