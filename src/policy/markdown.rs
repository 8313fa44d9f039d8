//! Policy instructions markdown (spec.md §6): a pure function of the
//! active policy set and a known-skills set, regenerated by the
//! reconciler on every change and written into the agent's config
//! directory so the agent can read its own constraints.

use std::collections::BTreeSet;

use chrono::Utc;

use super::model::{FileOperation, Policy, PolicyAction, PolicySet, TargetKind};

/// Short catalog descriptions for the canonical proxied commands
/// (spec.md §4.5); commands outside this table render with no description.
fn catalog_description(name: &str) -> Option<&'static str> {
    Some(match name {
        "curl" | "wget" => "HTTP client",
        "git" => "version control",
        "ssh" | "scp" => "remote shell / file transfer",
        "rsync" => "file synchronization",
        "brew" => "package manager",
        "npm" | "npx" => "Node.js package manager",
        "pip" | "pip3" => "Python package manager",
        "open-url" => "open a URL in the default browser",
        _ => return None,
    })
}

fn operations_label(ops: &[FileOperation]) -> String {
    let mut labels: Vec<&str> = ops
        .iter()
        .map(|op| match op {
            FileOperation::FileRead => "read",
            FileOperation::FileWrite => "write",
            FileOperation::FileList => "list",
        })
        .collect();
    labels.sort_unstable();
    labels.dedup();
    labels.join(", ")
}

fn bullet_list<'a>(items: impl Iterator<Item = &'a Policy>, describe: bool) -> String {
    let mut lines = Vec::new();
    for policy in items {
        for pattern in &policy.patterns {
            let mut line = format!("- `{pattern}`");
            if describe {
                if let Some(desc) = catalog_description(pattern) {
                    line.push_str(&format!(" — {desc}"));
                }
            } else if policy.is_filesystem() && !policy.operations.is_empty() {
                line.push_str(&format!(" ({})", operations_label(&policy.operations)));
            }
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// Render the policy-instructions document. Section order: Commands,
/// Network/URLs, Filesystem Access, Skills. A section with nothing to say
/// is omitted entirely.
pub fn render(policies: &PolicySet, known_skills: &BTreeSet<String>) -> String {
    let mut sections = Vec::new();

    let commands: Vec<&Policy> = policies.enabled().filter(|p| p.target == TargetKind::Command).collect();
    let commands_allowed: Vec<&Policy> =
        commands.iter().copied().filter(|p| p.action == PolicyAction::Allow).collect();
    let commands_denied: Vec<&Policy> =
        commands.iter().copied().filter(|p| p.action == PolicyAction::Deny).collect();
    if !commands_allowed.is_empty() || !commands_denied.is_empty() {
        let mut section = String::from("## Commands\n\n");
        if !commands_allowed.is_empty() {
            section.push_str("### Allowed\n\n");
            section.push_str(&bullet_list(commands_allowed.into_iter(), true));
            section.push_str("\n\n");
        }
        if !commands_denied.is_empty() {
            section.push_str("### Denied\n\n");
            section.push_str(&bullet_list(commands_denied.into_iter(), true));
            section.push('\n');
        }
        sections.push(section.trim_end().to_string());
    }

    let urls: Vec<&Policy> = policies.enabled().filter(|p| p.target == TargetKind::Url).collect();
    let urls_allowed: Vec<&Policy> = urls.iter().copied().filter(|p| p.action == PolicyAction::Allow).collect();
    let urls_denied: Vec<&Policy> = urls.iter().copied().filter(|p| p.action == PolicyAction::Deny).collect();
    if !urls_allowed.is_empty() || !urls_denied.is_empty() {
        let mut section = String::from("## Network / URLs\n\nPlain HTTP is blocked by default.\n\n");
        if !urls_allowed.is_empty() {
            section.push_str("### Allowed\n\n");
            section.push_str(&bullet_list(urls_allowed.into_iter(), false));
            section.push_str("\n\n");
        }
        if !urls_denied.is_empty() {
            section.push_str("### Denied\n\n");
            section.push_str(&bullet_list(urls_denied.into_iter(), false));
            section.push('\n');
        }
        sections.push(section.trim_end().to_string());
    }

    let fs: Vec<&Policy> = policies.enabled().filter(|p| p.target == TargetKind::Filesystem).collect();
    let fs_allowed: Vec<&Policy> = fs.iter().copied().filter(|p| p.action == PolicyAction::Allow).collect();
    let fs_denied: Vec<&Policy> = fs.iter().copied().filter(|p| p.action == PolicyAction::Deny).collect();
    if !fs_allowed.is_empty() || !fs_denied.is_empty() {
        let mut section = String::from("## Filesystem Access\n\n");
        if !fs_allowed.is_empty() {
            section.push_str("### Allowed\n\n");
            section.push_str(&bullet_list(fs_allowed.into_iter(), false));
            section.push_str("\n\n");
        }
        if !fs_denied.is_empty() {
            section.push_str("### Denied\n\n");
            section.push_str(&bullet_list(fs_denied.into_iter(), false));
            section.push('\n');
        }
        sections.push(section.trim_end().to_string());
    }

    let skills: Vec<&Policy> = policies
        .enabled()
        .filter(|p| p.target == TargetKind::Skill)
        .filter(|p| p.patterns.iter().any(|slug| known_skills.contains(slug)))
        .collect();
    if !skills.is_empty() {
        let mut section = String::from("## Skills\n\n");
        section.push_str(&bullet_list(skills.into_iter(), false));
        sections.push(section.trim_end().to_string());
    }

    let mut doc = sections.join("\n\n");
    if !doc.is_empty() {
        doc.push_str("\n\n");
    }
    doc.push_str(&format!("_Generated {}_\n", Utc::now().to_rfc3339()));
    doc
}
