//! Marketplace Cache (C7): extract a downloaded zip bundle, classify its
//! entries, inline images into markdown, and persist to the on-disk cache.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::model::{SkillMetadata, SkillSource};
use crate::error::Result;
use crate::util::atomic_write;

/// Maximum raw size for an image to be kept and inlined as a data URI.
const MAX_IMAGE_BYTES: usize = 500 * 1024;

const TEXT_EXTENSIONS: &[&str] = &[
    "md", "markdown", "json", "yaml", "yml", "toml", "txt", "rs", "py", "js", "ts", "jsx",
    "tsx", "sh", "bash", "go", "rb", "java", "c", "h", "cpp", "hpp", "css", "html",
];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico"];

fn extension_lower(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn image_mime(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

fn is_dotfile(path: &str) -> bool {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

enum Classified {
    Text(String),
    Image(String),
    Dropped,
}

fn classify(path: &str, bytes: &[u8]) -> Classified {
    let ext = extension_lower(path);

    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return match std::str::from_utf8(bytes) {
            Ok(s) => Classified::Text(s.to_string()),
            Err(_) => Classified::Dropped,
        };
    }

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        if bytes.len() <= MAX_IMAGE_BYTES {
            use base64::Engine as _;
            let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
            return Classified::Image(format!("data:{};base64,{}", image_mime(&ext), b64));
        }
        return Classified::Dropped;
    }

    if is_dotfile(path) {
        return Classified::Dropped;
    }

    Classified::Dropped
}

static IMAGE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("static regex compiles"));

/// Replace `![alt](relpath)` references to a known image with its inlined
/// data URI, matching by exact path, normalized path (strip `./`), or
/// basename.
pub fn inline_images(markdown: &str, images: &BTreeMap<String, String>) -> String {
    IMAGE_LINK
        .replace_all(markdown, |caps: &regex::Captures| {
            let alt = &caps[1];
            let link = &caps[2];

            if link.starts_with("http://") || link.starts_with("https://") || link.starts_with("data:") {
                return caps[0].to_string();
            }

            let normalized = link.strip_prefix("./").unwrap_or(link);
            let basename = Path::new(link).file_name().and_then(|n| n.to_str());

            let data_uri = images
                .get(link)
                .or_else(|| images.get(normalized))
                .or_else(|| basename.and_then(|b| images.iter().find(|(k, _)| k.ends_with(&format!("/{b}")) || k.as_str() == b).map(|(_, v)| v)));

            match data_uri {
                Some(uri) => format!("![{alt}]({uri})"),
                None => caps[0].to_string(),
            }
        })
        .to_string()
}

fn is_markdown(path: &str) -> bool {
    let ext = extension_lower(path);
    ext == "md" || ext == "markdown"
}

/// Extract a zip archive's entries into classified in-memory maps: text
/// file contents keyed by their archive-relative path, and image data URIs
/// keyed the same way (used only for markdown inlining, never persisted
/// as standalone files).
fn extract(zip_bytes: &[u8]) -> Result<(BTreeMap<String, String>, BTreeMap<String, String>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes))?;
    let mut text_files = BTreeMap::new();
    let mut images = BTreeMap::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;

        match classify(&name, &bytes) {
            Classified::Text(s) => {
                text_files.insert(name, s);
            }
            Classified::Image(data_uri) => {
                images.insert(name, data_uri);
            }
            Classified::Dropped => {}
        }
    }

    Ok((text_files, images))
}

/// Download+extract result, ready to persist.
pub struct ExtractedBundle {
    pub files: BTreeMap<String, String>,
}

/// Classify a zip's entries and inline images into every markdown text
/// file. Returns an empty `files` map when the zip yields nothing usable.
pub fn prepare(zip_bytes: &[u8]) -> Result<ExtractedBundle> {
    let (mut text_files, images) = extract(zip_bytes)?;

    if !images.is_empty() {
        for (path, content) in text_files.iter_mut() {
            if is_markdown(path) {
                *content = inline_images(content, &images);
            }
        }
    }

    Ok(ExtractedBundle { files: text_files })
}

fn cache_dir_for(cache_root: &Path, slug: &str) -> PathBuf {
    cache_root.join(slug)
}

/// Persist a prepared bundle's files and metadata. On re-store, any
/// existing `source`/`analysis` not explicitly overwritten here is kept.
pub async fn store(
    cache_root: &Path,
    slug: &str,
    bundle: &ExtractedBundle,
    mut metadata: SkillMetadata,
) -> Result<SkillMetadata> {
    let dir = cache_dir_for(cache_root, slug);
    let files_dir = dir.join("files");

    for (rel_path, content) in &bundle.files {
        let dest = files_dir.join(rel_path);
        atomic_write(&dest, content.as_bytes()).await?;
    }

    let metadata_path = dir.join("metadata.json");
    if let Ok(existing_bytes) = tokio::fs::read(&metadata_path).await {
        if let Ok(existing) = serde_json::from_slice::<SkillMetadata>(&existing_bytes) {
            if metadata.analysis.is_none() {
                metadata.analysis = existing.analysis;
            }
            if metadata.source.is_none() {
                metadata.source = existing.source;
            }
        }
    }

    let bytes = serde_json::to_vec_pretty(&metadata)?;
    atomic_write(&metadata_path, &bytes).await?;

    Ok(metadata)
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn collect_dir<'a>(
    root: &'a Path,
    dir: &'a Path,
    text_files: &'a mut BTreeMap<String, String>,
    images: &'a mut BTreeMap<String, String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                collect_dir(root, &path, text_files, images).await?;
            } else if file_type.is_file() {
                let relative = relative_slash_path(root, &path);
                let bytes = tokio::fs::read(&path).await?;
                match classify(&relative, &bytes) {
                    Classified::Text(s) => {
                        text_files.insert(relative, s);
                    }
                    Classified::Image(data_uri) => {
                        images.insert(relative, data_uri);
                    }
                    Classified::Dropped => {}
                }
            }
        }
        Ok(())
    })
}

/// Move a loose on-disk skill directory into the cache (spec.md §4.10's
/// "move the directory into the marketplace cache"), classifying and
/// inlining exactly as a downloaded zip would.
pub async fn store_from_dir(
    cache_root: &Path,
    slug: &str,
    source_dir: &Path,
    metadata: SkillMetadata,
) -> Result<SkillMetadata> {
    let mut text_files = BTreeMap::new();
    let mut images = BTreeMap::new();
    collect_dir(source_dir, source_dir, &mut text_files, &mut images).await?;

    if !images.is_empty() {
        for (path, content) in text_files.iter_mut() {
            if is_markdown(path) {
                *content = inline_images(content, &images);
            }
        }
    }

    let bundle = ExtractedBundle { files: text_files };
    store(cache_root, slug, &bundle, metadata).await
}

/// Flip `wasInstalled` on an already-cached entry without touching its
/// files, used when uninstalling a skill while preserving its cache
/// (spec.md §4.9's Uninstall: "preserve the marketplace cache and set
/// `wasInstalled=true`").
pub async fn set_was_installed(cache_root: &Path, slug: &str, was_installed: bool) -> Result<()> {
    let metadata_path = cache_dir_for(cache_root, slug).join("metadata.json");
    let bytes = tokio::fs::read(&metadata_path).await?;
    let mut metadata: SkillMetadata = serde_json::from_slice(&bytes)?;
    metadata.was_installed = Some(was_installed);
    let bytes = serde_json::to_vec_pretty(&metadata)?;
    atomic_write(&metadata_path, &bytes).await
}

pub fn new_metadata(
    slug: &str,
    name: &str,
    author: &str,
    version: &str,
    description: &str,
    tags: Vec<String>,
    downloaded_at: String,
    source: SkillSource,
) -> SkillMetadata {
    SkillMetadata {
        name: name.to_string(),
        slug: slug.to_string(),
        author: author.to_string(),
        version: version.to_string(),
        description: description.to_string(),
        tags,
        downloaded_at,
        source: Some(source),
        analysis: None,
        was_installed: None,
    }
}
