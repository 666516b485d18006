//! File classification and size-capped content loading.

use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{commit::Locator, error::Result, store::ContentStore};

/// Files larger than this are reported as too large and never decoded.
pub const MAX_FILE_SIZE: usize = 1024 * 1024;

/// How a file can be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Text,
    Markdown,
    Image,
}

impl Capability {
    /// Whether presenting the file needs its bytes decoded as text.
    pub fn decodes_text(&self) -> bool {
        matches!(self, Capability::Text | Capability::Markdown)
    }
}

/// A capability plus a renderer hint (language id or mime type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Viewer {
    pub capability: Capability,
    pub hint: String,
}

impl Viewer {
    fn new(capability: Capability, hint: &str) -> Self {
        Self {
            capability,
            hint: hint.to_string(),
        }
    }
}

/// A resolved file ready for display.
///
/// `content` is present only for text-like files within [`MAX_FILE_SIZE`];
/// `too_large` marks text-like files that exceeded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub path: String,
    pub viewers: Vec<Viewer>,
    pub content: Option<String>,
    pub too_large: bool,
}

impl FileDescriptor {
    /// Descriptor for inline markdown such as an issue body.
    pub fn markdown(path: String, content: String) -> Self {
        Self {
            path,
            viewers: vec![Viewer::new(Capability::Markdown, "markdown")],
            content: Some(content),
            too_large: false,
        }
    }

    /// Language hint of the text viewer, `plaintext` when there is none.
    pub fn language(&self) -> &str {
        self.viewers
            .iter()
            .find(|v| v.capability == Capability::Text)
            .map(|v| v.hint.as_str())
            .unwrap_or("plaintext")
    }

    pub fn is_text(&self) -> bool {
        self.viewers.iter().any(|v| v.capability.decodes_text())
    }
}

/// Classify `path` by its file name alone.
pub fn viewers_for(path: &str) -> Vec<Viewer> {
    let name = path.rsplit('/').next().unwrap_or(path).to_lowercase();
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => "",
    };

    match ext {
        "md" | "markdown" | "mdown" | "mkd" => {
            return vec![
                Viewer::new(Capability::Markdown, "markdown"),
                Viewer::new(Capability::Text, "markdown"),
            ]
        }
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "ico" => {
            let mime = match ext {
                "jpg" => "image/jpeg".to_string(),
                "ico" => "image/x-icon".to_string(),
                other => format!("image/{other}"),
            };
            return vec![Viewer::new(Capability::Image, &mime)];
        }
        "svg" => {
            return vec![
                Viewer::new(Capability::Image, "image/svg+xml"),
                Viewer::new(Capability::Text, "xml"),
            ]
        }
        _ => {}
    }

    if let Some(lang) = language_for_extension(ext) {
        return vec![Viewer::new(Capability::Text, lang)];
    }
    if let Some(lang) = language_for_name(&name) {
        return vec![Viewer::new(Capability::Text, lang)];
    }
    vec![]
}

fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lang = match ext {
        "rs" => "rust",
        "ts" | "tsx" | "mts" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" => "python",
        "go" => "go",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "java" => "java",
        "kt" => "kotlin",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "sh" | "bash" | "zsh" => "shell",
        "json" => "json",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        "xml" => "xml",
        "sql" => "sql",
        "txt" | "text" | "log" | "csv" | "lock" | "gitignore" | "env" => "plaintext",
        _ => return None,
    };
    Some(lang)
}

fn language_for_name(name: &str) -> Option<&'static str> {
    let lang = match name {
        "makefile" => "makefile",
        "dockerfile" => "dockerfile",
        "readme" | "license" | "licence" | "copying" | "authors" | "changelog" | "notice" => {
            "plaintext"
        }
        _ => return None,
    };
    Some(lang)
}

/// Load the file at `locator`, enforcing [`MAX_FILE_SIZE`].
pub async fn load_file(store: &dyn ContentStore, locator: &Locator) -> Result<FileDescriptor> {
    load_capped(store, locator, MAX_FILE_SIZE).await
}

pub(crate) async fn load_capped(
    store: &dyn ContentStore,
    locator: &Locator,
    cap: usize,
) -> Result<FileDescriptor> {
    let path = locator.store_path();
    let viewers = viewers_for(&path);
    if !viewers.iter().any(|v| v.capability.decodes_text()) {
        debug!(%path, "not text, skipping transfer");
        return Ok(FileDescriptor {
            path,
            viewers,
            content: None,
            too_large: false,
        });
    }

    // The store gives no reliable size up front, so the cap applies mid-transfer.
    let mut stream = store.stream(&path).await?;
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > cap {
            warn!(%path, cap, "file exceeds size cap");
            return Ok(FileDescriptor {
                path,
                viewers,
                content: None,
                too_large: true,
            });
        }
        buf.extend_from_slice(&chunk);
    }

    let content = String::from_utf8_lossy(&buf).into_owned();
    debug!(%path, bytes = buf.len(), "loaded file");
    Ok(FileDescriptor {
        path,
        viewers,
        content: Some(content),
        too_large: false,
    })
}
