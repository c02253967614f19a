//! Extension to mime type lookup

use aide_types::WorkspacePath;

/// Mime type reported for directories
pub const DIRECTORY_MIME: &str = "inode/directory";

const FALLBACK: &str = "application/octet-stream";

/// Mime type of a file, derived from its extension
#[must_use]
pub fn mime_for(path: &WorkspacePath) -> &'static str {
    let Some(ext) = path.extension() else {
        return FALLBACK;
    };
    match ext.to_ascii_lowercase().as_str() {
        "ts" | "mts" | "cts" => "text/typescript",
        "tsx" => "text/tsx",
        "js" | "mjs" | "cjs" => "text/javascript",
        "jsx" => "text/jsx",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "scss" => "text/x-scss",
        "md" => "text/markdown",
        "txt" => "text/plain",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "rs" => "text/x-rust",
        "py" => "text/x-python",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => FALLBACK,
    }
}
