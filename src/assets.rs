use std::ffi::OsStr;
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "index.html";

#[derive(Debug)]
pub struct Asset {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

pub fn resolve_asset_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in request_path.split('/').filter(|segment| !segment.is_empty()) {
        if segment == "." || segment == ".." || segment.contains('\\') || segment.contains('\0')
        {
            return None;
        }
        path.push(segment);
    }

    if request_path.is_empty() || request_path.ends_with('/') {
        path.push(INDEX_FILE);
    }
    Some(path)
}

pub async fn load_asset(root: &Path, request_path: &str) -> Option<Asset> {
    let mut path = resolve_asset_path(root, request_path)?;
    let metadata = tokio::fs::metadata(&path).await.ok()?;
    if metadata.is_dir() {
        path.push(INDEX_FILE);
    }

    let bytes = tokio::fs::read(&path).await.ok()?;
    Some(Asset {
        bytes,
        content_type: content_type_for(&path),
    })
}

pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "txt" => "text/plain; charset=utf-8",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::{content_type_for, load_asset, resolve_asset_path};
    use std::path::Path;

    #[test]
    fn resolves_index_for_directory_paths() {
        let root = Path::new("/srv/public");
        assert_eq!(
            resolve_asset_path(root, "/"),
            Some(root.join("index.html"))
        );
        assert_eq!(
            resolve_asset_path(root, "/docs/"),
            Some(root.join("docs").join("index.html"))
        );
        assert_eq!(
            resolve_asset_path(root, "/css/app.css"),
            Some(root.join("css").join("app.css"))
        );
    }

    #[test]
    fn rejects_traversal() {
        let root = Path::new("/srv/public");
        assert!(resolve_asset_path(root, "/../etc/passwd").is_none());
        assert!(resolve_asset_path(root, "/css/../../secret").is_none());
        assert!(resolve_asset_path(root, "/..\\secret").is_none());
    }

    #[test]
    fn maps_content_types() {
        assert_eq!(
            content_type_for(Path::new("index.HTML")),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            content_type_for(Path::new("app.js")),
            "text/javascript; charset=utf-8"
        );
        assert_eq!(
            content_type_for(Path::new("blob")),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn loads_files_and_directory_index() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(dir.path().join("index.html"), b"<h1>home</h1>")
            .expect("index should be written");
        std::fs::create_dir(dir.path().join("about")).expect("subdir should be created");
        std::fs::write(dir.path().join("about").join("index.html"), b"about")
            .expect("nested index should be written");

        let home = load_asset(dir.path(), "/").await.expect("index should load");
        assert_eq!(home.bytes, b"<h1>home</h1>");
        assert_eq!(home.content_type, "text/html; charset=utf-8");

        let about = load_asset(dir.path(), "/about").await.expect("dir index should load");
        assert_eq!(about.bytes, b"about");

        assert!(load_asset(dir.path(), "/missing.css").await.is_none());
    }
}
