//! Conversions between protocol URIs and filesystem paths.

use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::{InitializeParams, Url};

/// The local path behind a `file:` URI. Any other scheme yields `None`.
pub fn uri_to_path(uri: &Url) -> Option<PathBuf> {
    if uri.scheme() != "file" {
        return None;
    }
    uri.to_file_path().ok()
}

/// `file:` URI for an absolute path.
pub fn path_to_uri(path: &Path) -> Option<Url> {
    Url::from_file_path(path).ok()
}

/// Workspace root announced by the client: `rootUri` when present,
/// otherwise the deprecated `rootPath`.
pub fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    if let Some(root_uri) = &params.root_uri {
        return uri_to_path(root_uri);
    }

    #[allow(deprecated)]
    let root_path = params.root_path.as_deref()?;
    match Url::parse(root_path) {
        Ok(uri) => uri_to_path(&uri),
        Err(_) => {
            let path = PathBuf::from(root_path);
            path.is_absolute().then_some(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn test_file_uri_round_trip() {
        let uri = Url::parse("file:///tmp/project/main.py").unwrap();
        let path = uri_to_path(&uri).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/project/main.py"));
        assert_eq!(path_to_uri(&path).unwrap(), uri);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_percent_encoded_uri() {
        let uri = Url::parse("file:///tmp/my%20project/a.py").unwrap();
        assert_eq!(uri_to_path(&uri).unwrap(), PathBuf::from("/tmp/my project/a.py"));
    }

    #[test]
    fn test_non_file_uris_rejected() {
        let http_uri = Url::parse("http://example.com/file.py").unwrap();
        assert!(uri_to_path(&http_uri).is_none());

        let untitled = Url::parse("untitled:Untitled-1").unwrap();
        assert!(uri_to_path(&untitled).is_none());
    }

    #[test]
    fn test_relative_path_has_no_uri() {
        assert!(path_to_uri(Path::new("relative/a.py")).is_none());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_workspace_root_prefers_root_uri() {
        #[allow(deprecated)]
        let params = InitializeParams {
            root_uri: Some(Url::parse("file:///work/a").unwrap()),
            root_path: Some("/work/b".to_string()),
            ..Default::default()
        };
        assert_eq!(workspace_root(&params), Some(PathBuf::from("/work/a")));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_workspace_root_falls_back_to_root_path() {
        #[allow(deprecated)]
        let params = InitializeParams {
            root_path: Some("/work/b".to_string()),
            ..Default::default()
        };
        assert_eq!(workspace_root(&params), Some(PathBuf::from("/work/b")));

        #[allow(deprecated)]
        let params = InitializeParams {
            root_path: Some("file:///work/c".to_string()),
            ..Default::default()
        };
        assert_eq!(workspace_root(&params), Some(PathBuf::from("/work/c")));
    }

    #[test]
    fn test_workspace_root_absent() {
        assert_eq!(workspace_root(&InitializeParams::default()), None);
    }
}
