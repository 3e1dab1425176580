use std::path::{Path, PathBuf};

/// Resolves a peer-supplied file name to a path inside `downloads_dir`,
/// discarding any directory components the name carries. Without this, a
/// peer naming a file `../../etc/passwd` (or an absolute path) could
/// write outside the downloads directory.
pub fn safe_download_path(downloads_dir: &Path, file_name: &str) -> PathBuf {
    let base = Path::new(file_name)
        .file_name()
        .filter(|name| !name.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download.bin"));
    downloads_dir.join(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_parent_directory_traversal() {
        let dir = Path::new("/home/user/Downloads/la-vak");
        let path = safe_download_path(dir, "../../etc/passwd");
        assert_eq!(path, dir.join("passwd"));
    }

    #[test]
    fn strips_absolute_paths() {
        let dir = Path::new("/home/user/Downloads/la-vak");
        let path = safe_download_path(dir, "/etc/shadow");
        assert_eq!(path, dir.join("shadow"));
    }

    #[test]
    fn falls_back_for_an_empty_or_dot_name() {
        let dir = Path::new("/home/user/Downloads/la-vak");
        assert_eq!(safe_download_path(dir, ".."), dir.join("download.bin"));
        assert_eq!(safe_download_path(dir, "/"), dir.join("download.bin"));
    }

    #[test]
    fn keeps_an_ordinary_file_name() {
        let dir = Path::new("/home/user/Downloads/la-vak");
        assert_eq!(safe_download_path(dir, "photo.jpg"), dir.join("photo.jpg"));
    }
}
