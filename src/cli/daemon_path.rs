use std::path::PathBuf;

/// The daemon binary is installed next to the cli one.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name("dayflow-daemon");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_is_a_sibling() {
        let path = to_daemon_path(PathBuf::from("/opt/dayflow/bin/dayflow"));
        assert_eq!(path.parent(), Some(std::path::Path::new("/opt/dayflow/bin")));
        assert!(path
            .file_stem()
            .is_some_and(|v| v == "dayflow-daemon"));
    }
}
