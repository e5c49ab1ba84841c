use std::fs;
use std::path::Path;

use crate::error::Result;

/// Reserved line binding chunk manifest files to this filter.
pub const CDC_FILTER_LINE: &str = "/.cdc/**/*.cdc binary filter=git_fastcdc";

/// Reserved line keeping the attributes file itself out of every filter.
pub const ATTR_SELF_LINE: &str = "/.gitattributes text -binary -filter";

/// Token identifying attribute lines bound to this filter.
pub const FILTER_TOKEN: &str = "filter=git_fastcdc";

/// Ensure the attributes file exists and ends with the two reserved
/// lines, stripping any earlier copies first. User lines are preserved
/// verbatim; running this twice is a no-op.
pub fn append_reserved(path: &Path) -> Result<()> {
    let mut out = without_reserved(&read_or_empty(path)?);
    out.push_str(CDC_FILTER_LINE);
    out.push('\n');
    out.push_str(ATTR_SELF_LINE);
    out.push('\n');
    fs::write(path, out)?;
    Ok(())
}

/// Remove the two reserved lines, leaving everything else untouched.
pub fn strip_reserved(path: &Path) -> Result<()> {
    let out = without_reserved(&read_or_empty(path)?);
    fs::write(path, out)?;
    Ok(())
}

fn without_reserved(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        if !line.contains(CDC_FILTER_LINE) && !line.contains(ATTR_SELF_LINE) {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

fn read_or_empty(path: &Path) -> Result<String> {
    if path.exists() {
        Ok(fs::read_to_string(path)?)
    } else {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr_file(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".gitattributes");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn append_creates_the_file_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".gitattributes");
        append_reserved(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{CDC_FILTER_LINE}\n{ATTR_SELF_LINE}\n"));
    }

    #[test]
    fn append_is_idempotent_and_keeps_user_lines() {
        let (_dir, path) = attr_file("*.psd filter=lfs\n*.mp4 filter=git_fastcdc\n");
        append_reserved(&path).unwrap();
        let once = fs::read_to_string(&path).unwrap();
        append_reserved(&path).unwrap();
        let twice = fs::read_to_string(&path).unwrap();

        assert_eq!(once, twice);
        assert!(once.starts_with("*.psd filter=lfs\n*.mp4 filter=git_fastcdc\n"));
        assert!(once.ends_with(&format!("{CDC_FILTER_LINE}\n{ATTR_SELF_LINE}\n")));
    }

    #[test]
    fn strip_removes_only_the_reserved_lines() {
        let (_dir, path) = attr_file(&format!(
            "*.bin filter=git_fastcdc\n{CDC_FILTER_LINE}\n{ATTR_SELF_LINE}\n"
        ));
        strip_reserved(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "*.bin filter=git_fastcdc\n"
        );
    }
}
