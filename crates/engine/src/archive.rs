//! Archival of delivered files.

use std::path::{Path, PathBuf};

use aftcore::WorkArea;

/// Moves a delivered file into the archive tree.
///
/// The destination is `archive/<host_alias>/<job_id>/<name>`; an existing
/// file of the same name gets a numeric suffix instead of being clobbered.
/// Returns the archive path relative to the work-area root, which is what
/// the output log carries.
pub fn archive_file(
    work: &WorkArea,
    host_alias: &str,
    job_id: u32,
    src: &Path,
) -> std::io::Result<PathBuf> {
    let dir = work.archive(host_alias, job_id);
    std::fs::create_dir_all(&dir)?;

    let name = src
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"))?;
    let mut dest = dir.join(name);
    let mut suffix = 0u32;
    while dest.exists() {
        suffix += 1;
        let mut renamed = name.to_os_string();
        renamed.push(format!("-{suffix}"));
        dest = dir.join(renamed);
    }

    std::fs::rename(src, &dest)?;
    Ok(dest
        .strip_prefix(work.root())
        .map(Path::to_path_buf)
        .unwrap_or(dest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archived_file_moves_under_host_and_job() {
        let dir = tempfile::tempdir().expect("tempdir");
        let work = WorkArea::new(dir.path());
        let src = dir.path().join("report.txt");
        std::fs::write(&src, b"data").expect("write");

        let rel = archive_file(&work, "alpha", 4711, &src).expect("archive");
        assert_eq!(rel, Path::new("archive/alpha/4711/report.txt"));
        assert!(!src.exists());
        assert!(dir.path().join(&rel).exists());
    }

    #[test]
    fn name_collisions_get_a_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let work = WorkArea::new(dir.path());
        for round in 0..2 {
            let src = dir.path().join("report.txt");
            std::fs::write(&src, format!("round {round}")).expect("write");
            archive_file(&work, "alpha", 1, &src).expect("archive");
        }
        assert!(dir.path().join("archive/alpha/1/report.txt").exists());
        assert!(dir.path().join("archive/alpha/1/report.txt-1").exists());
    }
}
