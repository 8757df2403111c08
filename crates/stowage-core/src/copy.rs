use std::fs;
use std::io;
use std::path::Path;

/// Copy the contents of `src` into `dst`, creating directories as needed.
/// Symlinks are recreated rather than followed on Unix (workspace packages are
/// linked into `node_modules`). Adds the number of copied entries to `count`.
pub fn copy_recursive(src: &Path, dst: &Path, count: &mut usize) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_recursive(&src_path, &dst_path, count)?;
        } else if file_type.is_symlink() {
            copy_symlink(&src_path, &dst_path)?;
            *count += 1;
        } else {
            fs::copy(&src_path, &dst_path)?;
            *count += 1;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let target = fs::read_link(src)?;
    if fs::symlink_metadata(dst).is_ok() {
        fs::remove_file(dst)?;
    }
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        let mut nested = 0;
        copy_recursive(src, dst, &mut nested)
    } else {
        fs::copy(src, dst).map(|_| ())
    }
}

/// Replace `dst` with a copy of the installed modules in `src`.
pub fn move_modules(src: &Path, dst: &Path) -> io::Result<usize> {
    if dst.exists() {
        fs::remove_dir_all(dst)?;
    }
    let mut count = 0;
    if src.is_dir() {
        copy_recursive(src, dst, &mut count)?;
    }
    Ok(count)
}
