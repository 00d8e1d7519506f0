use std::{
    fs::{self, File},
    io::Write,
    path::Path,
};

use log::debug;

//////////////////////////////////////////////////////////
// I/O
//////////////////////////////////////////////////////////
/// Writes the rendered map next to `path` first and renames it into place,
/// so a viewer polling the file never reads half a document.
pub fn write_map(path: &Path, svg: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let tmp = path.with_extension("svg.tmp");
    let mut file = File::options()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(svg.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;

    debug!("Map written to {}", path.display());
    Ok(())
}
