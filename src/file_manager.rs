// src/file_manager.rs - motion script files
use std::io;
use std::path::Path;

use tokio::fs;

use crate::script::MotionScript;

/// Read a UTF-8 script, keeping every line as written.
pub async fn read_script<P: AsRef<Path>>(path: P) -> io::Result<MotionScript> {
    let path = path.as_ref();
    tracing::info!("Reading motion script: {}", path.display());
    let content = fs::read_to_string(path).await?;
    let script = MotionScript::from_text(&content);
    tracing::info!("Read {} lines from {}", script.len(), path.display());
    Ok(script)
}

/// Read a script and drop blank and `#` lines, so that comments in the file
/// do not end the run early.
pub async fn read_script_filtered<P: AsRef<Path>>(path: P) -> io::Result<MotionScript> {
    let script = read_script(path).await?.without_comments();
    tracing::debug!("{} command lines after filtering", script.len());
    Ok(script)
}

pub async fn write_script<P: AsRef<Path>>(path: P, script: &MotionScript) -> io::Result<()> {
    let path = path.as_ref();
    tracing::info!("Writing {} lines to {}", script.len(), path.display());
    fs::write(path, script.to_text()).await
}
