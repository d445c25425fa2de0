//! CLI command implementations.

pub(crate) mod normalize;
pub(crate) mod render;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub(crate) use normalize::NormalizeArgs;
pub(crate) use render::RenderArgs;

/// Read markdown from `path`, or from stdin when it is absent or `-`.
///
/// Returns the text and the path it was read from.
fn read_input(path: Option<&Path>) -> std::io::Result<(String, Option<PathBuf>)> {
    match path {
        Some(path) if path != Path::new("-") => {
            Ok((std::fs::read_to_string(path)?, Some(path.to_path_buf())))
        }
        _ => {
            let mut content = String::new();
            std::io::stdin().read_to_string(&mut content)?;
            Ok((content, None))
        }
    }
}

/// Write `text` to stdout followed by a newline.
fn write_stdout(text: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.write_all(b"\n")?;
    stdout.flush()
}
