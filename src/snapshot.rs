//! Capture one frame and optionally save it

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::capture::{Acquisition, FrameSource, PollPolicy};
use crate::error::{Error, Result};
use crate::save::{check_rgba_len, FrameSaver};

pub const CONFIG_SUFFIX: &str = ".toml";
pub const IMAGE_SUFFIX: &str = ".png";
pub const DEFAULT_OUTPUT: &str = "snapshot.png";

/// Result of a snapshot run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Saved {
        path: PathBuf,
        width: u32,
        height: u32,
    },
    /// A frame was captured but no saver was available
    Skipped { width: u32, height: u32 },
}

/// Start `camera`, wait for its first frame, hand it to `saver` (if any) and
/// stop the camera. The camera is stopped on every exit path.
#[instrument(skip(camera, saver), fields(save = saver.is_some()))]
pub fn capture_snapshot<C: FrameSource + ?Sized>(
    camera: &mut C,
    saver: Option<&dyn FrameSaver>,
    output: &Path,
    policy: &PollPolicy,
) -> Result<Snapshot> {
    let acquisition = Acquisition::start(camera)?;
    let data = acquisition.wait_for_frame(policy)?;

    let width = acquisition.camera().width();
    let height = acquisition.camera().height();

    let snapshot = match saver {
        Some(saver) => {
            check_rgba_len(&data, width, height)?;
            saver.save_rgba(&data, width, height, output)?;
            info!("Saved {}x{} frame to {}", width, height, output.display());
            Snapshot::Saved {
                path: output.to_path_buf(),
                width,
                height,
            }
        }
        None => {
            info!("No image saver available, skipping save");
            Snapshot::Skipped { width, height }
        }
    };

    acquisition.finish()?;
    Ok(snapshot)
}

/// Replace a trailing `suffix` with `replacement`. Case-sensitive; a path
/// without the suffix comes back unchanged.
pub fn replace_suffix(path: &str, suffix: &str, replacement: &str) -> String {
    match path.strip_suffix(suffix) {
        Some(stem) => format!("{}{}", stem, replacement),
        None => path.to_string(),
    }
}

/// Image path next to a config file: `snap.toml` -> `snap.png`
pub fn derive_output_path(config_path: &Path) -> Result<PathBuf> {
    let source = config_path
        .to_str()
        .ok_or_else(|| Error::OutputCollision(config_path.to_path_buf()))?;
    let derived = replace_suffix(source, CONFIG_SUFFIX, IMAGE_SUFFIX);
    if derived == source {
        return Err(Error::OutputCollision(config_path.to_path_buf()));
    }
    Ok(PathBuf::from(derived))
}

/// Pick the output path: explicit path, else derived from the config file,
/// else [`DEFAULT_OUTPUT`].
pub fn resolve_output_path(explicit: Option<&Path>, config_path: Option<&Path>) -> Result<PathBuf> {
    match (explicit, config_path) {
        (Some(path), _) => Ok(path.to_path_buf()),
        (None, Some(config_path)) => derive_output_path(config_path),
        (None, None) => Ok(PathBuf::from(DEFAULT_OUTPUT)),
    }
}
