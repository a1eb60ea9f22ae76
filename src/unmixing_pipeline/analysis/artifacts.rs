//! Artifact directory layout and writing.
//!
//! Every run for a session writes into the same `processed_<session>`
//! directory. File names depend only on chromophore symbols and the writer's
//! extension, so a re-run overwrites the previous files; rasters left over
//! from an earlier run that this run did not produce are pruned. A raster
//! that fails to write leaves the previous run's file in place.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};
use tracing::{debug, instrument, warn};

use crate::unmixing_pipeline::analysis::render::{render_contours, render_map, render_mask};
use crate::unmixing_pipeline::analysis::types::{AnalysisResult, ArtifactSet};
use crate::unmixing_pipeline::analysis::writer::ArtifactWriter;
use crate::unmixing_pipeline::common::error::{Result, UnmixingError};
use crate::unmixing_pipeline::segmentation::Segmentation;
use crate::unmixing_pipeline::spectral::ConcentrationMaps;

pub const THB_ARTIFACT: &str = "thb_map";
pub const MASK_ARTIFACT: &str = "mask_otsu";
pub const CONTOUR_ARTIFACT: &str = "contour";
pub const MANIFEST_FILE: &str = "result.json";

const RASTER_EXTENSIONS: [&str; 3] = ["png", "tif", "tiff"];

/// Makes a chromophore symbol or session id safe to use as a file name.
pub fn sanitize_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

/// Directory name for a session's artifacts, `processed_<session>`.
pub fn session_directory_name(session_id: &str) -> String {
    format!("processed_{}", sanitize_name(session_id))
}

pub fn run_directory(output_root: &Path, session_id: &str) -> PathBuf {
    output_root.join(session_directory_name(session_id))
}

/// Rasters written by one run plus the failures met on the way.
#[derive(Debug, Clone)]
pub struct ArtifactReport {
    pub artifacts: ArtifactSet,
    pub errors: Vec<String>,
}

enum Raster<'a> {
    Gray(&'a GrayImage),
    Rgb(&'a RgbImage),
}

fn output_error(path: &Path, e: std::io::Error) -> UnmixingError {
    UnmixingError::OutputWriteError(format!("{}: {}", path.display(), e))
}

/// Encodes in memory, writes a sibling `.partial` file and renames it over
/// `path`. The previous file at `path` is untouched unless every step succeeds.
fn write_raster<W: ArtifactWriter + ?Sized>(writer: &W, raster: Raster<'_>, path: &Path) -> Result<()> {
    let mut encoded = Vec::new();
    match raster {
        Raster::Gray(image) => writer.write_gray(image, &mut encoded)?,
        Raster::Rgb(image) => writer.write_rgb(image, &mut encoded)?,
    }

    let mut staging = path.as_os_str().to_owned();
    staging.push(".partial");
    let staging = PathBuf::from(staging);
    let staged = fs::write(&staging, &encoded).and_then(|()| fs::rename(&staging, path));
    if let Err(e) = staged {
        let _ = fs::remove_file(&staging);
        return Err(output_error(path, e));
    }
    Ok(())
}

/// Case-insensitive file name, so two targets that would land on the same
/// file on a case-folding file system are treated as one.
fn collision_key(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Writes the per-chromophore maps, the normalized THb map, the lesion mask
/// and the contour overlay into `run_dir`.
///
/// Never fails: every problem is collected into [`ArtifactReport::errors`]
/// and the corresponding path is left out of the artifact set.
#[instrument(skip_all, fields(run_dir = %run_dir.display()))]
pub fn save_rasters<W: ArtifactWriter + ?Sized>(
    writer: &W,
    run_dir: &Path,
    maps: &ConcentrationMaps,
    segmentation: &Segmentation,
) -> ArtifactReport {
    let mut artifacts = ArtifactSet::new(run_dir.to_path_buf());
    let mut errors = Vec::new();

    if let Err(e) = fs::create_dir_all(run_dir) {
        let message = format!("cannot create {}: {}", run_dir.display(), e);
        warn!("{}", message);
        errors.push(message);
        return ArtifactReport { artifacts, errors };
    }

    let extension = writer.extension();
    let path_for = |stem: &str| run_dir.join(format!("{}.{}", stem, extension));
    let thb_path = path_for(THB_ARTIFACT);
    let mask_path = path_for(MASK_ARTIFACT);
    let contour_path = path_for(CONTOUR_ARTIFACT);

    let mut claimed: HashMap<String, String> = [
        (&thb_path, "THb map"),
        (&mask_path, "lesion mask"),
        (&contour_path, "contour overlay"),
    ]
    .into_iter()
    .map(|(path, owner)| (collision_key(path), owner.to_string()))
    .collect();

    let mut produced: HashSet<PathBuf> = HashSet::new();
    let mut attempt = |raster: Raster<'_>, path: PathBuf, errors: &mut Vec<String>| -> Option<PathBuf> {
        produced.insert(path.clone());
        match write_raster(writer, raster, &path) {
            Ok(()) => {
                debug!(path = %path.display(), "Artifact written");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), "Artifact write failed: {}", e);
                errors.push(format!("{}: {}", path.display(), e));
                None
            }
        }
    };

    for (symbol, map) in maps.iter() {
        let path = path_for(&sanitize_name(symbol));
        let key = collision_key(&path);
        if let Some(owner) = claimed.get(&key) {
            let message = format!(
                "{}: map for '{}' skipped, file name already used by {}",
                path.display(),
                symbol,
                owner
            );
            warn!("{}", message);
            errors.push(message);
            continue;
        }
        claimed.insert(key, format!("map for '{}'", symbol));

        let image = render_map(map);
        if let Some(path) = attempt(Raster::Gray(&image), path, &mut errors) {
            artifacts.chromophore_maps.insert(symbol.to_string(), path);
        }
    }

    artifacts.thb_path = attempt(Raster::Gray(&segmentation.normalized), thb_path, &mut errors);

    let mask = render_mask(&segmentation.lesion);
    artifacts.mask_path = attempt(Raster::Gray(&mask), mask_path, &mut errors);

    let overlay = render_contours(&segmentation.normalized, &segmentation.lesion);
    artifacts.contour_path = attempt(Raster::Rgb(&overlay), contour_path, &mut errors);

    if let Err(e) = prune_stale(run_dir, &produced) {
        warn!("Pruning stale artifacts failed: {}", e);
        errors.push(format!("pruning {}: {}", run_dir.display(), e));
    }

    ArtifactReport { artifacts, errors }
}

/// Removes rasters in `run_dir` that are not in `keep`.
pub fn prune_stale(run_dir: &Path, keep: &HashSet<PathBuf>) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(run_dir)? {
        let path = entry?.path();
        let is_raster = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| RASTER_EXTENSIONS.iter().any(|r| e.eq_ignore_ascii_case(r)));
        if is_raster && path.is_file() && !keep.contains(&path) {
            fs::remove_file(&path)?;
            debug!(path = %path.display(), "Stale artifact removed");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Serializes `result` as pretty JSON to `path`.
pub fn write_manifest(result: &AnalysisResult, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(result)
        .map_err(|e| UnmixingError::EncodeError(format!("manifest: {}", e)))?;
    fs::write(path, json).map_err(|e| output_error(path, e))
}
