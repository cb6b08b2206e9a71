//! Output path construction.
//!
//! The compressed file keeps the source base name with the container
//! extension the resolved codec dictates. A short random disambiguator keeps
//! us from overwriting an existing file at the target path.

use std::path::{Path, PathBuf};

use rand::distr::Alphanumeric;
use rand::Rng;

use crate::codecs::ContainerFamily;
use crate::errors::{PressError, Result};

const DISAMBIGUATOR_LEN: usize = 4;

/// Fresh 4-character random identifier, regenerated on every call.
pub fn disambiguator() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(DISAMBIGUATOR_LEN)
        .map(char::from)
        .collect()
}

/// Candidate output name: source base name with the container's extension.
/// A codec with no container family leaves no extension opinion, so the
/// extension is stripped entirely.
pub fn compress_path(input: &Path, container: Option<ContainerFamily>) -> PathBuf {
    match container {
        Some(family) => input.with_extension(family.extension()),
        None => input.with_extension(""),
    }
}

/// Place the candidate name into the output directory, disambiguating on
/// collision. With `random_filename` the base name is discarded outright and
/// the file is named `<disambiguator><extension>`.
pub fn final_output_path(
    output_dir: &Path,
    compress_path: &Path,
    random_filename: bool,
) -> Result<PathBuf> {
    let file_name = compress_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PressError::Path(compress_path.to_path_buf()))?;

    let stem = compress_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PressError::Path(compress_path.to_path_buf()))?;

    let ext = compress_path.extension().and_then(|e| e.to_str());

    if random_filename {
        let name = match ext {
            Some(ext) => format!("{}.{}", disambiguator(), ext),
            None => disambiguator(),
        };
        return Ok(output_dir.join(name));
    }

    let candidate = output_dir.join(file_name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let name = match ext {
        Some(ext) => format!("{}_{}.{}", stem, disambiguator(), ext),
        None => format!("{}_{}", stem, disambiguator()),
    };
    Ok(output_dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::{resolve, VideoCodec};

    #[test]
    fn test_compress_path_mp4_family() {
        for codec in [VideoCodec::H264, VideoCodec::Hevc] {
            let p = compress_path(Path::new("/videos/clip.mkv"), codec.container());
            assert_eq!(p, PathBuf::from("/videos/clip.mp4"), "{:?}", codec);
        }
    }

    #[test]
    fn test_compress_path_webm_family() {
        for codec in [VideoCodec::Vp8, VideoCodec::Vp9, VideoCodec::Av1] {
            let p = compress_path(Path::new("/videos/clip.mp4"), codec.container());
            assert_eq!(p, PathBuf::from("/videos/clip.webm"), "{:?}", codec);
        }
    }

    #[test]
    fn test_compress_path_no_family_strips_extension() {
        let p = compress_path(Path::new("/videos/clip.mp4"), None);
        assert_eq!(p, PathBuf::from("/videos/clip"));
    }

    #[test]
    fn test_resolved_codec_feeds_container() {
        let resolved = resolve(Some("vp9"));
        let p = compress_path(Path::new("a.mov"), resolved.codec.container());
        assert_eq!(p, PathBuf::from("a.webm"));
    }

    #[test]
    fn test_disambiguator_shape() {
        let d = disambiguator();
        assert_eq!(d.len(), 4);
        assert!(d.chars().all(|c| c.is_ascii_alphanumeric()));
        // Fresh per call; a collision across two draws is astronomically
        // unlikely but not impossible, so only check shape twice.
        assert_eq!(disambiguator().len(), 4);
    }

    #[test]
    fn test_final_output_path_no_collision() {
        let dir = tempfile::tempdir().unwrap();
        let out = final_output_path(dir.path(), Path::new("clip.mp4"), false).unwrap();
        assert_eq!(out, dir.path().join("clip.mp4"));
    }

    #[test]
    fn test_final_output_path_collision_inserts_disambiguator() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"existing").unwrap();

        let out = final_output_path(dir.path(), Path::new("clip.mp4"), false).unwrap();
        let name = out.file_name().unwrap().to_str().unwrap();

        assert_ne!(name, "clip.mp4");
        assert!(name.starts_with("clip_"));
        assert!(name.ends_with(".mp4"));
        // stem + '_' + 4 chars + ".mp4"
        assert_eq!(name.len(), "clip".len() + 1 + 4 + 4);
    }

    #[test]
    fn test_final_output_path_random_filename() {
        let dir = tempfile::tempdir().unwrap();
        // Collision state is ignored entirely in random mode.
        std::fs::write(dir.path().join("clip.mp4"), b"existing").unwrap();

        let out = final_output_path(dir.path(), Path::new("clip.mp4"), true).unwrap();
        let name = out.file_name().unwrap().to_str().unwrap();

        assert_eq!(name.len(), 4 + ".mp4".len());
        assert!(name.ends_with(".mp4"));
        assert!(!name.contains("clip"));
    }

    #[test]
    fn test_final_output_path_random_filename_no_extension() {
        let dir = tempfile::tempdir().unwrap();
        let out = final_output_path(dir.path(), Path::new("clip"), true).unwrap();
        assert_eq!(out.file_name().unwrap().to_str().unwrap().len(), 4);
    }
}
