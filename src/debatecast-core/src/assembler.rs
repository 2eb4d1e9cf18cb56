//! Audio assembly via ffmpeg.
//!
//! Concatenates per-block audio segments into one program with a fixed
//! silence gap between spoken segments, then probes the result for its
//! duration. The concat demuxer needs uniform codec parameters, so the
//! default path re-encodes to a fixed sample rate and bitrate;
//! `lossless_concat` switches to `-c copy` for segments that already
//! match.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::AssemblyConfig;
use crate::error::PipelineError;
use crate::turns::Speaker;

/// One synthesized audio file, consumed exactly once by assembly.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub file_path: PathBuf,
    pub speaker: Speaker,
    pub turn: u32,
    pub sequence_index: usize,
}

/// External audio-concatenation tooling.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Concatenate `segments` in order with `silence_seconds` of
    /// silence between them (none after the last), writing the merged
    /// audio to `output`. Returns the merged duration in seconds; an
    /// unreadable duration degrades to 0.0 rather than failing.
    ///
    /// Scratch files (silence clip, concat manifest) live in
    /// `work_dir`; segments and scratch files are deleted after a
    /// successful merge.
    async fn assemble(
        &self,
        segments: &[AudioSegment],
        silence_seconds: f64,
        work_dir: &Path,
        output: &Path,
    ) -> Result<f64, PipelineError>;
}

/// ffmpeg/ffprobe-backed assembler.
pub struct FfmpegAssembler {
    config: AssemblyConfig,
}

impl FfmpegAssembler {
    pub fn new(config: AssemblyConfig) -> Self {
        Self { config }
    }

    /// Generate the reusable silence clip.
    async fn write_silence(&self, path: &Path, seconds: f64) -> Result<(), PipelineError> {
        let source = format!("anullsrc=r={}:cl=mono", self.config.sample_rate);
        let out = Command::new("ffmpeg")
            .args(["-f", "lavfi", "-i", &source])
            .args(["-t", &format!("{}", seconds)])
            .args(["-q:a", "9", "-acodec", "libmp3lame"])
            .arg(path)
            .output()
            .await
            .map_err(|e| PipelineError::Assembly(format!("failed to run ffmpeg: {}", e)))?;

        if !out.status.success() {
            return Err(PipelineError::Assembly(format!(
                "silence generation failed: {}",
                String::from_utf8_lossy(&out.stderr)
            )));
        }
        Ok(())
    }

    /// Run the concat demuxer over the manifest.
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<(), PipelineError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-f", "concat", "-safe", "0", "-i"]).arg(manifest);
        for arg in codec_args(&self.config) {
            cmd.arg(arg);
        }
        cmd.arg(output);

        let out = cmd
            .output()
            .await
            .map_err(|e| PipelineError::Assembly(format!("failed to run ffmpeg: {}", e)))?;

        if !out.status.success() {
            return Err(PipelineError::Assembly(format!(
                "concat failed: {}",
                String::from_utf8_lossy(&out.stderr)
            )));
        }
        Ok(())
    }

    /// Probe the merged file's duration. Non-fatal: duration is
    /// metadata, not playable content.
    async fn probe_duration(&self, path: &Path) -> f64 {
        let out = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await;

        match out {
            Ok(out) if out.status.success() => {
                parse_probe_duration(&String::from_utf8_lossy(&out.stdout)).unwrap_or_else(|| {
                    warn!(path = %path.display(), "unparseable ffprobe output, duration unknown");
                    0.0
                })
            }
            _ => {
                warn!(path = %path.display(), "ffprobe failed, duration unknown");
                0.0
            }
        }
    }
}

#[async_trait]
impl AudioBackend for FfmpegAssembler {
    async fn assemble(
        &self,
        segments: &[AudioSegment],
        silence_seconds: f64,
        work_dir: &Path,
        output: &Path,
    ) -> Result<f64, PipelineError> {
        if segments.is_empty() {
            return Err(PipelineError::Assembly(
                "no audio segments to merge".to_string(),
            ));
        }
        for segment in segments {
            if !segment.file_path.exists() {
                return Err(PipelineError::Assembly(format!(
                    "missing audio segment: {}",
                    segment.file_path.display()
                )));
            }
        }

        let silence_path = work_dir.join("silence.mp3");
        self.write_silence(&silence_path, silence_seconds).await?;

        let manifest_path = work_dir.join("files.txt");
        let manifest = build_manifest(segments, &silence_path);
        debug!(manifest = %manifest, "concat manifest");
        tokio::fs::write(&manifest_path, &manifest).await?;

        self.concat(&manifest_path, output).await?;
        if !output.exists() {
            return Err(PipelineError::Assembly(
                "ffmpeg reported success but produced no output file".to_string(),
            ));
        }

        let duration = self.probe_duration(output).await;

        // Scratch files are only removed once the merge succeeded; the
        // orchestrator removes the whole run directory on failure.
        for segment in segments {
            let _ = tokio::fs::remove_file(&segment.file_path).await;
        }
        let _ = tokio::fs::remove_file(&silence_path).await;
        let _ = tokio::fs::remove_file(&manifest_path).await;

        Ok(duration)
    }
}

/// Ordered concat manifest: segment, silence, segment, ..., segment.
/// No trailing silence after the last segment.
pub fn build_manifest(segments: &[AudioSegment], silence_path: &Path) -> String {
    let mut lines = Vec::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            lines.push(format!("file '{}'", manifest_path(silence_path)));
        }
        lines.push(format!("file '{}'", manifest_path(&segment.file_path)));
    }
    lines.join("\n") + "\n"
}

/// ffmpeg's concat demuxer wants forward slashes even on Windows.
fn manifest_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

/// Output codec arguments for the concat step.
fn codec_args(config: &AssemblyConfig) -> Vec<String> {
    if config.lossless_concat {
        vec!["-c".to_string(), "copy".to_string()]
    } else {
        vec![
            "-ar".to_string(),
            config.sample_rate.to_string(),
            "-b:a".to_string(),
            config.bitrate.clone(),
            "-acodec".to_string(),
            "libmp3lame".to_string(),
        ]
    }
}

fn parse_probe_duration(stdout: &str) -> Option<f64> {
    stdout.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(i: usize, name: &str) -> AudioSegment {
        AudioSegment {
            file_path: PathBuf::from(format!("/tmp/run/{}", name)),
            speaker: if i % 2 == 0 { Speaker::Against } else { Speaker::For },
            turn: (i / 2 + 1) as u32,
            sequence_index: i,
        }
    }

    #[test]
    fn test_manifest_inserts_silence_between_segments_only() {
        let segments = vec![
            segment(0, "against_turn_1.mp3"),
            segment(1, "for_turn_1.mp3"),
            segment(2, "against_turn_2.mp3"),
        ];
        let manifest = build_manifest(&segments, Path::new("/tmp/run/silence.mp3"));
        let lines: Vec<&str> = manifest.trim_end().lines().collect();

        assert_eq!(lines.len(), 5); // 3 segments + 2 silences
        let silences = lines.iter().filter(|l| l.contains("silence.mp3")).count();
        assert_eq!(silences, segments.len() - 1);
        assert!(lines.first().unwrap().contains("against_turn_1.mp3"));
        assert!(
            lines.last().unwrap().contains("against_turn_2.mp3"),
            "no trailing silence after the last segment"
        );
    }

    #[test]
    fn test_manifest_single_segment_has_no_silence() {
        let segments = vec![segment(0, "only.mp3")];
        let manifest = build_manifest(&segments, Path::new("/tmp/run/silence.mp3"));
        assert!(!manifest.contains("silence.mp3"));
        assert_eq!(manifest.trim_end().lines().count(), 1);
    }

    #[test]
    fn test_codec_args_reencode_default() {
        let args = codec_args(&AssemblyConfig::default());
        assert!(args.contains(&"libmp3lame".to_string()));
        assert!(args.contains(&"44100".to_string()));
        assert!(!args.contains(&"copy".to_string()));
    }

    #[test]
    fn test_codec_args_lossless() {
        let config = AssemblyConfig {
            lossless_concat: true,
            ..AssemblyConfig::default()
        };
        assert_eq!(codec_args(&config), vec!["-c", "copy"]);
    }

    #[test]
    fn test_parse_probe_duration() {
        assert_eq!(parse_probe_duration("12.345\n"), Some(12.345));
        assert_eq!(parse_probe_duration("garbage"), None);
        assert_eq!(parse_probe_duration(""), None);
    }

    #[tokio::test]
    async fn test_assemble_rejects_missing_segment() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = FfmpegAssembler::new(AssemblyConfig::default());
        let segments = vec![AudioSegment {
            file_path: dir.path().join("does_not_exist.mp3"),
            speaker: Speaker::Against,
            turn: 1,
            sequence_index: 0,
        }];
        let err = assembler
            .assemble(&segments, 1.0, dir.path(), &dir.path().join("out.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Assembly(_)));
    }

    #[tokio::test]
    async fn test_assemble_rejects_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = FfmpegAssembler::new(AssemblyConfig::default());
        let err = assembler
            .assemble(&[], 1.0, dir.path(), &dir.path().join("out.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Assembly(_)));
    }
}
