// src/export/sink.rs

use crate::config::ExportConfig;
use crate::export::ExportError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// Delay applied to the audio track so it lines up with the first frame
const AUDIO_OFFSET: &str = "0.21";

/// Destination of finished frames, fed top row first as BGRA bytes
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ExportError>;

    /// Flush and close; no frames may follow
    fn finish(&mut self) -> Result<(), ExportError>;
}

fn check_frame_len(frame: &[u8], width: u32, height: u32) -> Result<(), ExportError> {
    let expected = width as usize * height as usize * 4;
    if frame.len() != expected {
        return Err(ExportError::FrameSize {
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

/// Encoder command line for a raw BGRA stream on stdin
pub fn ffmpeg_args(export: &ExportConfig, width: u32, height: u32, fps: u32) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "bgra".into(),
        "-s".into(),
        format!("{}x{}", width, height),
        "-r".into(),
        fps.to_string(),
        "-i".into(),
        "-".into(),
    ];
    if export.include_audio {
        args.extend([
            "-itsoffset".into(),
            AUDIO_OFFSET.into(),
            "-i".into(),
            export.audio_path.clone(),
        ]);
    }
    args.extend(["-vcodec".into(), "libx264".into()]);
    if export.include_audio {
        args.extend(["-acodec".into(), "aac".into()]);
    }
    if export.use_bitrate {
        let rate = format!("{}k", export.bitrate_kbps);
        args.extend([
            "-b:v".into(),
            rate.clone(),
            "-maxrate".into(),
            rate.clone(),
            "-minrate".into(),
            rate,
        ]);
    } else {
        args.extend([
            "-preset".into(),
            export.crf_preset.clone(),
            "-crf".into(),
            export.crf.to_string(),
        ]);
    }
    args.extend(["-y".into(), export.output_path.clone()]);
    args
}

/// Pipes frames into an external encoder process
pub struct FfmpegSink {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
}

impl FfmpegSink {
    pub fn spawn(
        export: &ExportConfig,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Self, ExportError> {
        let args = ffmpeg_args(export, width, height, fps);
        log::info!("Starting encoder: {} {}", export.ffmpeg_path, args.join(" "));
        let mut child = Command::new(&export.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|source| ExportError::Spawn {
                program: export.ffmpeg_path.clone(),
                source,
            })?;
        let stdin = child.stdin.take();
        Ok(FfmpegSink {
            child,
            stdin,
            width,
            height,
        })
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ExportError> {
        check_frame_len(frame, self.width, self.height)?;
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            ExportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder input already closed",
            ))
        })?;
        stdin.write_all(frame)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        // closing stdin is the encoder's end-of-stream
        drop(self.stdin.take());
        let status = self.child.wait()?;
        if !status.success() {
            return Err(ExportError::Encoder(status));
        }
        log::info!("Encoder finished");
        Ok(())
    }
}

/// Swap the red and blue channels of every pixel
pub fn bgra_to_rgba(bgra: &[u8], rgba: &mut Vec<u8>) {
    rgba.clear();
    rgba.reserve(bgra.len());
    for px in bgra.chunks_exact(4) {
        rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
    }
}

/// Writes `img_<n>.png` files, counting from zero
pub struct ImageSequenceSink {
    dir: PathBuf,
    width: u32,
    height: u32,
    next_index: u64,
    scratch: Vec<u8>,
}

impl ImageSequenceSink {
    pub fn new(dir: impl AsRef<Path>, width: u32, height: u32) -> Result<Self, ExportError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        log::info!("Writing frames to {}", dir.display());
        Ok(ImageSequenceSink {
            dir,
            width,
            height,
            next_index: 0,
            scratch: Vec::new(),
        })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("img_{}.png", index))
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ExportError> {
        check_frame_len(frame, self.width, self.height)?;
        let mut rgba = std::mem::take(&mut self.scratch);
        bgra_to_rgba(frame, &mut rgba);
        let expected = rgba.len();
        let image = image::RgbaImage::from_raw(self.width, self.height, rgba).ok_or(
            ExportError::FrameSize {
                expected,
                actual: frame.len(),
            },
        )?;
        image.save_with_format(self.frame_path(self.next_index), image::ImageFormat::Png)?;
        self.scratch = image.into_raw();
        self.next_index += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        log::info!("Wrote {} frames to {}", self.next_index, self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("notefall-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_ffmpeg_args_crf() {
        let export = ExportConfig {
            output_path: "out.mp4".to_string(),
            ..ExportConfig::default()
        };
        let args = ffmpeg_args(&export, 1280, 720, 60);
        let line = args.join(" ");
        assert!(line.starts_with("-f rawvideo -pix_fmt bgra -s 1280x720 -r 60 -i -"));
        assert!(line.contains("-vcodec libx264 -preset medium -crf 17"));
        assert!(line.ends_with("-y out.mp4"));
        assert!(!line.contains("vflip"));
        assert!(!line.contains("-acodec"));
    }

    #[test]
    fn test_ffmpeg_args_bitrate_and_audio() {
        let export = ExportConfig {
            include_audio: true,
            audio_path: "song.wav".to_string(),
            use_bitrate: true,
            bitrate_kbps: 8000,
            ..ExportConfig::default()
        };
        let line = ffmpeg_args(&export, 640, 480, 30).join(" ");
        assert!(line.contains("-i - -itsoffset 0.21 -i song.wav -vcodec libx264 -acodec aac"));
        assert!(line.contains("-b:v 8000k -maxrate 8000k -minrate 8000k"));
        assert!(!line.contains("-crf"));
    }

    #[test]
    fn test_missing_encoder_is_a_spawn_error() {
        let export = ExportConfig {
            ffmpeg_path: "notefall-no-such-encoder".to_string(),
            ..ExportConfig::default()
        };
        match FfmpegSink::spawn(&export, 4, 4, 60) {
            Err(ExportError::Spawn { program, .. }) => {
                assert_eq!(program, "notefall-no-such-encoder")
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[test]
    fn test_bgra_to_rgba() {
        let mut out = Vec::new();
        bgra_to_rgba(&[1, 2, 3, 4, 5, 6, 7, 8], &mut out);
        assert_eq!(out, vec![3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn test_image_sequence_numbering_and_channels() {
        let dir = temp_dir("images");
        let mut sink = ImageSequenceSink::new(&dir, 2, 1).unwrap();
        // blue then red, in BGRA
        sink.write_frame(&[255, 0, 0, 255, 0, 0, 255, 255]).unwrap();
        sink.write_frame(&[0; 8]).unwrap();
        sink.finish().unwrap();

        assert!(dir.join("img_0.png").exists());
        assert!(dir.join("img_1.png").exists());
        let first = image::open(dir.join("img_0.png")).unwrap().to_rgba8();
        assert_eq!(first.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(first.get_pixel(1, 0).0, [255, 0, 0, 255]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_wrong_frame_size_is_rejected() {
        let dir = temp_dir("size");
        let mut sink = ImageSequenceSink::new(&dir, 2, 2).unwrap();
        assert!(matches!(
            sink.write_frame(&[0; 4]),
            Err(ExportError::FrameSize {
                expected: 16,
                actual: 4
            })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
