use crate::codec::{INPUT_PATH, output_path};

/// Audio is always re-encoded to AAC in MP4 mode; video passes through.
const AUDIO_CODEC: &str = "aac";

/// Fragment duration for the fragmented-MP4 layout used with non-seekable
/// sinks, in the muxer's time-base units.
const FRAGMENT_DURATION: &str = "100000";

/// GIF output runs at a fixed frame rate with infinite looping.
const GIF_FRAME_RATE: &str = "15";

/// Kept short to cut startup latency for short recordings, at the cost of
/// stream-analysis accuracy.
const ANALYZE_DURATION: &str = "1";

/// Decoder- and encoder-side argument lists for one target container
/// format, assembled into a full command line by `command()`.
#[derive(Clone, Debug)]
pub struct ProcessorArgs {
    decoder_args: Vec<String>,
    encoder_args: Vec<String>,
    output_extension: &'static str,
}

impl ProcessorArgs {
    pub fn output_extension(&self) -> &str {
        self.output_extension
    }

    pub fn output_path(&self) -> String {
        output_path(self.output_extension)
    }

    /// The full command line: global flags (errors-only logging,
    /// non-interactive, overwrite permitted), decoder args, the fixed input
    /// path, encoder args, the output path.
    pub fn command(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-nostdin",
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-analyzeduration",
            ANALYZE_DURATION,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(self.decoder_args.iter().cloned());
        args.push("-i".to_string());
        args.push(INPUT_PATH.to_string());
        args.extend(self.encoder_args.iter().cloned());
        args.push(self.output_path());
        args
    }
}

/// MP4 remux: Matroska in, video copied through byte-identical, audio
/// transcoded to AAC, rotation written as stream metadata.
///
/// With a non-seekable sink the muxer may never revisit the header, so the
/// output is marked non-seekable and switched to a fragmented layout that
/// can be written strictly sequentially.
pub fn mp4_args(video_rotation: i32, seekable: bool) -> ProcessorArgs {
    let mut encoder_args = string_args(&["-c:v", "copy", "-c:a", AUDIO_CODEC]);
    encoder_args.push("-metadata:s:v:0".to_string());
    encoder_args.push(format!("rotate={video_rotation}"));
    if !seekable {
        encoder_args.extend(string_args(&[
            "-seekable",
            "0",
            "-movflags",
            "frag_keyframe",
            "-frag_duration",
            FRAGMENT_DURATION,
        ]));
    }
    ProcessorArgs {
        decoder_args: string_args(&["-f", "matroska"]),
        encoder_args,
        output_extension: "mp4",
    }
}

/// GIF encode from a raw RGBA frame stream of exactly `width * height * 4`
/// bytes per frame, at a fixed 15 fps with infinite looping.
pub fn gif_args(width: u32, height: u32) -> ProcessorArgs {
    ProcessorArgs {
        decoder_args: vec![
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgba".to_string(),
            "-s".to_string(),
            format!("{width}x{height}"),
            "-framerate".to_string(),
            GIF_FRAME_RATE.to_string(),
        ],
        encoder_args: string_args(&["-r", GIF_FRAME_RATE, "-loop", "0"]),
        output_extension: "gif",
    }
}

/// Time-lapse MP4: raw H.264 elementary stream in at a forced frame rate,
/// video copied through, audio disabled, rotation written as stream
/// metadata.
pub fn time_lapse_args(video_rotation: i32, frame_rate: u32) -> ProcessorArgs {
    ProcessorArgs {
        decoder_args: vec![
            "-r".to_string(),
            frame_rate.to_string(),
            "-f".to_string(),
            "h264".to_string(),
        ],
        encoder_args: vec![
            "-c:v".to_string(),
            "copy".to_string(),
            "-an".to_string(),
            "-metadata:s:v:0".to_string(),
            format!("rotate={video_rotation}"),
        ],
        output_extension: "mp4",
    }
}

fn string_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
#[path = "args_test.rs"]
mod args_test;
