//! Transcoder command-line construction.
//!
//! [`build_transcoder_args`] is a pure function of the channel, the resolved
//! input and the output settings: the same inputs always produce the same
//! argument vector, which the supervisor compares and logs by length only.

use std::path::Path;

use crate::channel::{BitrateConfig, Channel, EncodingMode, Variant};
use crate::config::HlsOutputConfig;
use crate::keys::KEY_INFO_FILE_NAME;

pub const MEDIA_PLAYLIST_NAME: &str = "stream.m3u8";
pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";
pub const SEGMENT_PATTERN: &str = "seg_%05d.ts";

/// Subdirectory placeholder the HLS muxer expands to each variant's name.
const VARIANT_DIR: &str = "%v";

struct Args(Vec<String>);

impl Args {
    fn push(&mut self, arg: impl Into<String>) -> &mut Self {
        self.0.push(arg.into());
        self
    }

    fn pair(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.push(flag).push(value)
    }
}

/// Build the full argument vector (without the program name) for one channel.
pub fn build_transcoder_args(
    channel: &Channel,
    input: &str,
    segment_root: &Path,
    hls: &HlsOutputConfig,
) -> Vec<String> {
    let dir = channel.output_dir(segment_root);
    let mut args = Args(Vec::with_capacity(64));

    args.push("-hide_banner")
        .pair("-loglevel", "warning")
        .push("-nostdin")
        .push("-y");
    if is_http(input) {
        args.pair("-reconnect", "1")
            .pair("-reconnect_streamed", "1")
            .pair("-reconnect_delay_max", "5");
    }
    args.pair("-i", input);

    let bitrate = &channel.bitrate;
    match (bitrate.mode, bitrate.variants.as_slice()) {
        (EncodingMode::Transcode, [variant]) => single_variant(&mut args, *variant, hls),
        (EncodingMode::Transcode, variants) if !variants.is_empty() => {
            multi_variant(&mut args, variants, hls)
        }
        _ => passthrough(&mut args),
    }

    hls_output(&mut args, bitrate, &dir, hls);
    args.0
}

fn is_http(input: &str) -> bool {
    let lower = input.get(..8).unwrap_or(input).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn passthrough(args: &mut Args) {
    args.pair("-map", "0:v:0?")
        .pair("-map", "0:a:0?")
        .pair("-c", "copy");
}

fn video_encoder(args: &mut Args, hls: &HlsOutputConfig) {
    args.pair("-c:v", hls.video_codec.as_str())
        .pair("-preset", hls.preset.as_str())
        .pair("-g", hls.gop_size.to_string())
        .pair("-keyint_min", hls.gop_size.to_string())
        .pair("-sc_threshold", "0");
}

fn audio_encoder(args: &mut Args, hls: &HlsOutputConfig) {
    args.pair("-c:a", hls.audio_codec.as_str())
        .pair("-b:a", format!("{}k", hls.audio_bitrate_kbps))
        .pair("-ac", "2");
}

fn single_variant(args: &mut Args, variant: Variant, hls: &HlsOutputConfig) {
    let (width, height) = variant.resolution();
    let kbps = variant.video_bitrate_kbps();

    args.pair("-map", "0:v:0").pair("-map", "0:a:0?");
    video_encoder(args, hls);
    args.pair("-s", format!("{width}x{height}"))
        .pair("-b:v", format!("{kbps}k"))
        .pair("-maxrate", format!("{kbps}k"))
        .pair("-bufsize", format!("{}k", kbps * 2));
    audio_encoder(args, hls);
}

fn multi_variant(args: &mut Args, variants: &[Variant], hls: &HlsOutputConfig) {
    // one video+audio input pair per output rendition
    for _ in variants {
        args.pair("-map", "0:v:0").pair("-map", "0:a:0");
    }
    video_encoder(args, hls);
    for (i, variant) in variants.iter().enumerate() {
        let (width, height) = variant.resolution();
        let kbps = variant.video_bitrate_kbps();
        args.pair(&format!("-s:v:{i}"), format!("{width}x{height}"))
            .pair(&format!("-b:v:{i}"), format!("{kbps}k"))
            .pair(&format!("-maxrate:v:{i}"), format!("{kbps}k"))
            .pair(&format!("-bufsize:v:{i}"), format!("{}k", kbps * 2));
    }
    audio_encoder(args, hls);
}

fn var_stream_map(variants: &[Variant]) -> String {
    variants
        .iter()
        .enumerate()
        .map(|(i, v)| format!("v:{i},a:{i},name:{}", v.label()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn hls_output(args: &mut Args, bitrate: &BitrateConfig, dir: &Path, hls: &HlsOutputConfig) {
    let mut flags = String::from("independent_segments");
    if hls.delete_segments {
        flags.insert_str(0, "delete_segments+");
    }

    args.pair("-f", "hls")
        .pair("-hls_time", hls.segment_duration.to_string())
        .pair("-hls_list_size", hls.playlist_size.to_string())
        .pair("-hls_flags", flags);

    if bitrate.encrypt {
        args.pair(
            "-hls_key_info_file",
            dir.join(KEY_INFO_FILE_NAME).to_string_lossy(),
        );
    }

    if bitrate.is_multi_variant() {
        let variant_dir = dir.join(VARIANT_DIR);
        args.pair("-master_pl_name", MASTER_PLAYLIST_NAME)
            .pair("-var_stream_map", var_stream_map(&bitrate.variants))
            .pair(
                "-hls_segment_filename",
                variant_dir.join(SEGMENT_PATTERN).to_string_lossy(),
            )
            .push(variant_dir.join(MEDIA_PLAYLIST_NAME).to_string_lossy());
    } else {
        args.pair(
            "-hls_segment_filename",
            dir.join(SEGMENT_PATTERN).to_string_lossy(),
        )
        .push(dir.join(MEDIA_PLAYLIST_NAME).to_string_lossy());
    }
}
