//! Thumbnail generation.

use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use memoir_models::encoding::{THUMBNAIL_HEIGHT, THUMBNAIL_WIDTH};

fn thumbnail_filter() -> String {
    format!("scale={}:{}", THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT)
}

/// Write the first frame of a video as a 320x240 still.
pub async fn generate_thumbnail(
    runner: &FfmpegRunner,
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(video_path.as_ref(), output_path.as_ref())
        .single_frame()
        .video_filter(thumbnail_filter())
        .log_level("error");

    runner.run(&cmd).await
}
