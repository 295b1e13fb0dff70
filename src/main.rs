use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;

use ffmpeg_pipe::args::mp4_args;
use ffmpeg_pipe::codec::PassthroughCodec;
use ffmpeg_pipe::processor::VideoProcessor;
use ffmpeg_pipe::sink::FileSink;

/// Rough demo: pipe stdin through the bridge into out.mp4 with the
/// passthrough codec standing in for the real transcoder.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let sink = FileSink::create("out.mp4")?;
    let processor = VideoProcessor::new(
        Arc::new(PassthroughCodec),
        Box::new(sink),
        mp4_args(0, true),
    );

    let mut stdin = tokio::io::stdin();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = stdin.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        processor.write(Bytes::copy_from_slice(&buf[..n]));
    }

    processor.close().await?;
    log::info!("done, wrote out.mp4");
    Ok(())
}
