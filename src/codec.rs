use std::sync::Arc;

use tokio::sync::oneshot;

use crate::input::{InputDevice, Readiness};
use crate::output::OutputDevice;

/// Virtual path the input device is mounted at; the assembled command line
/// always reads from here.
pub const INPUT_PATH: &str = "/dev/stdin";

/// Virtual path the output device is mounted at, with the extension chosen
/// by the caller's container format.
pub fn output_path(extension: &str) -> String {
    format!("/output.{extension}")
}

/// How a codec run ended. `aborted` means the codec's embedded runtime
/// forced an exit instead of returning normally; that is the expected way
/// for it to stop on end-of-input or cancellation and is clean as long as
/// the status is 0. Any non-zero status is fatal.
#[derive(Clone, Copy, Debug)]
pub struct CodecExit {
    pub aborted: bool,
    pub status: i32,
}

impl CodecExit {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Everything one codec run needs: the command line, the two mounted
/// devices, and a handshake fired once initialization is done.
pub struct CodecRequest {
    pub args: Vec<String>,
    pub input: Arc<InputDevice>,
    pub output: Arc<OutputDevice>,
    pub output_path: String,
    /// Fired once the codec has mounted its filesystem and is ready to
    /// consume input. The run itself keeps going long after this.
    pub ready: oneshot::Sender<()>,
}

/// A synchronous, blocking transcoder invoked through a single entry point.
///
/// `run` blocks until the codec exits, so it is always called on the
/// blocking pool. Implementations must fire `request.ready` once their
/// devices are mounted, gate every input read on
/// `InputDevice::wait_readable` and unwind promptly on
/// `Readiness::Canceled`, and close the output device at the end of a clean
/// run (a forced exit may skip that; the orchestrator compensates on the
/// cancel path).
pub trait Codec: Send + Sync + 'static {
    fn run(&self, request: CodecRequest) -> anyhow::Result<CodecExit>;
}

/// Identity "transcode": copies input bytes to the output unchanged.
/// Stands in for the real transcoder in the demo binary and the end-to-end
/// tests.
pub struct PassthroughCodec;

impl Codec for PassthroughCodec {
    fn run(&self, request: CodecRequest) -> anyhow::Result<CodecExit> {
        let CodecRequest {
            input,
            output,
            ready,
            ..
        } = request;
        let _ = ready.send(());

        let mut buf = [0u8; 4096];
        let mut position = 0u64;
        loop {
            match input.wait_readable() {
                Readiness::Canceled => {
                    // Forced exit: unwind without closing the output device,
                    // like the real runtime's abort path.
                    return Ok(CodecExit {
                        aborted: true,
                        status: 0,
                    });
                }
                Readiness::Readable => {
                    let n = input.read(&mut buf, position);
                    if n == 0 {
                        break;
                    }
                    output.write(&buf[..n], None)?;
                    position += n as u64;
                }
            }
        }

        output.close();
        Ok(CodecExit {
            aborted: false,
            status: 0,
        })
    }
}
