use std::{future::Future, io, pin::Pin, process::ExitStatus, process::Stdio};

use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use tracing::{debug, info, warn};

use crate::command;

/// Result type for delivery operations.
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Boxed future type for delivery operations, enabling object safety.
pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = DeliveryResult<()>> + Send + 'a>>;

/// Byte stream of the message being delivered.
pub type MessageStream<'a> = &'a mut (dyn AsyncRead + Unpin + Send);

/// Errors that can occur while handing the message over for delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The delivery program could not be started.
    #[error("unable to run {program}: {source}")]
    Spawn { program: String, source: io::Error },
    /// Streaming the message to the delivery program failed.
    #[error("unable to stream message: {0}")]
    Stream(io::Error),
    /// The delivery program did not exit successfully.
    #[error("{0}")]
    Status(ExitStatus),
    /// Writing the dry-run preview failed.
    #[error("unable to write preview: {0}")]
    Output(io::Error),
}

/// Trait for the final step of the pipeline, receiving the sendmail
/// arguments and the rewritten message.
pub trait MessageDelivery: Send + Sync {
    /// Delivers the message read from `data`, using `args` as sendmail arguments.
    fn deliver<'a>(&'a self, args: &'a [String], data: MessageStream<'a>) -> DeliveryFuture<'a>;

    /// Returns the name of this delivery method.
    fn name(&self) -> &str;
}

/// Builds the sendmail argument list: implicit recipients (`-i`), envelope
/// sender (`-f`), full name (`-F`) followed by the caller supplied arguments.
pub fn sendmail_args(sender: &str, full_name: &str, extra: &[String]) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        "-f".to_string(),
        sender.to_string(),
        "-F".to_string(),
        full_name.to_string(),
    ];
    args.extend_from_slice(extra);
    args
}

/// Delivery that re-injects the message by piping it into sendmail.
pub struct SendmailDelivery {
    program: String,
    path: Option<String>,
}

impl SendmailDelivery {
    /// Creates a new [`SendmailDelivery`] running `program` with the given
    /// `$PATH` override.
    pub fn new(program: String, path: Option<String>) -> Self {
        info!(program = %program, path = ?path, "Sendmail delivery initialized");
        Self { program, path }
    }
}

impl MessageDelivery for SendmailDelivery {
    fn deliver<'a>(&'a self, args: &'a [String], data: MessageStream<'a>) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let mut child = command(&self.program, self.path.as_deref())
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(|source| DeliveryError::Spawn {
                    program: self.program.clone(),
                    source,
                })?;

            let mut stdin = child.stdin.take();
            let streamed = match stdin.as_mut() {
                Some(stdin) => match tokio::io::copy(data, stdin).await {
                    Ok(size) => stdin.shutdown().await.map(|_| size),
                    Err(e) => Err(e),
                },
                None => Err(io::Error::from(io::ErrorKind::NotConnected)),
            };

            // A sendmail exiting early closes its end of the pipe, its exit
            // status is what tells whether the message was accepted.
            match streamed {
                Ok(size) => debug!(size = size, "Streamed message to sendmail"),
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("Sendmail closed its input early")
                }
                Err(e) => {
                    // the pipe must stay open until the child is gone, a
                    // clean end of input would let it accept a truncated message
                    if let Err(kill) = child.kill().await {
                        warn!(error = %kill, "Failed to kill sendmail");
                    }
                    drop(stdin);
                    return Err(DeliveryError::Stream(e));
                }
            }
            drop(stdin);

            let status = child.wait().await.map_err(DeliveryError::Stream)?;

            if !status.success() {
                return Err(DeliveryError::Status(status));
            }
            info!(program = %self.program, "Delivered message to sendmail");
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "sendmail"
    }
}

/// Delivery that only shows what would be done, writing the sendmail
/// arguments and the message to `writer`.
pub struct DryRunDelivery<W> {
    writer: Mutex<W>,
}

impl<W> DryRunDelivery<W> {
    /// Creates a new [`DryRunDelivery`] writing its preview to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the delivery, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

/// Returns the preview text written before the message in dry-run mode.
pub fn preview_header(args: &[String]) -> String {
    format!(
        "Would call sendmail with args: [{}]\nWould pipe the following data into sendmail:\n\n",
        args.join(" ")
    )
}

impl<W: AsyncWrite + Unpin + Send> MessageDelivery for DryRunDelivery<W> {
    fn deliver<'a>(&'a self, args: &'a [String], data: MessageStream<'a>) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(preview_header(args).as_bytes())
                .await
                .map_err(DeliveryError::Output)?;
            tokio::io::copy(data, &mut *writer)
                .await
                .map_err(DeliveryError::Output)?;
            writer.flush().await.map_err(DeliveryError::Output)?;
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "dry_run"
    }
}
