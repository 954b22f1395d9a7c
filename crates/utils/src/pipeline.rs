//! The forwarding pipeline: capture, extract, resolve, rewrite and deliver.
//!
//! The input is consumed exactly once. The header section is captured while
//! it is parsed, rewritten in memory and then chained in front of the unread
//! body, so the message body reaches the delivery step byte for byte.

use std::io::Cursor;

use chrono::Local;
use tokio::io::{stdout, AsyncBufRead, AsyncReadExt};
use tracing::{debug, info};

use crate::{
    capture_headers, forwarding_headers, rewrite_headers, sendmail_args, AddressResolver,
    DryRunDelivery, ForwardConfig, ForwardError, ForwardMetadata, ForwardResult, HostnameSource,
    MessageDelivery, PostconfHostname, SendmailDelivery, SrsResolver,
};

/// Forwards a single message through the resolver and delivery step.
pub struct Forwarder {
    rp_header: String,
    resolver: Box<dyn AddressResolver>,
    hostname: Box<dyn HostnameSource>,
    delivery: Box<dyn MessageDelivery>,
}

impl Forwarder {
    /// Creates a new [`Forwarder`] from its collaborators.
    pub fn new(
        rp_header: String,
        resolver: Box<dyn AddressResolver>,
        hostname: Box<dyn HostnameSource>,
        delivery: Box<dyn MessageDelivery>,
    ) -> Self {
        Self {
            rp_header,
            resolver,
            hostname,
            delivery,
        }
    }

    /// Creates the production [`Forwarder`] described by `config`: an SRS
    /// lookup over TCP, the Postfix host name and either sendmail or a
    /// dry-run preview on the standard output.
    pub fn from_config(config: &ForwardConfig) -> Self {
        let delivery: Box<dyn MessageDelivery> = if config.dry_run {
            Box::new(DryRunDelivery::new(stdout()))
        } else {
            Box::new(SendmailDelivery::new(
                config.sendmail_path.clone(),
                config.path.clone(),
            ))
        };
        info!(
            srs_addr = %config.srs_addr,
            rp_header = %config.rp_header,
            delivery = delivery.name(),
            "Forwarder initialized"
        );
        Self::new(
            config.rp_header.clone(),
            Box::new(SrsResolver::new(config.srs_addr.clone())),
            Box::new(PostconfHostname::new(config.path.clone())),
            delivery,
        )
    }

    /// Forwards the message read from `input`, appending `extra_args` to the
    /// sendmail arguments.
    ///
    /// Nothing is handed to the delivery step unless every step before it
    /// succeeded.
    pub async fn forward<R>(&self, input: R, extra_args: &[String]) -> ForwardResult<()>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let captured = capture_headers(input).await?;
        let metadata = ForwardMetadata::from_headers(&captured, &self.rp_header)?;
        debug!(
            return_path = %metadata.return_path,
            from_name = %metadata.from_name,
            "Extracted forwarding metadata"
        );

        let sender = self.resolver.resolve(&metadata.return_path).await?;
        info!(
            resolver = self.resolver.name(),
            original = %metadata.return_path,
            resolved = %sender,
            "Resolved envelope sender"
        );

        let hostname = self.hostname.hostname().await;
        let headers = forwarding_headers(&hostname, &Local::now(), &metadata.original_return_path);
        let prefix = rewrite_headers(captured.raw.as_slice(), &headers)
            .await
            .map_err(ForwardError::Read)?;

        let args = sendmail_args(&sender, &metadata.from_name, extra_args);
        let mut message = Cursor::new(prefix).chain(captured.remainder);
        self.delivery.deliver(&args, &mut message).await?;
        Ok(())
    }
}
