use crate::error::TransportError;

/// Same-origin broadcast to every other tab. Best-effort and at-most-once;
/// order is preserved per sender only. Inbound messages are pushed into the
/// coordinator by the host, not pulled through this trait.
pub trait Transport {
    fn post(&self, payload: &str) -> Result<(), TransportError>;

    fn close(&self);
}

/// Opens the transport for a channel name. Failure means the platform has no
/// broadcast support and the tab stays solo.
pub trait ChannelOpener {
    fn open(&self, channel_name: &str) -> Result<Box<dyn Transport>, TransportError>;
}

impl<F> ChannelOpener for F
where
    F: Fn(&str) -> Result<Box<dyn Transport>, TransportError>,
{
    fn open(&self, channel_name: &str) -> Result<Box<dyn Transport>, TransportError> {
        self(channel_name)
    }
}

/// Opener for platforms without a broadcast API
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl ChannelOpener for Unsupported {
    fn open(&self, channel_name: &str) -> Result<Box<dyn Transport>, TransportError> {
        Err(TransportError::Unsupported(format!(
            "no broadcast transport for channel {channel_name}"
        )))
    }
}
