//! Real transport provider for the host machine

use glovelink_core::prelude::*;

use crate::channel::{Channel, ChannelSelector, TransportProvider};
use crate::{radio, serial};

/// Opens serial ports and radio links on this machine
#[derive(Debug, Clone, Copy, Default)]
pub struct HostTransport;

impl HostTransport {
    pub fn new() -> Self {
        Self
    }

    /// Whether this build can open radio links at all
    pub fn radio_supported(&self) -> bool {
        cfg!(feature = "radio")
    }
}

impl TransportProvider for HostTransport {
    async fn request_channel(&self, selector: &ChannelSelector) -> Result<Channel> {
        debug!("Requesting {} channel", selector.kind());
        match selector {
            ChannelSelector::Serial(params) => serial::open(params).await,
            ChannelSelector::Radio(params) => radio::open(params).await,
        }
    }
}
