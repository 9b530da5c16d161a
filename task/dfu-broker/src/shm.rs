//! Shared-memory regions advertised by `dfuusb` and `dfuflash` during
//! the startup handshake's final rendezvous phase.

use drv_dfu_proto::ShmInfo;

#[derive(Copy, Clone, Debug, Default)]
pub struct ShmRegistry {
    usb: Option<ShmInfo>,
    flash: Option<ShmInfo>,
}

impl ShmRegistry {
    pub const fn new() -> Self {
        Self {
            usb: None,
            flash: None,
        }
    }

    pub fn set_usb(&mut self, info: ShmInfo) {
        self.usb = Some(info);
    }

    pub fn set_flash(&mut self, info: ShmInfo) {
        self.flash = Some(info);
    }

    pub fn is_complete(&self) -> bool {
        self.usb.is_some() && self.flash.is_some()
    }

    pub fn usb(&self) -> Option<ShmInfo> {
        self.usb
    }

    pub fn flash(&self) -> Option<ShmInfo> {
        self.flash
    }
}
