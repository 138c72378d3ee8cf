//! Single-byte commands for the device menu.

/// Menu command understood by the loose-mode firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceCommand {
    /// Prepare to receive an image (`'1'`).
    ReceiveImage = b'1',
    /// Run the built-in self-test (`'2'`).
    SelfTest = b'2',
    /// Print network information (`'3'`).
    Info = b'3',
    /// Print the menu (`'4'`).
    ShowMenu = b'4',
}

impl DeviceCommand {
    /// Wire byte.
    pub fn byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for DeviceCommand {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'1' => Ok(Self::ReceiveImage),
            b'2' => Ok(Self::SelfTest),
            b'3' => Ok(Self::Info),
            b'4' => Ok(Self::ShowMenu),
            other => Err(other),
        }
    }
}
