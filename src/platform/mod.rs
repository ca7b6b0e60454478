pub mod interface;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
mod netlink;
#[cfg(target_os = "linux")]
mod sysfs;

#[cfg(test)]
pub mod sim;

pub use interface::{ControlChannel, ControlPlatform};

#[cfg(target_os = "linux")]
pub use linux::LinuxPlatform;

use crate::error::{IfshError, Result};

pub fn create_platform() -> Box<dyn ControlPlatform> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxPlatform::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(UnsupportedPlatform)
    }
}

#[allow(dead_code)]
struct UnsupportedPlatform;

impl ControlPlatform for UnsupportedPlatform {
    fn open(&self) -> Result<Box<dyn ControlChannel>> {
        Err(IfshError::Unsupported(
            "interface control is not implemented for this platform".to_string(),
        ))
    }
}
