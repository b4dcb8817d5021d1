use tokio_tun::Tun;

use crate::error::{Result, TunupError};
use crate::platform::traits::TunDevice;

/// A created TUN interface plus its kernel-assigned identity.
pub struct TunInterface {
    tun: Tun,
    name: String,
    index: u32,
    mtu: u32,
}

/// Create a TUN device.
///
/// `name` is advisory: an empty or absent name lets the kernel pick the next
/// free `tunN`. Callers must use the name carried by the returned handle for
/// everything that follows; the kernel may not honor the request.
///
/// The link is left administratively down. Bringing it up is an explicit
/// lifecycle step owned by the device controller.
pub fn create_tun(name: Option<&str>, mtu: u32) -> Result<TunInterface> {
    if mtu == 0 || mtu > 65536 {
        return Err(TunupError::InvalidArgument(format!(
            "MTU {} out of range",
            mtu
        )));
    }

    let tun = Tun::builder()
        .name(name.unwrap_or(""))
        .tap(false)
        .packet_info(false)
        .mtu(mtu as i32)
        .try_build()
        .map_err(|e| TunupError::InterfaceCreation(e.to_string()))?;

    let effective_name = tun.name().to_string();
    let index = tun_index(&effective_name)?;

    tracing::debug!(
        "Created TUN device {} (index={}, mtu={})",
        effective_name,
        index,
        mtu
    );

    Ok(TunInterface {
        tun,
        name: effective_name,
        index,
        mtu,
    })
}

fn tun_index(name: &str) -> Result<u32> {
    use std::ffi::CString;

    let name_cstr =
        CString::new(name).map_err(|e| TunupError::InterfaceCreation(e.to_string()))?;

    let index = unsafe { libc::if_nametoindex(name_cstr.as_ptr()) };

    if index == 0 {
        return Err(TunupError::InterfaceCreation(format!(
            "failed to get interface index for {}",
            name
        )));
    }

    Ok(index)
}

impl TunInterface {
    /// Get the underlying Tun for direct access if needed
    pub fn inner(&self) -> &Tun {
        &self.tun
    }
}

impl TunDevice for TunInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> u32 {
        self.index
    }

    fn mtu(&self) -> u32 {
        self.mtu
    }
}
