// Jackson Coxson

use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpStream;

use crate::{pairing_file::PairingFile, usbmuxd::UsbmuxdAddr, Idevice, IdeviceError};
#[cfg(feature = "usbmuxd")]
use crate::usbmuxd::MonitorHandle;

pub trait IdeviceProvider: Unpin + Send + Sync + std::fmt::Debug {
    // https://blog.rust-lang.org/2023/12/21/async-fn-rpit-in-traits.html#is-it-okay-to-use-async-fn-in-traits-what-are-the-limitations
    fn connect(
        &self,
        port: u16,
    ) -> impl std::future::Future<Output = Result<Idevice, IdeviceError>> + Send;
    fn label(&self) -> &str;
    fn get_pairing_file(
        &self,
    ) -> impl std::future::Future<Output = Result<PairingFile, IdeviceError>> + Send;
}

#[derive(Debug)]
pub struct TcpProvider {
    addr: IpAddr,
    pairing_file: PairingFile,
    label: String,
}

impl TcpProvider {
    /// Builds a provider that dials `addr` directly for every connection,
    /// bypassing usbmuxd entirely. Used for network-attached devices and
    /// simulators that already expose lockdown/service ports over TCP.
    pub fn new(addr: IpAddr, pairing_file: PairingFile, label: impl Into<String>) -> Self {
        Self {
            addr,
            pairing_file,
            label: label.into(),
        }
    }
}

impl IdeviceProvider for TcpProvider {
    async fn connect(&self, port: u16) -> Result<Idevice, IdeviceError> {
        let socket_addr = SocketAddr::new(self.addr, port);
        let stream = TcpStream::connect(socket_addr).await?;
        Ok(Idevice::new(Box::new(stream), self.label.to_owned()))
    }
    fn label(&self) -> &str {
        self.label.as_str()
    }

    async fn get_pairing_file(&self) -> Result<PairingFile, IdeviceError> {
        Ok(self.pairing_file.clone())
    }
}

#[cfg(feature = "usbmuxd")]
#[derive(Debug, Clone)]
pub struct UsbmuxdProvider {
    addr: UsbmuxdAddr,
    tag: u32,
    udid: String,
    monitor: MonitorHandle,
    label: String,
}

#[cfg(feature = "usbmuxd")]
impl UsbmuxdProvider {
    /// Builds a provider that dials through usbmuxd for every connection,
    /// resolving `udid` to a `DeviceID` via `monitor`'s live registry on each
    /// dial rather than pinning one down up front (a `DeviceID` isn't stable
    /// across re-attach).
    pub fn new(addr: UsbmuxdAddr, udid: String, monitor: MonitorHandle, label: String) -> Self {
        Self {
            addr,
            tag: 0,
            udid,
            monitor,
            label,
        }
    }
}

#[cfg(feature = "usbmuxd")]
impl IdeviceProvider for UsbmuxdProvider {
    async fn connect(&self, port: u16) -> Result<Idevice, IdeviceError> {
        // Look the device up in the monitor's registry before touching the
        // network: an unknown udid fails `NotFound` without a muxd round trip.
        let device_id = self
            .monitor
            .get_device_id(&self.udid)
            .ok_or(IdeviceError::NotFound)?;
        let usbmuxd = self.addr.connect(self.tag).await?;
        let socket = usbmuxd.connect_to_device(device_id, port).await?;
        Ok(Idevice::new(socket, self.label.clone()))
    }

    fn label(&self) -> &str {
        self.label.as_str()
    }

    async fn get_pairing_file(&self) -> Result<PairingFile, IdeviceError> {
        let mut usbmuxd = self.addr.connect(self.tag).await?;
        usbmuxd.get_pair_record(&self.udid).await
    }
}
