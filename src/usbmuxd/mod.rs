// Jackson Coxson

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::{pairing_file::PairingFile, provider::UsbmuxdProvider, IdeviceError, ReadWrite};

mod raw_packet;

pub mod monitor;
pub use monitor::{Monitor, MonitorHandle, MuxEvent};

use raw_packet::RawPacket;

#[derive(Debug, Clone)]
pub enum Connection {
    Usb,
    Network(IpAddr),
    Unknown(String),
}

#[derive(Debug, Clone)]
pub struct UsbmuxdDevice {
    pub connection_type: Connection,
    pub udid: String,
    pub device_id: u32,
}

impl UsbmuxdDevice {
    /// Wraps this device up as a provider that dials through `addr` for every
    /// connection, resolving the current `DeviceID` from `monitor`'s registry
    /// on each dial instead of reusing the `device_id` this snapshot was
    /// listed under.
    pub fn to_provider(
        &self,
        addr: UsbmuxdAddr,
        monitor: MonitorHandle,
        label: impl Into<String>,
    ) -> UsbmuxdProvider {
        UsbmuxdProvider::new(addr, self.udid.clone(), monitor, label.into())
    }
}

/// Where to find the multiplexer: a UNIX-domain socket path (macOS/Linux) or a TCP
/// endpoint (used for simulators, and as the only option on Windows).
#[derive(Debug, Clone)]
pub enum UsbmuxdAddr {
    UnixSocket(PathBuf),
    Tcp(SocketAddr),
}

impl Default for UsbmuxdAddr {
    fn default() -> Self {
        #[cfg(unix)]
        {
            Self::UnixSocket(PathBuf::from(UsbmuxdConnection::SOCKET_FILE))
        }
        #[cfg(not(unix))]
        {
            Self::Tcp(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                UsbmuxdConnection::DEFAULT_PORT,
            ))
        }
    }
}

impl UsbmuxdAddr {
    /// Opens a fresh, short-lived transport connection to the multiplexer.
    ///
    /// Every `UsbmuxdConnection` is its own socket: `connect_to_device` hands the
    /// socket to the caller and the connection self-terminates, so there is no
    /// shared listen connection to serialize access to.
    pub async fn connect(&self, tag: u32) -> Result<UsbmuxdConnection, IdeviceError> {
        let socket: Box<dyn ReadWrite> = match self {
            Self::Tcp(addr) => Box::new(tokio::net::TcpStream::connect(addr).await?),
            #[cfg(unix)]
            Self::UnixSocket(path) => Box::new(tokio::net::UnixStream::connect(path).await?),
            #[cfg(not(unix))]
            Self::UnixSocket(_) => {
                return Err(IdeviceError::UnexpectedResponse);
            }
        };
        Ok(UsbmuxdConnection::new(socket, tag))
    }
}

#[derive(Deserialize)]
struct ListDevicesResponse {
    #[serde(rename = "DeviceList")]
    device_list: Vec<DeviceListResponse>,
}

#[derive(Deserialize)]
struct DeviceListResponse {
    #[serde(rename = "DeviceID")]
    device_id: u32,
    #[serde(rename = "Properties")]
    properties: DevicePropertiesResponse,
}

#[derive(Deserialize)]
struct DevicePropertiesResponse {
    #[serde(rename = "ConnectionType")]
    connection_type: String,
    #[serde(rename = "NetworkAddress")]
    network_address: Option<plist::Data>,
    #[serde(rename = "SerialNumber")]
    serial_number: String,
}

/// A short-lived muxd session: one task, one socket, terminates after it.
///
/// Mirrors component E of the transport design -- `get_pair_record` and
/// `connect_thru` (here `connect_to_device`) are the only two things a
/// caller needs from the multiplexer besides the persistent `Monitor`.
pub struct UsbmuxdConnection {
    socket: Box<dyn ReadWrite>,
    tag: u32,
}

impl UsbmuxdConnection {
    pub const DEFAULT_PORT: u16 = 27015;
    pub const SOCKET_FILE: &str = "/var/run/usbmuxd";

    pub fn new(socket: Box<dyn ReadWrite>, tag: u32) -> Self {
        Self { socket, tag }
    }

    pub async fn default() -> Result<Self, IdeviceError> {
        UsbmuxdAddr::default().connect(0).await
    }

    pub async fn get_devices(&mut self) -> Result<Vec<UsbmuxdDevice>, IdeviceError> {
        let mut req = plist::Dictionary::new();
        req.insert("MessageType".into(), "ListDevices".into());
        self.write_plist(req).await?;
        let res = self.read_plist().await?;
        let res = plist::to_value(&res)?;
        let res = plist::from_value::<ListDevicesResponse>(&res)?;

        let mut devs = Vec::new();
        for dev in res.device_list {
            let connection_type = match dev.properties.connection_type.as_str() {
                "Network" => {
                    if let Some(addr) = dev.properties.network_address {
                        let addr = &Into::<Vec<u8>>::into(addr);
                        if addr.len() < 8 {
                            return Err(IdeviceError::UnexpectedResponse);
                        }

                        let addr = match addr[0] {
                            0x02 => {
                                // ipv4
                                IpAddr::V4(Ipv4Addr::new(addr[4], addr[5], addr[6], addr[7]))
                            }
                            0x1E => {
                                // ipv6
                                if addr.len() < 24 {
                                    return Err(IdeviceError::UnexpectedResponse);
                                }

                                IpAddr::V6(Ipv6Addr::new(
                                    u16::from_le_bytes([addr[8], addr[9]]),
                                    u16::from_le_bytes([addr[10], addr[11]]),
                                    u16::from_le_bytes([addr[12], addr[13]]),
                                    u16::from_le_bytes([addr[14], addr[15]]),
                                    u16::from_le_bytes([addr[16], addr[17]]),
                                    u16::from_le_bytes([addr[18], addr[19]]),
                                    u16::from_le_bytes([addr[20], addr[21]]),
                                    u16::from_le_bytes([addr[22], addr[23]]),
                                ))
                            }
                            _ => {
                                return Err(IdeviceError::UnexpectedResponse);
                            }
                        };
                        Connection::Network(addr)
                    } else {
                        return Err(IdeviceError::UnexpectedResponse);
                    }
                }
                "USB" => Connection::Usb,
                _ => Connection::Unknown(dev.properties.connection_type),
            };
            devs.push(UsbmuxdDevice {
                connection_type,
                udid: dev.properties.serial_number,
                device_id: dev.device_id,
            })
        }

        Ok(devs)
    }

    /// Reads the device's pairing record. Absence is reported as
    /// `NoPairingRecord`, not a hard error -- callers like lockdown's
    /// `start_session` tolerate it and surface it as a session-start failure.
    pub async fn get_pair_record(&mut self, udid: &str) -> Result<PairingFile, IdeviceError> {
        let mut req = plist::Dictionary::new();
        req.insert("MessageType".into(), "ReadPairRecord".into());
        req.insert("PairRecordID".into(), udid.into());
        self.write_plist(req).await?;
        let res = self.read_plist().await?;

        match res.get("PairRecordData") {
            Some(plist::Value::Data(d)) => PairingFile::from_bytes(d),
            _ => Err(IdeviceError::NoPairingRecord),
        }
    }

    pub async fn get_buid(&mut self) -> Result<String, IdeviceError> {
        let mut req = plist::Dictionary::new();
        req.insert("MessageType".into(), "ReadBUID".into());
        self.write_plist(req).await?;
        let mut res = self.read_plist().await?;

        match res.remove("BUID") {
            Some(plist::Value::String(s)) => Ok(s),
            _ => Err(IdeviceError::UnexpectedResponse),
        }
    }

    /// Tunnels through to a TCP port on the device and hands back the raw socket.
    ///
    /// This consumes `self`: on success the underlying socket's ownership
    /// transfers to the caller and this connection is gone, matching the
    /// "connect_thru terminates after transferring the socket" rule.
    ///
    /// The multiplexer wants `PortNumber` byte-swapped (the native u16 placed
    /// into a little-endian field as if it were big-endian) -- a
    /// bug-compatible implementation must replicate this exact swap, not a
    /// plain `htons`.
    pub async fn connect_to_device(
        mut self,
        device_id: u32,
        port: u16,
    ) -> Result<Box<dyn ReadWrite>, IdeviceError> {
        let mut req = plist::Dictionary::new();
        req.insert("MessageType".into(), "Connect".into());
        req.insert("DeviceID".into(), device_id.into());
        req.insert("PortNumber".into(), (port.swap_bytes() as i64).into());
        self.write_plist(req).await?;
        match self.read_plist().await?.get("Number") {
            Some(plist::Value::Integer(i)) => match i.as_unsigned() {
                Some(0) => Ok(self.socket),
                _ => Err(IdeviceError::Failed),
            },
            _ => Err(IdeviceError::UnexpectedResponse),
        }
    }

    async fn write_plist(&mut self, req: plist::Dictionary) -> Result<(), IdeviceError> {
        let raw = RawPacket::request(req, self.tag);
        let raw: Vec<u8> = raw.into();
        self.socket.write_all(&raw).await?;
        Ok(())
    }

    async fn read_plist(&mut self) -> Result<plist::Dictionary, IdeviceError> {
        let mut header_buffer = [0; 16];
        self.socket.read_exact(&mut header_buffer).await?;

        // We are safe to unwrap as it only panics if the buffer isn't 4
        let packet_size = u32::from_le_bytes(header_buffer[..4].try_into().unwrap()) - 16;
        debug!("Reading {packet_size} bytes from muxer");

        let mut body_buffer = vec![0; packet_size as usize];
        self.socket.read_exact(&mut body_buffer).await?;

        let res = plist::from_bytes(&body_buffer)?;

        Ok(res)
    }
}
