// Jackson Coxson

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::IdeviceError;

use super::raw_packet::RawPacket;
use super::UsbmuxdAddr;

/// An event published by a running [`Monitor`].
#[derive(Debug, Clone)]
pub enum MuxEvent {
    /// The muxd connection is up and the registry reflects its current device list.
    Connected,
    /// The muxd connection dropped; the registry has been cleared.
    Disconnected,
    /// A device with this UDID was added to the registry.
    DeviceAttached(String),
    /// A device with this UDID was removed from the registry.
    DeviceDetached(String),
}

#[derive(Default, Debug)]
struct Registry {
    by_udid: HashMap<String, u32>,
    by_id: HashMap<u32, String>,
}

impl Registry {
    fn clear(&mut self) {
        self.by_udid.clear();
        self.by_id.clear();
    }

    fn insert(&mut self, udid: String, device_id: u32) {
        self.by_id.insert(device_id, udid.clone());
        self.by_udid.insert(udid, device_id);
    }

    fn remove_by_id(&mut self, device_id: u32) -> Option<String> {
        let udid = self.by_id.remove(&device_id)?;
        self.by_udid.remove(&udid);
        Some(udid)
    }
}

/// Live view of the devices usbmuxd currently knows about.
///
/// Cheap to clone: every clone shares the same registry and event bus, so a
/// `MonitorHandle` can be handed out freely while only the original [`Monitor`]
/// owns the background task.
#[derive(Clone, Debug)]
pub struct MonitorHandle {
    registry: Arc<RwLock<Registry>>,
    events: broadcast::Sender<MuxEvent>,
}

impl MonitorHandle {
    /// Looks up the muxd device ID currently associated with a UDID.
    pub fn get_device_id(&self, udid: &str) -> Option<u32> {
        self.registry.read().unwrap().by_udid.get(udid).copied()
    }

    /// Snapshots every UDID currently known to be attached.
    pub fn list_devices(&self) -> Vec<String> {
        self.registry.read().unwrap().by_udid.keys().cloned().collect()
    }

    /// Subscribes to future events. The subscription is taken out before this
    /// call returns, so no event published after it can be missed -- though
    /// one published concurrently with a `list_devices`/`get_device_id` call
    /// may race with the snapshot.
    pub fn subscribe(&self) -> broadcast::Receiver<MuxEvent> {
        self.events.subscribe()
    }
}

/// Owns a background task that keeps a persistent `Listen` connection open to
/// usbmuxd and maintains a live registry of attached devices.
///
/// The task is aborted when this value drops; clone [`MonitorHandle`]s out of
/// it (via [`Monitor::handle`]) to share read access without extending its
/// lifetime.
pub struct Monitor {
    handle: MonitorHandle,
    task: JoinHandle<()>,
}

impl Monitor {
    /// Starts the background reconnect-and-listen loop against `addr`.
    pub fn spawn(addr: UsbmuxdAddr) -> Self {
        let registry = Arc::new(RwLock::new(Registry::default()));
        // A lock around publish+registry-mutation keeps the two in lockstep,
        // so a subscriber that snapshots the registry right after receiving
        // an event always sees that event's effect already applied.
        let publish_lock = Arc::new(Mutex::new(()));
        let (tx, _rx) = broadcast::channel(64);

        let handle = MonitorHandle {
            registry: registry.clone(),
            events: tx.clone(),
        };

        let task = tokio::spawn(run(addr, registry, publish_lock, tx));

        Self { handle, task }
    }

    /// Returns a cheap-to-clone handle for querying the registry and subscribing to events.
    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// Looks up the muxd device ID currently associated with a UDID.
    pub fn get_device_id(&self, udid: &str) -> Option<u32> {
        self.handle.get_device_id(udid)
    }

    /// Snapshots every UDID currently known to be attached.
    pub fn list_devices(&self) -> Vec<String> {
        self.handle.list_devices()
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<MuxEvent> {
        self.handle.subscribe()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn publish(
    registry: &Arc<RwLock<Registry>>,
    publish_lock: &Arc<Mutex<()>>,
    tx: &broadcast::Sender<MuxEvent>,
    mutate: impl FnOnce(&mut Registry) -> Option<MuxEvent>,
) {
    let _guard = publish_lock.lock().unwrap();
    let event = {
        let mut reg = registry.write().unwrap();
        mutate(&mut reg)
    };
    if let Some(event) = event {
        // No receivers is the common case when nobody's subscribed yet; not an error.
        let _ = tx.send(event);
    }
}

async fn run(
    addr: UsbmuxdAddr,
    registry: Arc<RwLock<Registry>>,
    publish_lock: Arc<Mutex<()>>,
    tx: broadcast::Sender<MuxEvent>,
) {
    let mut first_attempt = true;
    loop {
        if !first_attempt {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        first_attempt = false;

        if let Err(e) = run_once(&addr, &registry, &publish_lock, &tx).await {
            warn!("usbmuxd monitor connection dropped: {e:?}");
        }

        publish(&registry, &publish_lock, &tx, |reg| {
            reg.clear();
            Some(MuxEvent::Disconnected)
        });
    }
}

async fn run_once(
    addr: &UsbmuxdAddr,
    registry: &Arc<RwLock<Registry>>,
    publish_lock: &Arc<Mutex<()>>,
    tx: &broadcast::Sender<MuxEvent>,
) -> Result<(), IdeviceError> {
    let mut conn = addr.connect(1).await?;

    let mut req = plist::Dictionary::new();
    req.insert("MessageType".into(), "ReadBUID".into());
    let raw = RawPacket::request(req, 1);
    let bytes: Vec<u8> = raw.into();
    use tokio::io::AsyncWriteExt;
    conn.socket.write_all(&bytes).await?;
    let (protocol_version, _msg_type, _tag, _dict) = RawPacket::read_from(&mut conn.socket).await?;
    if protocol_version != 1 {
        return Err(IdeviceError::InvalidProtocolVersion);
    }

    let mut req = plist::Dictionary::new();
    req.insert("MessageType".into(), "Listen".into());
    let raw = RawPacket::request(req, 1);
    let bytes: Vec<u8> = raw.into();
    conn.socket.write_all(&bytes).await?;
    let (_version, _msg_type, _tag, dict) = RawPacket::read_from(&mut conn.socket).await?;
    match dict.get("Number") {
        Some(plist::Value::Integer(i)) if i.as_unsigned() == Some(0) => {}
        _ => return Err(IdeviceError::UnexpectedResponse),
    }

    publish(registry, publish_lock, tx, |_| Some(MuxEvent::Connected));

    loop {
        let (_version, _msg_type, _tag, dict) = RawPacket::read_from(&mut conn.socket).await?;
        let message_type = dict.get("MessageType").and_then(|v| v.as_string()).unwrap_or("");
        match message_type {
            "Attached" => {
                let Some(device_id) = dict
                    .get("DeviceID")
                    .and_then(|v| v.as_signed_integer())
                    .map(|v| v as u32)
                else {
                    continue;
                };
                let Some(props) = dict.get("Properties").and_then(|v| v.as_dictionary()) else {
                    continue;
                };
                let connection_type = props
                    .get("ConnectionType")
                    .and_then(|v| v.as_string())
                    .unwrap_or("");
                // Network devices don't carry a usable routable identity here; skip them
                // the same way component D's design scoped attachment events to USB.
                if connection_type != "USB" {
                    continue;
                }
                let Some(udid) = props.get("SerialNumber").and_then(|v| v.as_string()) else {
                    continue;
                };
                let udid = udid.to_string();
                debug!("usbmuxd attached: {udid} ({device_id})");
                publish(registry, publish_lock, tx, |reg| {
                    reg.insert(udid.clone(), device_id);
                    Some(MuxEvent::DeviceAttached(udid))
                });
            }
            "Detached" => {
                let Some(device_id) = dict
                    .get("DeviceID")
                    .and_then(|v| v.as_signed_integer())
                    .map(|v| v as u32)
                else {
                    continue;
                };
                debug!("usbmuxd detached: {device_id}");
                publish(registry, publish_lock, tx, |reg| {
                    reg.remove_by_id(device_id).map(MuxEvent::DeviceDetached)
                });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_tracks_attach_and_detach() {
        let mut reg = Registry::default();
        reg.insert("udid-1".to_string(), 5);
        assert_eq!(reg.by_udid.get("udid-1"), Some(&5));
        assert_eq!(reg.remove_by_id(5).as_deref(), Some("udid-1"));
        assert!(reg.by_udid.is_empty());
        assert!(reg.by_id.is_empty());
    }
}
