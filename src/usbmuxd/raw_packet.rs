// Jackson Coxson

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::IdeviceError;

/// Name this library presents to the multiplexer. Not configurable: usbmuxd doesn't
/// care what it says, it just wants *something* in `ProgName`.
const PROG_NAME: &str = "idevice-rs";
const LIB_USBMUX_VERSION: i64 = 3;

/// Header size in bytes: `total_length` + `protocol_version` + `message_type` + `tag`.
const HEADER_LEN: u32 = 16;

/// A length-prefixed muxd frame: `{total_length, protocol_version, message_type, tag, payload}`.
///
/// `total_length` counts itself, i.e. it is `HEADER_LEN + payload.len()`.
#[derive(Debug)]
pub struct RawPacket {
    pub version: u32,
    pub message_type: u32,
    pub tag: u32,
    plist: plist::Dictionary,
}

impl RawPacket {
    pub const XML_PLIST_VERSION: u32 = 1;
    pub const PLIST_MESSAGE_TYPE: u32 = 8;

    /// Builds a request frame, merging in the constant preamble every muxd
    /// request carries: `ClientVersionString`, `ProgName`, `kLibUSBMuxVersion`.
    pub fn new(mut plist: plist::Dictionary, version: u32, message_type: u32, tag: u32) -> Self {
        plist
            .entry("ClientVersionString".to_string())
            .or_insert_with(|| PROG_NAME.into());
        plist
            .entry("ProgName".to_string())
            .or_insert_with(|| PROG_NAME.into());
        plist
            .entry("kLibUSBMuxVersion".to_string())
            .or_insert_with(|| LIB_USBMUX_VERSION.into());
        Self {
            version,
            message_type,
            tag,
            plist,
        }
    }

    pub fn request(plist: plist::Dictionary, tag: u32) -> Self {
        Self::new(plist, Self::XML_PLIST_VERSION, Self::PLIST_MESSAGE_TYPE, tag)
    }

    /// Reads one full frame from an async byte stream, buffering short reads.
    pub async fn read_from(
        reader: &mut (impl AsyncRead + Unpin),
    ) -> Result<(u32, u32, u32, plist::Dictionary), IdeviceError> {
        let mut header = [0u8; HEADER_LEN as usize];
        reader.read_exact(&mut header).await?;

        let total_length = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let protocol_version = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let message_type = u32::from_le_bytes(header[8..12].try_into().unwrap());
        let tag = u32::from_le_bytes(header[12..16].try_into().unwrap());

        if total_length < HEADER_LEN {
            return Err(IdeviceError::UnexpectedResponse);
        }
        let payload_len = (total_length - HEADER_LEN) as usize;
        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload).await?;

        let dict: plist::Dictionary = plist::from_bytes(&payload)?;
        Ok((protocol_version, message_type, tag, dict))
    }
}

impl From<RawPacket> for Vec<u8> {
    fn from(packet: RawPacket) -> Vec<u8> {
        let mut payload = Vec::new();
        plist::to_writer_xml(&mut payload, &packet.plist).expect("plist serialization is infallible for the supported value universe");

        let total_length = HEADER_LEN + payload.len() as u32;
        let mut out = Vec::with_capacity(total_length as usize);
        out.extend_from_slice(&total_length.to_le_bytes());
        out.extend_from_slice(&packet.version.to_le_bytes());
        out.extend_from_slice(&packet.message_type.to_le_bytes());
        out.extend_from_slice(&packet.tag.to_le_bytes());
        out.extend_from_slice(&payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_is_merged_into_every_request() {
        let mut req = plist::Dictionary::new();
        req.insert("MessageType".into(), "ReadBUID".into());
        let packet = RawPacket::request(req, 1);
        assert_eq!(
            packet.plist.get("ProgName").and_then(|v| v.as_string()),
            Some(PROG_NAME)
        );
        assert_eq!(
            packet.plist.get("kLibUSBMuxVersion").and_then(|v| v.as_signed_integer()),
            Some(LIB_USBMUX_VERSION)
        );
    }

    #[tokio::test]
    async fn frame_round_trips_through_the_wire_format() {
        let mut req = plist::Dictionary::new();
        req.insert("MessageType".into(), "Listen".into());
        let packet = RawPacket::request(req, 7);
        let bytes: Vec<u8> = packet.into();

        let mut cursor = std::io::Cursor::new(bytes);
        let (version, message_type, tag, dict) = RawPacket::read_from(&mut cursor).await.unwrap();
        assert_eq!(version, RawPacket::XML_PLIST_VERSION);
        assert_eq!(message_type, RawPacket::PLIST_MESSAGE_TYPE);
        assert_eq!(tag, 7);
        assert_eq!(dict.get("MessageType").and_then(|v| v.as_string()), Some("Listen"));
        assert_eq!(dict.get("ProgName").and_then(|v| v.as_string()), Some(PROG_NAME));
    }
}
