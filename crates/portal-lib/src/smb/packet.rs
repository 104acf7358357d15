// ============================
// crates/portal-lib/src/smb/packet.rs
// ============================
//! Direct-TCP framing and the handful of SMB2 messages the probe needs.
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use super::SmbError;

/// `0xFE 'S' 'M' 'B'`
pub const SMB2_MAGIC: [u8; 4] = [0xFE, b'S', b'M', b'B'];
pub const HEADER_LEN: usize = 64;

/// Largest frame accepted from the server
const MAX_FRAME: usize = 1 << 20;

pub const NEGOTIATE: u16 = 0x0000;
pub const SESSION_SETUP: u16 = 0x0001;
pub const LOGOFF: u16 = 0x0002;

/// 2.0.2, 2.1, 3.0, 3.0.2
pub const DIALECTS: [u16; 4] = [0x0202, 0x0210, 0x0300, 0x0302];

/// NT status codes
pub mod status {
    pub const SUCCESS: u32 = 0x0000_0000;
    pub const PENDING: u32 = 0x0000_0103;
    pub const MORE_PROCESSING_REQUIRED: u32 = 0xC000_0016;
    pub const LOGON_FAILURE: u32 = 0xC000_006D;
    pub const PASSWORD_EXPIRED: u32 = 0xC000_0071;
    pub const PASSWORD_MUST_CHANGE: u32 = 0xC000_0224;
}

pub const SESSION_FLAG_IS_GUEST: u16 = 0x0001;
pub const SESSION_FLAG_IS_NULL: u16 = 0x0002;

const FLAG_SERVER_TO_REDIR: u32 = 0x0000_0001;
const FLAG_ASYNC: u32 = 0x0000_0002;

const SECURITY_MODE_SIGNING_ENABLED: u8 = 0x01;

/// The SMB2 header fields the probe reads or sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub command: u16,
    pub status: u32,
    pub flags: u32,
    pub message_id: u64,
    pub session_id: u64,
}

impl Header {
    pub fn request(command: u16, message_id: u64, session_id: u64) -> Self {
        Self {
            command,
            status: status::SUCCESS,
            flags: 0,
            message_id,
            session_id,
        }
    }

    pub fn is_response(&self) -> bool {
        self.flags & FLAG_SERVER_TO_REDIR != 0
    }

    /// Interim reply announcing that the real one follows
    pub fn is_interim(&self) -> bool {
        self.flags & FLAG_ASYNC != 0 && self.status == status::PENDING
    }

    pub fn write(&self, out: &mut Vec<u8>) -> std::io::Result<()> {
        out.extend_from_slice(&SMB2_MAGIC);
        out.write_u16::<LittleEndian>(HEADER_LEN as u16)?;
        // CreditCharge is reserved before the dialect is known
        out.write_u16::<LittleEndian>(u16::from(self.command != NEGOTIATE))?;
        out.write_u32::<LittleEndian>(self.status)?;
        out.write_u16::<LittleEndian>(self.command)?;
        out.write_u16::<LittleEndian>(8)?; // CreditRequest
        out.write_u32::<LittleEndian>(self.flags)?;
        out.write_u32::<LittleEndian>(0)?; // NextCommand
        out.write_u64::<LittleEndian>(self.message_id)?;
        out.write_u32::<LittleEndian>(0xFEFF)?; // ProcessId
        out.write_u32::<LittleEndian>(0)?; // TreeId
        out.write_u64::<LittleEndian>(self.session_id)?;
        out.extend_from_slice(&[0u8; 16]); // Signature
        Ok(())
    }

    pub fn parse(packet: &[u8]) -> Result<Self, SmbError> {
        if packet.len() < HEADER_LEN || packet[..4] != SMB2_MAGIC {
            return Err(SmbError::Malformed("not an SMB2 packet".to_string()));
        }
        Ok(Self {
            status: LittleEndian::read_u32(&packet[8..12]),
            command: LittleEndian::read_u16(&packet[12..14]),
            flags: LittleEndian::read_u32(&packet[16..20]),
            message_id: LittleEndian::read_u64(&packet[24..32]),
            session_id: LittleEndian::read_u64(&packet[40..48]),
        })
    }
}

/// NEGOTIATE request body
pub fn negotiate_request(client_guid: &[u8; 16]) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::with_capacity(36 + DIALECTS.len() * 2);
    body.write_u16::<LittleEndian>(36)?;
    body.write_u16::<LittleEndian>(DIALECTS.len() as u16)?;
    body.write_u16::<LittleEndian>(u16::from(SECURITY_MODE_SIGNING_ENABLED))?;
    body.write_u16::<LittleEndian>(0)?;
    body.write_u32::<LittleEndian>(0)?; // Capabilities
    body.extend_from_slice(client_guid);
    body.write_u64::<LittleEndian>(0)?; // ClientStartTime
    for dialect in DIALECTS {
        body.write_u16::<LittleEndian>(dialect)?;
    }
    Ok(body)
}

/// Dialect chosen in a NEGOTIATE response
pub fn negotiated_dialect(packet: &[u8]) -> Result<u16, SmbError> {
    let body = body(packet, 65)?;
    let dialect = read_u16(body, 4)?;
    if DIALECTS.contains(&dialect) {
        Ok(dialect)
    } else {
        Err(SmbError::Malformed(format!("server chose dialect {dialect:#06x}")))
    }
}

/// SESSION_SETUP request body carrying a security token
pub fn session_setup_request(security_blob: &[u8]) -> Result<Vec<u8>, SmbError> {
    let blob_len = u16::try_from(security_blob.len())
        .map_err(|_| SmbError::Malformed("security blob too large".to_string()))?;
    let mut body = Vec::with_capacity(24 + security_blob.len());
    body.write_u16::<LittleEndian>(25)?;
    body.write_u8(0)?; // Flags
    body.write_u8(SECURITY_MODE_SIGNING_ENABLED)?;
    body.write_u32::<LittleEndian>(0)?; // Capabilities
    body.write_u32::<LittleEndian>(0)?; // Channel
    body.write_u16::<LittleEndian>((HEADER_LEN + 24) as u16)?;
    body.write_u16::<LittleEndian>(blob_len)?;
    body.write_u64::<LittleEndian>(0)?; // PreviousSessionId
    body.extend_from_slice(security_blob);
    Ok(body)
}

/// The parts of a SESSION_SETUP response the probe needs
#[derive(Debug, Clone)]
pub struct SessionSetupResponse {
    pub session_flags: u16,
    pub security_blob: Vec<u8>,
}

impl SessionSetupResponse {
    pub fn parse(packet: &[u8]) -> Result<Self, SmbError> {
        let body = body(packet, 9)?;
        let session_flags = read_u16(body, 2)?;
        let offset = usize::from(read_u16(body, 4)?);
        let len = usize::from(read_u16(body, 6)?);
        let security_blob = if len == 0 {
            Vec::new()
        } else {
            packet
                .get(offset..offset + len)
                .ok_or_else(|| SmbError::Malformed("security buffer out of range".to_string()))?
                .to_vec()
        };
        Ok(Self {
            session_flags,
            security_blob,
        })
    }

    pub fn is_guest_or_anonymous(&self) -> bool {
        self.session_flags & (SESSION_FLAG_IS_GUEST | SESSION_FLAG_IS_NULL) != 0
    }
}

/// LOGOFF request body
pub fn logoff_request() -> Vec<u8> {
    vec![4, 0, 0, 0]
}

/// The body of a packet after checking its StructureSize
fn body(packet: &[u8], structure_size: u16) -> Result<&[u8], SmbError> {
    let body = packet
        .get(HEADER_LEN..)
        .ok_or_else(|| SmbError::Malformed("truncated packet".to_string()))?;
    let size = read_u16(body, 0)?;
    if size != structure_size {
        return Err(SmbError::Malformed(format!(
            "unexpected structure size {size}, wanted {structure_size}"
        )));
    }
    Ok(body)
}

fn read_u16(buf: &[u8], at: usize) -> Result<u16, SmbError> {
    buf.get(at..at + 2)
        .map(LittleEndian::read_u16)
        .ok_or_else(|| SmbError::Malformed("truncated field".to_string()))
}

/// Write one packet with its 4-byte direct-TCP length prefix
pub async fn send_frame<S>(stream: &mut S, packet: &[u8]) -> Result<(), SmbError>
where
    S: AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    if packet.len() > MAX_FRAME {
        return Err(SmbError::Malformed("frame too large".to_string()));
    }
    let len = packet.len() as u32;
    let mut frame = Vec::with_capacity(4 + packet.len());
    frame.push(0);
    frame.extend_from_slice(&len.to_be_bytes()[1..]);
    frame.extend_from_slice(packet);
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one length-prefixed packet
pub async fn recv_frame<S>(stream: &mut S) -> Result<Vec<u8>, SmbError>
where
    S: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await?;
    if prefix[0] != 0 {
        return Err(SmbError::Malformed(format!(
            "unexpected session message type {:#04x}",
            prefix[0]
        )));
    }
    let len = u32::from_be_bytes([0, prefix[1], prefix[2], prefix[3]]) as usize;
    if len > MAX_FRAME {
        return Err(SmbError::Malformed("frame too large".to_string()));
    }
    let mut packet = vec![0u8; len];
    stream.read_exact(&mut packet).await?;
    Ok(packet)
}

/// One SMB2 connection as the client sees it
pub struct Connection<S> {
    stream: S,
    next_message_id: u64,
    pub session_id: u64,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            next_message_id: 0,
            session_id: 0,
        }
    }

    /// Send a request and wait for its final response
    pub async fn request(&mut self, command: u16, body: &[u8]) -> Result<(Header, Vec<u8>), SmbError> {
        let message_id = self.next_message_id;
        self.next_message_id += 1;

        let mut packet = Vec::with_capacity(HEADER_LEN + body.len());
        Header::request(command, message_id, self.session_id).write(&mut packet)?;
        packet.extend_from_slice(body);
        send_frame(&mut self.stream, &packet).await?;

        loop {
            let reply = recv_frame(&mut self.stream).await?;
            let header = Header::parse(&reply)?;
            if !header.is_response() || header.message_id != message_id || header.command != command {
                return Err(SmbError::Malformed(format!(
                    "reply does not match request {message_id}"
                )));
            }
            if header.is_interim() {
                continue;
            }
            return Ok((header, reply));
        }
    }
}
