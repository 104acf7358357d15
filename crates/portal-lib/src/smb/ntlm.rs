// ============================
// crates/portal-lib/src/smb/ntlm.rs
// ============================
//! NTLMSSP messages and NTLMv2 response computation (MS-NLMP).
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use zeroize::Zeroizing;

use super::SmbError;

/// "NTLMSSP\0"
pub const NTLMSSP_SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_MESSAGE: u32 = 1;
const CHALLENGE_MESSAGE: u32 = 2;
const AUTHENTICATE_MESSAGE: u32 = 3;

pub const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
pub const REQUEST_TARGET: u32 = 0x0000_0004;
pub const NEGOTIATE_NTLM: u32 = 0x0000_0200;
pub const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
pub const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
pub const NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
pub const NEGOTIATE_128: u32 = 0x2000_0000;
pub const NEGOTIATE_56: u32 = 0x8000_0000;

/// Flags offered in NEGOTIATE; no key exchange, signing or sealing is needed
pub const CLIENT_FLAGS: u32 = NEGOTIATE_UNICODE
    | REQUEST_TARGET
    | NEGOTIATE_NTLM
    | NEGOTIATE_ALWAYS_SIGN
    | NEGOTIATE_EXTENDED_SESSIONSECURITY
    | NEGOTIATE_TARGET_INFO
    | NEGOTIATE_128
    | NEGOTIATE_56;

/// AV_PAIR ids
const MSV_AV_EOL: u16 = 0;
const MSV_AV_TIMESTAMP: u16 = 7;

/// Seconds between 1601-01-01 and 1970-01-01, in 100ns ticks
const WINDOWS_EPOCH_DIFF: u64 = 116_444_736_000_000_000;

const AUTHENTICATE_HEADER_LEN: usize = 64;

type HmacMd5 = Hmac<Md5>;

fn utf16le(s: &str) -> Zeroizing<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    Zeroizing::new(out)
}

fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 16], SmbError> {
    let mut mac = HmacMd5::new_from_slice(key).map_err(|e| SmbError::Crypto(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// NTOWFv1: MD4 of the UTF-16LE password
pub fn nt_hash(password: &str) -> Zeroizing<[u8; 16]> {
    let mut hash = Zeroizing::new([0u8; 16]);
    hash.copy_from_slice(&Md4::digest(utf16le(password).as_slice()));
    hash
}

/// NTOWFv2: HMAC-MD5 keyed with the NT hash over `UPPER(user) || domain`
pub fn ntowf_v2(username: &str, domain: &str, password: &str) -> Result<Zeroizing<[u8; 16]>, SmbError> {
    let identity = utf16le(&format!("{}{domain}", username.to_uppercase()));
    Ok(Zeroizing::new(hmac_md5(nt_hash(password).as_slice(), &[&identity])?))
}

/// Current time as a Windows FILETIME
pub fn filetime_now() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    since_epoch.as_secs() * 10_000_000 + u64::from(since_epoch.subsec_nanos()) / 100 + WINDOWS_EPOCH_DIFF
}

/// The NTLMv2 client blob ("temp" in MS-NLMP)
pub fn client_blob(timestamp: u64, client_challenge: &[u8; 8], target_info: &[u8]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(32 + target_info.len());
    blob.extend_from_slice(&[0x01, 0x01, 0, 0, 0, 0, 0, 0]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(client_challenge);
    blob.extend_from_slice(&[0; 4]);
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&[0; 4]);
    blob
}

/// `NTProofStr || blob`
pub fn nt_response(
    ntowf: &[u8; 16],
    server_challenge: &[u8; 8],
    blob: &[u8],
) -> Result<Vec<u8>, SmbError> {
    let proof = hmac_md5(ntowf, &[server_challenge, blob])?;
    let mut response = proof.to_vec();
    response.extend_from_slice(blob);
    Ok(response)
}

/// LMv2: `HMAC(server || client) || client`
pub fn lm_response(
    ntowf: &[u8; 16],
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
) -> Result<Vec<u8>, SmbError> {
    let mut response = hmac_md5(ntowf, &[server_challenge, client_challenge])?.to_vec();
    response.extend_from_slice(client_challenge);
    Ok(response)
}

/// NEGOTIATE message without domain, workstation or version
pub fn negotiate_message() -> Vec<u8> {
    let mut msg = Vec::with_capacity(32);
    msg.extend_from_slice(NTLMSSP_SIGNATURE);
    msg.extend_from_slice(&NEGOTIATE_MESSAGE.to_le_bytes());
    msg.extend_from_slice(&CLIENT_FLAGS.to_le_bytes());
    msg.extend_from_slice(&[0; 16]);
    msg
}

/// A parsed server CHALLENGE message
#[derive(Debug, Clone)]
pub struct Challenge {
    pub flags: u32,
    pub server_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

impl Challenge {
    pub fn parse(msg: &[u8]) -> Result<Self, SmbError> {
        if msg.len() < 48 || !msg.starts_with(NTLMSSP_SIGNATURE) {
            return Err(SmbError::Malformed("not an NTLMSSP challenge".to_string()));
        }
        if LittleEndian::read_u32(&msg[8..12]) != CHALLENGE_MESSAGE {
            return Err(SmbError::Malformed("unexpected NTLMSSP message type".to_string()));
        }

        let flags = LittleEndian::read_u32(&msg[20..24]);
        let mut server_challenge = [0u8; 8];
        server_challenge.copy_from_slice(&msg[24..32]);

        let info_len = usize::from(LittleEndian::read_u16(&msg[40..42]));
        let info_offset = LittleEndian::read_u32(&msg[44..48]) as usize;
        let target_info = if info_len == 0 {
            Vec::new()
        } else {
            msg.get(info_offset..info_offset + info_len)
                .ok_or_else(|| SmbError::Malformed("target info out of range".to_string()))?
                .to_vec()
        };

        Ok(Self {
            flags,
            server_challenge,
            target_info,
        })
    }

    /// `MsvAvTimestamp` from the target info, if the server sent one
    pub fn timestamp(&self) -> Option<u64> {
        let mut rest = self.target_info.as_slice();
        while rest.len() >= 4 {
            let id = LittleEndian::read_u16(&rest[0..2]);
            let len = usize::from(LittleEndian::read_u16(&rest[2..4]));
            let value = rest.get(4..4 + len)?;
            match id {
                MSV_AV_EOL => return None,
                MSV_AV_TIMESTAMP if len == 8 => return Some(LittleEndian::read_u64(value)),
                _ => rest = &rest[4 + len..],
            }
        }
        None
    }
}

/// Who is authenticating
pub struct Identity<'a> {
    pub username: &'a str,
    pub domain: &'a str,
    pub workstation: &'a str,
    pub password: &'a str,
}

/// AUTHENTICATE message answering `challenge` with NTLMv2
pub fn authenticate_message(
    challenge: &Challenge,
    identity: &Identity<'_>,
    client_challenge: &[u8; 8],
) -> Result<Vec<u8>, SmbError> {
    let ntowf = ntowf_v2(identity.username, identity.domain, identity.password)?;

    // With a server timestamp present the LM response is zeroed
    let (timestamp, lm) = match challenge.timestamp() {
        Some(ts) => (ts, vec![0u8; 24]),
        None => (
            filetime_now(),
            lm_response(&ntowf, &challenge.server_challenge, client_challenge)?,
        ),
    };
    let blob = client_blob(timestamp, client_challenge, &challenge.target_info);
    let nt = nt_response(&ntowf, &challenge.server_challenge, &blob)?;

    let domain = utf16le(identity.domain);
    let user = utf16le(identity.username);
    let workstation = utf16le(identity.workstation);
    let payload: [&[u8]; 6] = [&lm, &nt, &domain, &user, &workstation, &[]];

    let mut msg = Vec::with_capacity(
        AUTHENTICATE_HEADER_LEN + payload.iter().map(|p| p.len()).sum::<usize>(),
    );
    msg.extend_from_slice(NTLMSSP_SIGNATURE);
    msg.write_u32::<LittleEndian>(AUTHENTICATE_MESSAGE)?;

    let mut offset = AUTHENTICATE_HEADER_LEN;
    for field in payload {
        let len = u16::try_from(field.len())
            .map_err(|_| SmbError::Malformed("authenticate field too large".to_string()))?;
        msg.write_u16::<LittleEndian>(len)?;
        msg.write_u16::<LittleEndian>(len)?;
        msg.write_u32::<LittleEndian>(offset as u32)?;
        offset += field.len();
    }
    msg.write_u32::<LittleEndian>(challenge.flags & CLIENT_FLAGS | NEGOTIATE_UNICODE)?;

    for field in payload {
        msg.extend_from_slice(field);
    }
    Ok(msg)
}

/// Fields of an AUTHENTICATE message, for the server side of tests
#[cfg(test)]
pub(crate) fn authenticate_fields(msg: &[u8]) -> Option<(String, String, Vec<u8>)> {
    let field = |at: usize| -> Option<&[u8]> {
        let len = usize::from(LittleEndian::read_u16(msg.get(at..at + 2)?));
        let offset = LittleEndian::read_u32(msg.get(at + 4..at + 8)?) as usize;
        msg.get(offset..offset + len)
    };
    let text = |bytes: &[u8]| {
        let units: Vec<u16> = bytes.chunks_exact(2).map(LittleEndian::read_u16).collect();
        String::from_utf16_lossy(&units)
    };
    Some((text(field(36)?), text(field(28)?), field(20)?.to_vec()))
}
