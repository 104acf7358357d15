// ============================
// crates/portal-lib/src/smb/spnego.rs
// ============================
//! Minimal SPNEGO (RFC 4178) wrapping around NTLMSSP tokens.
use super::ntlm::NTLMSSP_SIGNATURE;
use super::SmbError;

/// 1.3.6.1.5.5.2
const SPNEGO_OID: [u8; 6] = [0x2b, 0x06, 0x01, 0x05, 0x05, 0x02];
/// 1.3.6.1.4.1.311.2.2.10
const NTLMSSP_OID: [u8; 10] = [0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x02, 0x0a];

const APPLICATION_0: u8 = 0x60;
const SEQUENCE: u8 = 0x30;
const OID: u8 = 0x06;
const OCTET_STRING: u8 = 0x04;
const CONTEXT_0: u8 = 0xa0;
const CONTEXT_1: u8 = 0xa1;
const CONTEXT_2: u8 = 0xa2;

fn encode_len(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(tag);
    encode_len(content.len(), &mut out);
    out.extend_from_slice(content);
    out
}

/// Split one DER element off `buf`: `(tag, content, rest)`
fn read_tlv(buf: &[u8]) -> Result<(u8, &[u8], &[u8]), SmbError> {
    let malformed = || SmbError::Malformed("bad SPNEGO encoding".to_string());
    let (&tag, rest) = buf.split_first().ok_or_else(malformed)?;
    let (&first, rest) = rest.split_first().ok_or_else(malformed)?;

    let (len, rest) = if first < 0x80 {
        (usize::from(first), rest)
    } else {
        let n = usize::from(first & 0x7f);
        if n == 0 || n > 4 || rest.len() < n {
            return Err(malformed());
        }
        let len = rest[..n].iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
        (len, &rest[n..])
    };

    if rest.len() < len {
        return Err(malformed());
    }
    Ok((tag, &rest[..len], &rest[len..]))
}

/// NegTokenInit offering NTLMSSP, carrying the NEGOTIATE message
pub fn wrap_negotiate(ntlm: &[u8]) -> Vec<u8> {
    let mech_types = tlv(SEQUENCE, &tlv(OID, &NTLMSSP_OID));
    let mut init = tlv(CONTEXT_0, &mech_types);
    init.extend(tlv(CONTEXT_2, &tlv(OCTET_STRING, ntlm)));

    let mut body = tlv(OID, &SPNEGO_OID);
    body.extend(tlv(CONTEXT_0, &tlv(SEQUENCE, &init)));
    tlv(APPLICATION_0, &body)
}

/// NegTokenResp carrying the AUTHENTICATE message
pub fn wrap_response(ntlm: &[u8]) -> Vec<u8> {
    tlv(
        CONTEXT_1,
        &tlv(SEQUENCE, &tlv(CONTEXT_2, &tlv(OCTET_STRING, ntlm))),
    )
}

/// The NTLMSSP token inside a server NegTokenResp
///
/// Servers that skip SPNEGO send the raw token, which is passed through.
pub fn unwrap_response(token: &[u8]) -> Result<&[u8], SmbError> {
    if token.starts_with(NTLMSSP_SIGNATURE) {
        return Ok(token);
    }

    let (tag, resp, _) = read_tlv(token)?;
    if tag != CONTEXT_1 {
        return Err(SmbError::Malformed(format!("expected NegTokenResp, got tag {tag:#04x}")));
    }
    let (tag, mut fields, _) = read_tlv(resp)?;
    if tag != SEQUENCE {
        return Err(SmbError::Malformed("NegTokenResp is not a sequence".to_string()));
    }

    while !fields.is_empty() {
        let (tag, content, rest) = read_tlv(fields)?;
        if tag == CONTEXT_2 {
            let (tag, token, _) = read_tlv(content)?;
            if tag != OCTET_STRING {
                return Err(SmbError::Malformed("responseToken is not an octet string".to_string()));
            }
            return Ok(token);
        }
        fields = rest;
    }
    Err(SmbError::Malformed("NegTokenResp carries no responseToken".to_string()))
}
