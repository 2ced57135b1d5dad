// Wire protocol codecs for the logon protocol
//
// All integers are little-endian. Client packets decode from the raw read
// buffer without consuming on partial input: `Ok(None)` means the frame is
// not complete yet, an error means the frame can never become valid and
// the connection must be closed.

use logon_shared::auth::Srp6;
use logon_shared::util::ByteBuffer;
use thiserror::Error;

use crate::auth_codes::{ACCOUNT_FLAG_PROPASS, AUTH_LOGON_MAX_NAME, AuthCmd, AuthResult, VERSION_CHALLENGE};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("declared size {declared} out of bounds")]
    BadDeclaredSize { declared: u16 },
    #[error("declared size {declared} does not match account name length {name_len}")]
    NameLengthMismatch { declared: u16, name_len: u8 },
    #[error("account name is not printable ASCII")]
    BadAccountName,
}

/// `AUTH_LOGON_CHALLENGE` (0x00), client to server.
#[derive(Debug, Clone, PartialEq)]
pub struct LogonChallenge {
    pub protocol_version: u8,
    pub game_name: [u8; 4],
    pub version: [u8; 3],
    pub build: u16,
    pub platform: [u8; 4],
    pub os: [u8; 4],
    pub locale: [u8; 4],
    pub worldregion_bias: u32,
    pub ip: u32,
    pub account_name: String,
}

impl LogonChallenge {
    /// Header bytes before the size-counted body.
    pub const HEADER_SIZE: usize = 4;
    /// Fixed body bytes: everything the size field counts except the name.
    pub const FIXED_BODY_SIZE: usize = 30;
    /// Upper bound on a complete challenge frame.
    pub const MAX_SIZE: usize =
        Self::HEADER_SIZE + Self::FIXED_BODY_SIZE + AUTH_LOGON_MAX_NAME;

    /// Decode from the front of `data`. Returns the packet and the number
    /// of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<Option<(Self, usize)>, ProtocolError> {
        if data.len() < Self::HEADER_SIZE {
            return Ok(None);
        }

        let protocol_version = data[1];
        let declared = u16::from_le_bytes([data[2], data[3]]);

        // Bound the size before waiting for more bytes so a hostile
        // client cannot make the read buffer grow without limit.
        let min = Self::FIXED_BODY_SIZE as u16;
        let max = (Self::FIXED_BODY_SIZE + AUTH_LOGON_MAX_NAME) as u16;
        if declared < min || declared > max {
            return Err(ProtocolError::BadDeclaredSize { declared });
        }

        let total = Self::HEADER_SIZE + declared as usize;
        if data.len() < total {
            return Ok(None);
        }

        let name_len = data[33];
        if declared != Self::FIXED_BODY_SIZE as u16 + name_len as u16 {
            return Err(ProtocolError::NameLengthMismatch {
                declared,
                name_len,
            });
        }

        let name_bytes = &data[34..34 + name_len as usize];
        if !name_bytes.iter().all(|b| b.is_ascii_graphic()) {
            return Err(ProtocolError::BadAccountName);
        }

        let packet = LogonChallenge {
            protocol_version,
            game_name: data[4..8].try_into().expect("slice length"),
            version: data[8..11].try_into().expect("slice length"),
            build: u16::from_le_bytes([data[11], data[12]]),
            platform: data[13..17].try_into().expect("slice length"),
            os: data[17..21].try_into().expect("slice length"),
            locale: data[21..25].try_into().expect("slice length"),
            worldregion_bias: u32::from_le_bytes(data[25..29].try_into().expect("slice length")),
            ip: u32::from_le_bytes(data[29..33].try_into().expect("slice length")),
            account_name: String::from_utf8_lossy(name_bytes).into_owned(),
        };

        Ok(Some((packet, total)))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = ByteBuffer::with_capacity(Self::MAX_SIZE);
        buf.write_u8(AuthCmd::LogonChallenge as u8);
        buf.write_u8(self.protocol_version);
        buf.write_u16(Self::FIXED_BODY_SIZE as u16 + self.account_name.len() as u16);
        buf.append(&self.game_name);
        buf.append(&self.version);
        buf.write_u16(self.build);
        buf.append(&self.platform);
        buf.append(&self.os);
        buf.append(&self.locale);
        buf.write_u32(self.worldregion_bias);
        buf.write_u32(self.ip);
        buf.write_u8(self.account_name.len() as u8);
        buf.append(self.account_name.as_bytes());
        buf.into_inner()
    }
}

/// `AUTH_LOGON_PROOF` (0x01), client to server. Fixed length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogonProof {
    pub a: [u8; 32],
    pub m1: [u8; 20],
    pub crc_hash: [u8; 20],
    pub number_of_keys: u8,
    pub security_flags: u8,
}

impl LogonProof {
    pub const SIZE: usize = 1 + 32 + 20 + 20 + 1 + 1;

    pub fn decode(data: &[u8]) -> Option<(Self, usize)> {
        if data.len() < Self::SIZE {
            return None;
        }
        let packet = LogonProof {
            a: data[1..33].try_into().expect("slice length"),
            m1: data[33..53].try_into().expect("slice length"),
            crc_hash: data[53..73].try_into().expect("slice length"),
            number_of_keys: data[73],
            security_flags: data[74],
        };
        Some((packet, Self::SIZE))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = ByteBuffer::with_capacity(Self::SIZE);
        buf.write_u8(AuthCmd::LogonProof as u8);
        buf.append(&self.a);
        buf.append(&self.m1);
        buf.append(&self.crc_hash);
        buf.write_u8(self.number_of_keys);
        buf.write_u8(self.security_flags);
        buf.into_inner()
    }
}

/// `REALMLIST` (0x10), client to server: opcode plus four pad bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RealmListRequest;

impl RealmListRequest {
    pub const SIZE: usize = 5;

    pub fn decode(data: &[u8]) -> Option<(Self, usize)> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some((RealmListRequest, Self::SIZE))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        vec![AuthCmd::RealmList as u8, 0, 0, 0, 0]
    }
}

/// Challenge reply carrying the SRP6 parameters.
pub fn challenge_reply_success(b_pub: &[u8; 32], salt: &[u8; 32]) -> Vec<u8> {
    let mut pkt = ByteBuffer::with_capacity(119);
    pkt.write_u8(AuthCmd::LogonChallenge as u8);
    pkt.write_u8(0x00);
    pkt.write_u8(AuthResult::Success as u8);
    pkt.append(b_pub);
    pkt.write_u8(1);
    pkt.write_u8(Srp6::generator().as_u32() as u8);
    pkt.write_u8(32);
    pkt.append(&Srp6::prime().as_byte_array(32));
    pkt.append(salt);
    pkt.append(&VERSION_CHALLENGE);
    pkt.write_u8(0x00);
    pkt.into_inner()
}

/// Challenge reply for a failed lookup or build check.
pub fn challenge_reply_failure(result: AuthResult) -> Vec<u8> {
    vec![AuthCmd::LogonChallenge as u8, 0x00, result as u8]
}

/// Proof reply on SRP6 mismatch; the trailing u16 pads the frame to the
/// shape post-1.x clients expect.
pub fn proof_reply_failure() -> Vec<u8> {
    vec![
        AuthCmd::LogonProof as u8,
        AuthResult::FailedUnknownAccount as u8,
        0x00,
        0x00,
    ]
}

/// Proof reply for pre-Burning-Crusade clients.
pub fn proof_reply_pre_bc(m2: &[u8; 20]) -> Vec<u8> {
    let mut pkt = ByteBuffer::with_capacity(26);
    pkt.write_u8(AuthCmd::LogonProof as u8);
    pkt.write_u8(AuthResult::Success as u8);
    pkt.append(m2);
    pkt.write_u32(0); // hardware survey id
    pkt.into_inner()
}

/// Proof reply for 2.x+ clients.
pub fn proof_reply_post_bc(m2: &[u8; 20]) -> Vec<u8> {
    let mut pkt = ByteBuffer::with_capacity(32);
    pkt.write_u8(AuthCmd::LogonProof as u8);
    pkt.write_u8(AuthResult::Success as u8);
    pkt.append(m2);
    pkt.write_u32(ACCOUNT_FLAG_PROPASS);
    pkt.write_u32(0); // hardware survey id
    pkt.write_u16(0); // unknown flags
    pkt.into_inner()
}
