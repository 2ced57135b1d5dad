// Auth opcodes and result codes for the logon protocol

/// Client command opcodes this server answers. Everything else closes
/// the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthCmd {
    LogonChallenge = 0x00,
    LogonProof = 0x01,
    RealmList = 0x10,
}

impl AuthCmd {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0x00 => Some(AuthCmd::LogonChallenge),
            0x01 => Some(AuthCmd::LogonProof),
            0x10 => Some(AuthCmd::RealmList),
            _ => None,
        }
    }
}

/// Result codes the client understands in challenge/proof replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(dead_code)]
pub enum AuthResult {
    Success = 0x00,
    FailedBanned = 0x03,
    FailedUnknownAccount = 0x04,
    FailedIncorrectPassword = 0x05,
    FailedVersionInvalid = 0x09,
    FailedSuspended = 0x0C,
}

/// Account flag advertised in the post-BC proof reply.
pub const ACCOUNT_FLAG_PROPASS: u32 = 0x0080_0000;

/// Proof security flag: client answered with an authenticator token.
pub const SECURITY_FLAG_TOKEN: u8 = 0x04;

/// Client-specific anti-tamper blob echoed in every challenge reply;
/// clients compare it against a build-specific expected value.
pub const VERSION_CHALLENGE: [u8; 16] = [
    0xBA, 0xA3, 0x1E, 0x99, 0xA0, 0x0B, 0x21, 0x57,
    0xFC, 0x37, 0x3F, 0xB3, 0x69, 0xCD, 0xD2, 0xF1,
];

/// Maximum account name length accepted in the logon challenge.
pub const AUTH_LOGON_MAX_NAME: usize = 16;
