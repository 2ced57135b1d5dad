// Session - per-connection authentication state machine
//
// Bytes arrive in the read buffer; `on_read` pulls complete packets out,
// drives the SRP6 handshake against the account store and renders realm
// lists. Outgoing frames are queued and drained FIFO by the connection
// task that owns the socket.

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;

use logon_shared::Expansion;
use logon_shared::auth::{SessionKey, Srp6};
use logon_shared::util::{ByteBuffer, MessageBuffer};

use crate::auth_codes::{AuthCmd, AuthResult, SECURITY_FLAG_TOKEN};
use crate::protocol::{
    LogonChallenge, LogonProof, RealmListRequest, challenge_reply_failure,
    challenge_reply_success, proof_reply_failure, proof_reply_post_bc, proof_reply_pre_bc,
};
use crate::realm_list::{BuildCatalog, Realm, RealmCatalog, listing_for_build};
use crate::store::{Account, AccountStore};

/// Read timeout while the handshake is incomplete.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Failed proofs tolerated on one connection before it is dropped.
const MAX_PROOF_FAILURES: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitChallenge,
    AwaitProof,
    Authenticated,
    Closed,
}

/// Opcode dispatch table: which command is legal in which state. Scanned
/// linearly; opcodes not listed here drop the connection.
const HANDLERS: &[(AuthCmd, SessionState)] = &[
    (AuthCmd::LogonChallenge, SessionState::AwaitChallenge),
    (AuthCmd::LogonProof, SessionState::AwaitProof),
    (AuthCmd::RealmList, SessionState::Authenticated),
];

enum Step {
    Consumed,
    Pending,
}

pub struct Session<S> {
    state: SessionState,
    client_addr: IpAddr,
    read_buffer: MessageBuffer,
    write_queue: VecDeque<Bytes>,
    srp: Option<Srp6>,
    account: Option<Account>,
    build: u32,
    expansion: Expansion,
    session_key: Option<SessionKey>,
    proof_failures: u8,
    store: Arc<S>,
    builds: Arc<BuildCatalog>,
    realms: Arc<RealmCatalog>,
}

impl<S: AccountStore> Session<S> {
    pub fn new(
        client_addr: IpAddr,
        store: Arc<S>,
        builds: Arc<BuildCatalog>,
        realms: Arc<RealmCatalog>,
    ) -> Self {
        Session {
            state: SessionState::AwaitChallenge,
            client_addr,
            read_buffer: MessageBuffer::new(),
            write_queue: VecDeque::new(),
            srp: None,
            account: None,
            build: 0,
            expansion: Expansion::PostBc,
            session_key: None,
            proof_failures: 0,
            store,
            builds,
            realms,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    pub fn read_buffer_mut(&mut self) -> &mut MessageBuffer {
        &mut self.read_buffer
    }

    pub fn next_write(&mut self) -> Option<Bytes> {
        self.write_queue.pop_front()
    }

    fn queue_packet(&mut self, frame: Vec<u8>) {
        self.write_queue.push_back(Bytes::from(frame));
    }

    /// Consume every complete packet in the read buffer. Returns false
    /// when the connection must be dropped without further replies.
    pub async fn on_read(&mut self) -> bool {
        loop {
            if self.state == SessionState::Closed {
                return true;
            }

            let Some(&opcode) = self.read_buffer.read_slice().first() else {
                return true;
            };

            let Some((cmd, expected_state)) = AuthCmd::from_u8(opcode)
                .and_then(|cmd| HANDLERS.iter().find(|(c, _)| *c == cmd))
                .copied()
            else {
                tracing::debug!(
                    "Unknown opcode 0x{:02X} from {}, dropping connection",
                    opcode,
                    self.client_addr
                );
                self.read_buffer.reset();
                return false;
            };

            if expected_state != self.state {
                tracing::debug!(
                    "Opcode {:?} not allowed in state {:?} from {}",
                    cmd,
                    self.state,
                    self.client_addr
                );
                return false;
            }

            let result = match cmd {
                AuthCmd::LogonChallenge => self.handle_logon_challenge().await,
                AuthCmd::LogonProof => self.handle_logon_proof(),
                AuthCmd::RealmList => self.handle_realm_list().await,
            };

            match result {
                Ok(Step::Consumed) => continue,
                Ok(Step::Pending) => return true,
                Err(()) => return false,
            }
        }
    }

    async fn handle_logon_challenge(&mut self) -> Result<Step, ()> {
        let (challenge, consumed) = match LogonChallenge::decode(self.read_buffer.read_slice()) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return Ok(Step::Pending),
            Err(e) => {
                tracing::debug!("Malformed logon challenge from {}: {}", self.client_addr, e);
                return Err(());
            }
        };
        self.read_buffer.read_completed(consumed);

        tracing::trace!(
            "Logon challenge from '{}' build {}",
            challenge.account_name,
            challenge.build
        );

        let build = challenge.build as u32;
        if self.builds.find(build).is_none() {
            tracing::info!(
                "Account '{}' tried to login with unsupported client build {}",
                challenge.account_name,
                build
            );
            self.queue_packet(challenge_reply_failure(AuthResult::FailedVersionInvalid));
            self.state = SessionState::Closed;
            return Ok(Step::Consumed);
        }

        let account = match self.store.find_account(&challenge.account_name).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                tracing::info!("Unknown account '{}' from {}", challenge.account_name, self.client_addr);
                self.queue_packet(challenge_reply_failure(AuthResult::FailedUnknownAccount));
                self.state = SessionState::Closed;
                return Ok(Step::Consumed);
            }
            Err(e) => {
                tracing::error!("Account lookup failed for '{}': {}", challenge.account_name, e);
                return Err(());
            }
        };

        let srp = Srp6::new(&account.username, &account.salt, &account.verifier);
        self.queue_packet(challenge_reply_success(&srp.public_ephemeral(), srp.salt()));

        self.build = build;
        self.expansion = Expansion::from_build(build);
        self.account = Some(account);
        self.srp = Some(srp);
        self.state = SessionState::AwaitProof;
        Ok(Step::Consumed)
    }

    fn handle_logon_proof(&mut self) -> Result<Step, ()> {
        let Some((proof, consumed)) = LogonProof::decode(self.read_buffer.read_slice()) else {
            return Ok(Step::Pending);
        };
        self.read_buffer.read_completed(consumed);

        if proof.security_flags & SECURITY_FLAG_TOKEN != 0 {
            // Authenticator tokens are not supported; the client retries
            // on this result. The SRP6 context stays untouched.
            self.queue_packet(proof_reply_failure());
            return Ok(Step::Consumed);
        }

        let Some(srp) = self.srp.as_mut() else {
            return Err(());
        };

        match srp.verify_challenge(&proof.a, &proof.m1) {
            Some(key) => {
                let m2 = Srp6::server_proof(&proof.a, &proof.m1, &key);
                let reply = match self.expansion {
                    Expansion::PreBc => proof_reply_pre_bc(&m2),
                    Expansion::PostBc => proof_reply_post_bc(&m2),
                };
                self.queue_packet(reply);
                self.session_key = Some(key);
                self.state = SessionState::Authenticated;

                if let Some(account) = &self.account {
                    tracing::info!("User '{}' successfully authenticated", account.username);
                }
            }
            None => {
                self.proof_failures += 1;
                if let Some(account) = &self.account {
                    tracing::info!(
                        "User '{}' failed the password proof ({} of {})",
                        account.username,
                        self.proof_failures,
                        MAX_PROOF_FAILURES
                    );
                }
                self.queue_packet(proof_reply_failure());
                if self.proof_failures >= MAX_PROOF_FAILURES {
                    self.state = SessionState::Closed;
                }
            }
        }
        Ok(Step::Consumed)
    }

    async fn handle_realm_list(&mut self) -> Result<Step, ()> {
        let Some((_, consumed)) = RealmListRequest::decode(self.read_buffer.read_slice()) else {
            return Ok(Step::Pending);
        };
        self.read_buffer.read_completed(consumed);

        let account_id = self.account.as_ref().map(|a| a.id).ok_or(())?;
        let characters = match self.store.characters_per_realm(account_id).await {
            Ok(characters) => characters,
            Err(e) => {
                tracing::error!("Character count lookup failed: {}", e);
                return Err(());
            }
        };

        let snapshot = self.realms.snapshot();
        let payload = render_realm_list(
            snapshot.values(),
            &characters,
            self.build,
            self.expansion,
            &self.builds,
            self.client_addr,
        );

        let mut pkt = ByteBuffer::with_capacity(payload.size() + 3);
        pkt.write_u8(AuthCmd::RealmList as u8);
        pkt.write_u16(payload.size() as u16);
        pkt.append(payload.contents());
        self.queue_packet(pkt.into_inner());
        Ok(Step::Consumed)
    }
}

/// Render the realm list payload (everything after the opcode and size
/// field) for one client.
fn render_realm_list<'a>(
    realms: impl Iterator<Item = &'a Realm>,
    characters: &std::collections::HashMap<u32, u8>,
    client_build: u32,
    expansion: Expansion,
    builds: &BuildCatalog,
    client_addr: IpAddr,
) -> ByteBuffer {
    let listings: Vec<_> = realms
        .filter_map(|realm| listing_for_build(realm, client_build, builds, expansion))
        .collect();

    let mut pkt = ByteBuffer::new();
    pkt.write_u32(0);

    match expansion {
        Expansion::PreBc => {
            pkt.write_u8(listings.len() as u8);
            for listing in &listings {
                let endpoint = listing.realm.address_for_client(client_addr);
                pkt.write_u32(listing.realm.realm_type as u32);
                pkt.write_u8(listing.flags);
                pkt.write_cstring(&listing.display_name);
                pkt.write_cstring(&endpoint.to_string());
                pkt.write_f32(listing.realm.population);
                pkt.write_u8(*characters.get(&listing.realm.id).unwrap_or(&0));
                pkt.write_u8(listing.realm.category);
                pkt.write_u8(0x00);
            }
            pkt.write_u16(0x0002);
        }
        Expansion::PostBc => {
            pkt.write_u16(listings.len() as u16);
            for listing in &listings {
                let endpoint = listing.realm.address_for_client(client_addr);
                pkt.write_u8(listing.realm.realm_type);
                pkt.write_u8(0x01);
                pkt.write_u8(listing.flags);
                pkt.write_cstring(&listing.display_name);
                pkt.write_cstring(&endpoint.to_string());
                pkt.write_f32(listing.realm.population);
                pkt.write_u8(*characters.get(&listing.realm.id).unwrap_or(&0));
                pkt.write_u8(listing.realm.category);
                pkt.write_u8(listing.realm.id as u8);

                if let Some(info) = listing.build_override {
                    pkt.write_u8(info.major as u8);
                    pkt.write_u8(info.minor as u8);
                    pkt.write_u8(info.revision as u8);
                    pkt.write_u16(info.build as u16);
                }
            }
            pkt.write_u16(0x0010);
        }
    }
    pkt
}

/// Own one accepted socket: drain queued frames, read more bytes, feed
/// the state machine, until the session closes or shutdown is signalled.
pub async fn handle_connection<S: AccountStore + 'static>(
    mut stream: TcpStream,
    addr: SocketAddr,
    store: Arc<S>,
    builds: Arc<BuildCatalog>,
    realms: Arc<RealmCatalog>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("Connected: {}", addr);

    let mut session = Session::new(addr.ip(), store, builds, realms);

    'connection: loop {
        while let Some(frame) = session.next_write() {
            if let Err(e) = stream.write_all(&frame).await {
                tracing::error!("Write to {} failed: {}", addr, e);
                break 'connection;
            }
        }

        if session.state() == SessionState::Closed || *shutdown.borrow() {
            break;
        }

        let pre_auth = matches!(
            session.state(),
            SessionState::AwaitChallenge | SessionState::AwaitProof
        );

        session.read_buffer_mut().normalize();
        session.read_buffer_mut().ensure_free_space();

        let read_result = {
            let read = stream.read(session.read_buffer_mut().write_slice());
            tokio::select! {
                result = async {
                    if pre_auth {
                        match timeout(HANDSHAKE_TIMEOUT, read).await {
                            Ok(result) => result,
                            Err(_) => {
                                tracing::debug!("Handshake timeout from {}", addr);
                                Ok(0)
                            }
                        }
                    } else {
                        read.await
                    }
                } => result,
                _ = shutdown.changed() => break 'connection,
            }
        };

        match read_result {
            Ok(0) => break,
            Ok(bytes) => session.read_buffer_mut().write_completed(bytes),
            Err(e) => {
                tracing::error!("Read from {} failed: {}", addr, e);
                break;
            }
        }

        if !session.on_read().await {
            break;
        }
    }

    // Flush whatever the state machine queued before the drop.
    while let Some(frame) = session.next_write() {
        if stream.write_all(&frame).await.is_err() {
            break;
        }
    }
    let _ = stream.shutdown().await;

    tracing::debug!("Disconnected: {}", addr);
}
