//! Command handlers module for the jailed FTP server.
//!
//! Every verb is served by a [`CommandHandler`]. Handlers receive the
//! session, its control channel and the shared environment through a
//! [`CommandContext`] and return a [`CommandResult`] whose reply the control
//! loop writes. Data commands (LIST, RETR, STOR) write their own `150`
//! preliminary reply and block on the data connection before returning.

use async_trait::async_trait;
use chrono::Local;
use log::{error, info, warn};
use tokio::fs::File;

use crate::client::{ControlChannel, Session, SessionEnv, TransferType};
use crate::error::{AuthError, SandboxError, TransferError};
use crate::protocol::commands::CommandResult;
use crate::protocol::responses::*;
use crate::storage::{self, listing};
use crate::transfer::{DataOp, PassiveTransport, ipv4_of, pasv_tuple};

/// Everything a handler may touch while serving one command.
pub struct CommandContext<'a> {
    pub session: &'a mut Session,
    pub control: &'a mut ControlChannel,
    pub env: &'a SessionEnv,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Whether the verb is rejected with 530 before login.
    fn requires_auth(&self) -> bool {
        true
    }

    async fn handle(&self, cx: &mut CommandContext<'_>, arg: &str) -> CommandResult;
}

// --------------------
// Session and login
// --------------------

pub struct UserHandler;

#[async_trait]
impl CommandHandler for UserHandler {
    fn requires_auth(&self) -> bool {
        false
    }

    async fn handle(&self, cx: &mut CommandContext<'_>, arg: &str) -> CommandResult {
        let user = arg.trim();
        cx.session.set_user(user);

        if user.is_empty() {
            return CommandResult::failure(Reply::standard(NEED_ACCOUNT), "empty user name");
        }
        CommandResult::success(Reply::new(
            PASSWORD_REQUIRED,
            format!("Password required for {user}."),
        ))
    }
}

pub struct PassHandler;

#[async_trait]
impl CommandHandler for PassHandler {
    fn requires_auth(&self) -> bool {
        false
    }

    async fn handle(&self, cx: &mut CommandContext<'_>, arg: &str) -> CommandResult {
        let peer = cx.session.peer();
        let Some(user) = cx.session.user().map(str::to_owned) else {
            return CommandResult::failure(
                Reply::new(NOT_LOGGED_IN, "Login with USER first."),
                "PASS without USER",
            );
        };

        let account = match cx.env.accounts().authenticate(&user, arg) {
            Ok(account) => account,
            Err(e) => {
                warn!("Failed login from {peer}: {e}");
                return CommandResult::failure(Reply::new(NOT_LOGGED_IN, "Login incorrect."), e.to_string());
            }
        };

        let home = account.home_in(cx.env.server_root());
        let home = match tokio::fs::canonicalize(&home).await {
            Ok(home) => home,
            Err(source) => {
                let e = AuthError::HomeUnavailable {
                    user,
                    path: home,
                    source,
                };
                error!("{e}");
                return CommandResult::failure(
                    Reply::new(NOT_LOGGED_IN, "Home directory unavailable."),
                    e.to_string(),
                );
            }
        };
        let is_dir = matches!(tokio::fs::metadata(&home).await, Ok(m) if m.is_dir());
        if !is_dir || !home.starts_with(cx.env.server_root()) {
            error!("Home {} of user {user} is not a directory inside the server root", home.display());
            return CommandResult::failure(
                Reply::new(NOT_LOGGED_IN, "Home directory unavailable."),
                "home outside server root",
            );
        }

        info!("User {user} logged in from {peer}, root {}", home.display());
        cx.session.login(home);
        CommandResult::success(Reply::new(LOGIN_SUCCESS, format!("User {user} logged in.")))
    }
}

pub struct SystHandler;

#[async_trait]
impl CommandHandler for SystHandler {
    fn requires_auth(&self) -> bool {
        false
    }

    async fn handle(&self, _cx: &mut CommandContext<'_>, _arg: &str) -> CommandResult {
        CommandResult::success(Reply::new(SYSTEM_TYPE, "UNIX Type: L8"))
    }
}

pub struct FeatHandler;

#[async_trait]
impl CommandHandler for FeatHandler {
    fn requires_auth(&self) -> bool {
        false
    }

    async fn handle(&self, _cx: &mut CommandContext<'_>, _arg: &str) -> CommandResult {
        CommandResult::success(Reply::multiline(
            SYSTEM_STATUS,
            &["Features:", " PASV", " SIZE", " TYPE A;I", "End"],
        ))
    }
}

/// Handles QUIT: the only command that ends the session loop.
pub struct QuitHandler;

#[async_trait]
impl CommandHandler for QuitHandler {
    fn requires_auth(&self) -> bool {
        false
    }

    async fn handle(&self, cx: &mut CommandContext<'_>, _arg: &str) -> CommandResult {
        info!("Client {} requested to quit", cx.session.peer());
        CommandResult::close(Some(Reply::new(CLOSING, "Goodbye.")))
    }
}

pub struct NoopHandler;

#[async_trait]
impl CommandHandler for NoopHandler {
    async fn handle(&self, _cx: &mut CommandContext<'_>, _arg: &str) -> CommandResult {
        CommandResult::success(Reply::standard(OK))
    }
}

pub struct TypeHandler;

#[async_trait]
impl CommandHandler for TypeHandler {
    async fn handle(&self, cx: &mut CommandContext<'_>, arg: &str) -> CommandResult {
        let (transfer_type, shown) = match arg.trim().to_ascii_uppercase().as_str() {
            "I" | "L 8" => (TransferType::Binary, "I"),
            "A" | "A N" => (TransferType::Ascii, "A"),
            _ => {
                return CommandResult::failure(
                    Reply::standard(PARAM_NOT_IMPLEMENTED),
                    format!("unsupported type {arg:?}"),
                );
            }
        };

        cx.session.set_transfer_type(transfer_type);
        CommandResult::success(Reply::new(OK, format!("Type set to {shown}.")))
    }
}

// --------------------
// Passive mode
// --------------------

/// Handles PASV: opens a fresh listener and replaces any pending one.
pub struct PasvHandler;

impl PasvHandler {
    async fn open(cx: &mut CommandContext<'_>) -> Result<String, TransferError> {
        let config = cx.env.config();
        let bind_ip = cx.control.local().ip();
        let advertised = config
            .pasv_ipv4()
            .or_else(|| ipv4_of(bind_ip))
            .ok_or(TransferError::NotIpv4(bind_ip))?;

        // The old listener stays bound during the scan so the new port differs,
        // unless it holds the last free port of the window.
        let transport = match PassiveTransport::open(
            bind_ip,
            config.passive_ports(),
            config.passive_bind_attempts,
        )
        .await
        {
            Err(TransferError::NoPortAvailable { .. }) if cx.session.has_transport() => {
                if let Some(mut previous) = cx.session.take_transport() {
                    previous.close().await;
                }
                PassiveTransport::open(bind_ip, config.passive_ports(), 1).await?
            }
            result => result?,
        };
        let port = transport.port();

        if let Some(mut previous) = cx.session.replace_transport(transport) {
            previous.close().await;
        }

        info!("Passive listener for {} on port {port}", cx.session.peer());
        Ok(pasv_tuple(advertised, port))
    }
}

#[async_trait]
impl CommandHandler for PasvHandler {
    async fn handle(&self, cx: &mut CommandContext<'_>, _arg: &str) -> CommandResult {
        match Self::open(cx).await {
            Ok(tuple) => CommandResult::success(Reply::new(
                PASSIVE_MODE,
                format!("Entering Passive Mode ({tuple})."),
            )),
            Err(e) => {
                error!("PASV failed for {}: {e}", cx.session.peer());
                CommandResult::failure(Reply::standard(LOCAL_ERROR), e.to_string())
            }
        }
    }
}

// --------------------
// Navigation
// --------------------

pub struct CwdHandler;

#[async_trait]
impl CommandHandler for CwdHandler {
    async fn handle(&self, cx: &mut CommandContext<'_>, arg: &str) -> CommandResult {
        let session = &mut *cx.session;
        let target = storage::resolve(session.root(), session.current_path(), arg);

        match storage::validate_dir(session.root(), &target).await {
            Ok(path) => {
                let shown = storage::display_path(session.root(), &path);
                session.set_current_path(path);
                CommandResult::success(Reply::new(
                    FILE_ACTION_OK,
                    format!("Directory changed to {shown}"),
                ))
            }
            Err(e) => path_rejected(session, "CWD", e),
        }
    }
}

/// CDUP is CWD "..".
pub struct CdupHandler;

#[async_trait]
impl CommandHandler for CdupHandler {
    async fn handle(&self, cx: &mut CommandContext<'_>, _arg: &str) -> CommandResult {
        CwdHandler.handle(cx, "..").await
    }
}

pub struct PwdHandler;

#[async_trait]
impl CommandHandler for PwdHandler {
    async fn handle(&self, cx: &mut CommandContext<'_>, _arg: &str) -> CommandResult {
        let session = &*cx.session;
        match storage::validate_dir(session.root(), session.current_path()).await {
            Ok(path) => CommandResult::success(Reply::new(
                PATHNAME,
                format!("\"{}\" is the current directory", storage::display_path(session.root(), &path)),
            )),
            Err(e) => path_rejected(session, "PWD", e),
        }
    }
}

pub struct SizeHandler;

#[async_trait]
impl CommandHandler for SizeHandler {
    async fn handle(&self, cx: &mut CommandContext<'_>, arg: &str) -> CommandResult {
        let session = &*cx.session;
        let target = storage::resolve(session.root(), session.current_path(), arg);
        let path = match storage::validate_file(session.root(), &target).await {
            Ok(path) => path,
            Err(e) => return path_rejected(session, "SIZE", e),
        };

        match tokio::fs::metadata(&path).await {
            Ok(metadata) => CommandResult::success(Reply::new(FILE_STATUS, metadata.len().to_string())),
            Err(e) => CommandResult::failure(Reply::standard(FILE_UNAVAILABLE), e.to_string()),
        }
    }
}

// --------------------
// Data commands
// --------------------

pub struct ListHandler;

#[async_trait]
impl CommandHandler for ListHandler {
    async fn handle(&self, cx: &mut CommandContext<'_>, arg: &str) -> CommandResult {
        let session = &*cx.session;
        let target = storage::resolve(session.root(), session.current_path(), strip_list_flags(arg));
        let path = match storage::validate(session.root(), &target).await {
            Ok(path) => path,
            Err(e) => return path_rejected(session, "LIST", e),
        };

        let Some(mut transport) = cx.session.take_transport() else {
            return no_transport();
        };

        let entries = match storage::collect_entries(&path).await {
            Ok(entries) => entries,
            Err(e) => {
                transport.close().await;
                return local_error(TransferError::Local(e));
            }
        };

        let payload = listing::render(&entries, Local::now());
        run_transfer(cx, transport, DataOp::Listing(payload)).await
    }
}

pub struct RetrHandler;

#[async_trait]
impl CommandHandler for RetrHandler {
    async fn handle(&self, cx: &mut CommandContext<'_>, arg: &str) -> CommandResult {
        let session = &*cx.session;
        let target = storage::resolve(session.root(), session.current_path(), arg);
        let path = match storage::validate_file(session.root(), &target).await {
            Ok(path) => path,
            Err(e) => return path_rejected(session, "RETR", e),
        };

        let Some(mut transport) = cx.session.take_transport() else {
            return no_transport();
        };

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) => {
                transport.close().await;
                return local_error(TransferError::Local(e));
            }
        };

        info!("Sending {} to {}", path.display(), cx.session.peer());
        run_transfer(cx, transport, DataOp::Download(file)).await
    }
}

/// Handles STOR: creates or truncates the target, which may sit directly below the root.
pub struct StorHandler;

#[async_trait]
impl CommandHandler for StorHandler {
    async fn handle(&self, cx: &mut CommandContext<'_>, arg: &str) -> CommandResult {
        let session = &*cx.session;
        let path = match storage::resolve_upload(session.root(), session.current_path(), arg).await {
            Ok(path) => path,
            Err(e) => {
                warn!("STOR {arg:?} rejected for {}: {e}", session.peer());
                return CommandResult::failure(Reply::standard(NAME_NOT_ALLOWED), e.to_string());
            }
        };

        let Some(mut transport) = cx.session.take_transport() else {
            return no_transport();
        };

        let file = match File::create(&path).await {
            Ok(file) => file,
            Err(e) => {
                transport.close().await;
                return local_error(TransferError::Local(e));
            }
        };

        info!("Receiving {} from {}", path.display(), cx.session.peer());
        run_transfer(cx, transport, DataOp::Upload(file)).await
    }
}

/// Sends `150`, accepts the data connection and runs `op`, giving up as soon
/// as the control connection closes. The transport is closed in every case.
async fn run_transfer(
    cx: &mut CommandContext<'_>,
    mut transport: PassiveTransport,
    op: DataOp,
) -> CommandResult {
    let peer = cx.session.peer();
    let what = op.describe();
    let buffer_size = cx.env.config().transfer_buffer_size;

    let opening = Reply::new(ABOUT_TO_OPEN, format!("Opening data connection for {what}."));
    if let Err(e) = cx.control.send(&opening).await {
        transport.close().await;
        warn!("Failed to write to {peer}: {e}");
        return CommandResult::close(None);
    }

    let outcome = tokio::select! {
        result = async {
            match transport.accept(Some(peer.ip())).await {
                Ok(stream) => op.run(stream, buffer_size).await,
                Err(e) => Err(e),
            }
        } => Some(result),
        _ = cx.control.closed() => None,
    };
    transport.close().await;

    match outcome {
        Some(Ok(bytes)) => {
            info!("Completed {what} of {bytes} bytes for {peer}");
            CommandResult::success(Reply::new(TRANSFER_COMPLETE, "Transfer complete."))
        }
        Some(Err(e)) => {
            warn!("{what} for {peer} failed: {e}");
            CommandResult::failure(Reply::standard(e.reply_code()), e.to_string())
        }
        None => {
            info!("Control connection of {peer} closed during {what}, transfer abandoned");
            CommandResult::close(None)
        }
    }
}

/// Drops the `-la` style options clients send with LIST.
fn strip_list_flags(arg: &str) -> &str {
    let mut rest = arg.trim_start();
    while rest.starts_with('-') {
        rest = match rest.split_once(' ') {
            Some((_, tail)) => tail.trim_start(),
            None => "",
        };
    }
    rest
}

fn path_rejected(session: &Session, verb: &str, e: SandboxError) -> CommandResult {
    warn!("{verb} rejected for {}: {e}", session.peer());
    CommandResult::failure(Reply::standard(e.reply_code()), e.to_string())
}

fn no_transport() -> CommandResult {
    let e = TransferError::NoPassiveTransport;
    CommandResult::failure(Reply::new(e.reply_code(), "Use PASV first."), e.to_string())
}

fn local_error(e: TransferError) -> CommandResult {
    error!("{e}");
    CommandResult::failure(Reply::standard(e.reply_code()), e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountStore;
    use crate::config::{PathProfile, ServerConfig};
    use crate::protocol::CommandStatus;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::net::{TcpListener, TcpStream};

    struct Rig {
        _dir: TempDir,
        _client: TcpStream,
        session: Session,
        control: ControlChannel,
        env: SessionEnv,
    }

    impl Rig {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::create_dir_all(dir.path().join("alice/docs")).unwrap();
            fs::write(dir.path().join("alice/docs/notes.txt"), b"12345").unwrap();
            fs::write(dir.path().join("secret.txt"), b"top").unwrap();

            let mut config = ServerConfig::defaults(PathProfile::Native);
            config.server_root = dir.path().to_string_lossy().into_owned();
            let accounts = AccountStore::parse("alice secret /alice\n");
            let env = SessionEnv::new(Arc::new(config), Arc::new(accounts))
                .await
                .unwrap();

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
            let (server, peer) = listener.accept().await.unwrap();
            let control = ControlChannel::new(server, 512).unwrap();
            let session = Session::new(peer, env.server_root().to_path_buf());

            Self {
                _dir: dir,
                _client: client,
                session,
                control,
                env,
            }
        }

        async fn run(&mut self, handler: &dyn CommandHandler, arg: &str) -> CommandResult {
            let mut cx = CommandContext {
                session: &mut self.session,
                control: &mut self.control,
                env: &self.env,
            };
            handler.handle(&mut cx, arg).await
        }

        async fn login(&mut self) {
            self.run(&UserHandler, "alice").await;
            let result = self.run(&PassHandler, "secret").await;
            assert_eq!(result.status, CommandStatus::Success);
        }

        fn home(&self) -> PathBuf {
            self.env.server_root().join("alice")
        }
    }

    fn code(result: &CommandResult) -> u16 {
        result.reply.as_ref().map(|r| r.code).unwrap_or_default()
    }

    #[tokio::test]
    async fn login_jails_session_to_account_root() {
        let mut rig = Rig::new().await;
        assert_eq!(code(&rig.run(&UserHandler, "alice").await), 331);
        assert_eq!(code(&rig.run(&PassHandler, "secret").await), 230);
        assert!(rig.session.is_authenticated());
        assert_eq!(rig.session.root(), rig.home());
        assert_eq!(rig.session.current_path(), rig.home());
    }

    #[tokio::test]
    async fn wrong_password_keeps_state() {
        let mut rig = Rig::new().await;
        rig.run(&UserHandler, "alice").await;
        let result = rig.run(&PassHandler, "wrong").await;
        assert_eq!(code(&result), 530);
        assert!(matches!(result.status, CommandStatus::Failure(_)));
        assert_eq!(rig.session.auth_state(), crate::client::AuthState::UsernameGiven);
    }

    #[tokio::test]
    async fn empty_user_needs_account() {
        let mut rig = Rig::new().await;
        assert_eq!(code(&rig.run(&UserHandler, "").await), 332);
        assert_eq!(rig.session.auth_state(), crate::client::AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn cwd_cannot_escape_root() {
        let mut rig = Rig::new().await;
        rig.login().await;

        let result = rig.run(&CwdHandler, "docs").await;
        assert_eq!(
            result.reply.unwrap().text,
            "Directory changed to /docs"
        );

        for escape in ["../..", "/../", "/docs/../../", "../../secret.txt"] {
            let before = rig.session.current_path().to_path_buf();
            assert_eq!(code(&rig.run(&CwdHandler, escape).await), 550, "{escape}");
            assert_eq!(rig.session.current_path(), before);
            assert!(rig.session.current_path().starts_with(rig.session.root()));
        }

        assert_eq!(code(&rig.run(&CdupHandler, "").await), 250);
        assert_eq!(rig.session.current_path(), rig.home());
        assert_eq!(code(&rig.run(&CdupHandler, "").await), 550);
    }

    #[tokio::test]
    async fn pwd_reports_relative_path() {
        let mut rig = Rig::new().await;
        rig.login().await;
        let result = rig.run(&PwdHandler, "").await;
        assert_eq!(result.reply.unwrap().text, "\"/\" is the current directory");

        rig.run(&CwdHandler, "/docs").await;
        let result = rig.run(&PwdHandler, "").await;
        assert_eq!(result.reply.unwrap().text, "\"/docs\" is the current directory");
    }

    #[tokio::test]
    async fn type_accepts_only_ascii_and_image() {
        let mut rig = Rig::new().await;
        assert_eq!(code(&rig.run(&TypeHandler, "a").await), 200);
        assert_eq!(rig.session.transfer_type(), TransferType::Ascii);
        assert_eq!(code(&rig.run(&TypeHandler, "E").await), 504);
        assert_eq!(rig.session.transfer_type(), TransferType::Ascii);
        assert_eq!(code(&rig.run(&TypeHandler, "I").await), 200);
        assert_eq!(rig.session.transfer_type(), TransferType::Binary);
    }

    #[tokio::test]
    async fn size_reports_bytes_of_files_only() {
        let mut rig = Rig::new().await;
        rig.login().await;
        let result = rig.run(&SizeHandler, "docs/notes.txt").await;
        assert_eq!(result.reply.unwrap().text, "5");
        assert_eq!(code(&rig.run(&SizeHandler, "docs").await), 550);
        assert_eq!(code(&rig.run(&SizeHandler, "../secret.txt").await), 550);
    }

    #[tokio::test]
    async fn data_commands_need_pasv() {
        let mut rig = Rig::new().await;
        rig.login().await;
        assert_eq!(code(&rig.run(&RetrHandler, "docs/notes.txt").await), 425);
        assert_eq!(code(&rig.run(&ListHandler, "").await), 425);
        assert_eq!(code(&rig.run(&StorHandler, "new.txt").await), 425);
        assert!(!rig.home().join("new.txt").exists());
    }

    #[tokio::test]
    async fn stor_outside_root_is_not_allowed() {
        let mut rig = Rig::new().await;
        rig.login().await;
        assert_eq!(code(&rig.run(&StorHandler, "../evil.txt").await), 553);
        assert_eq!(code(&rig.run(&StorHandler, "docs").await), 553);
    }

    #[tokio::test]
    async fn quit_closes_connection() {
        let mut rig = Rig::new().await;
        let result = rig.run(&QuitHandler, "").await;
        assert_eq!(result.status, CommandStatus::CloseConnection);
        assert_eq!(code(&result), 221);
    }

    #[test]
    fn list_flags_are_ignored() {
        assert_eq!(strip_list_flags("-la"), "");
        assert_eq!(strip_list_flags("-l -a docs"), "docs");
        assert_eq!(strip_list_flags("my file.txt"), "my file.txt");
    }
}
