//! WebInspector FSM
//!
//! Drives the `com.apple.webinspector` service: a selector/argument plist RPC
//! that bootstraps an automation session against Mobile Safari, then tunnels
//! JSON `Automation.*` calls over a `WIRSocketData` envelope once connected.
//!
//! Calls made before the session reaches `Connected` are queued and replayed
//! (or failed, if the FSM lands in `Failed` instead) once a terminal state is
//! reached -- callers never see "not ready yet" errors, only `NoAutomation`.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{obf, Idevice, IdeviceError, IdeviceService, ReadWrite};

/// Default deadline for reaching `Connected` from session start.
const SESSION_START_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Initialized,
    Ready,
    Connected,
    Failed,
}

/// A page exposed by the tracked automation target.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: String,
    pub active: bool,
    pub url: Option<String>,
}

struct PendingAutomationCall {
    reply: oneshot::Sender<Result<serde_json::Value, IdeviceError>>,
}

enum QueuedRequest {
    Automation {
        method: String,
        params: serde_json::Value,
        reply: oneshot::Sender<Result<serde_json::Value, IdeviceError>>,
    },
    ListPages(oneshot::Sender<Result<Vec<Page>, IdeviceError>>),
}

enum Command {
    Request(QueuedRequest),
    WaitForSession(Duration, oneshot::Sender<Result<(), IdeviceError>>),
}

/// Handle to a running WebInspector session actor.
///
/// The actor owns the socket outright and exits (closing it) when this handle
/// and every clone are dropped, or on hard protocol failure.
pub struct WebInspectorSession {
    cmd_tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl IdeviceService for WebInspectorSession {
    fn service_name() -> std::borrow::Cow<'static, str> {
        obf!("com.apple.webinspector")
    }

    async fn from_stream(idevice: Idevice) -> Result<Self, IdeviceError> {
        let socket = idevice.get_socket().ok_or(IdeviceError::NoEstablishedConnection)?;
        Ok(Self::spawn(socket))
    }
}

impl WebInspectorSession {
    fn spawn(socket: Box<dyn ReadWrite>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let task = tokio::spawn(run(socket, cmd_rx));
        Self { cmd_tx, task }
    }

    /// Calls an `Automation.<method>` RPC, queuing it until the session reaches
    /// `Connected` (or failing it immediately if the session is already `Failed`).
    pub async fn automation_call(
        &self,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, IdeviceError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Request(QueuedRequest::Automation {
                method: method.into(),
                params,
                reply,
            }))
            .await
            .map_err(|_| IdeviceError::PeerDisconnected)?;
        rx.await.map_err(|_| IdeviceError::PeerDisconnected)?
    }

    pub async fn create_browsing_context(&self) -> Result<String, IdeviceError> {
        let res = self
            .automation_call("createBrowsingContext", serde_json::json!({}))
            .await?;
        res.get("handle")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(IdeviceError::Failed)
    }

    pub async fn get_browsing_contexts(&self) -> Result<Vec<Page>, IdeviceError> {
        let res = self
            .automation_call("getBrowsingContexts", serde_json::json!({}))
            .await?;
        let contexts = res
            .get("contexts")
            .and_then(|v| v.as_array())
            .ok_or(IdeviceError::Failed)?;
        Ok(contexts
            .iter()
            .filter_map(|c| {
                Some(Page {
                    id: c.get("id")?.as_str()?.to_string(),
                    active: c.get("active").and_then(|a| a.as_bool()).unwrap_or(false),
                    url: c.get("url").and_then(|u| u.as_str()).map(|s| s.to_string()),
                })
            })
            .collect())
    }

    pub async fn navigate_browsing_context(
        &self,
        handle: impl Into<String>,
        url: impl Into<String>,
        page_load_timeout: Option<Duration>,
    ) -> Result<(), IdeviceError> {
        let timeout_ms = page_load_timeout.unwrap_or(Duration::from_secs(30)).as_millis() as u64;
        self.automation_call(
            "navigateBrowsingContext",
            serde_json::json!({
                "handle": handle.into(),
                "url": url.into(),
                "pageLoadTimeout": timeout_ms,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn switch_to_browsing_context(
        &self,
        browsing_context_handle: impl Into<String>,
        frame_handle: Option<String>,
    ) -> Result<(), IdeviceError> {
        self.automation_call(
            "switchToBrowsingContext",
            serde_json::json!({
                "browsingContextHandle": browsing_context_handle.into(),
                "frameHandle": frame_handle.unwrap_or_default(),
            }),
        )
        .await?;
        Ok(())
    }

    /// Returns the decoded PNG bytes of a screenshot of `handle`.
    pub async fn take_screenshot(
        &self,
        handle: impl Into<String>,
        scroll_into_view_if_needed: bool,
        clip_to_viewport: bool,
    ) -> Result<Vec<u8>, IdeviceError> {
        let res = self
            .automation_call(
                "takeScreenshot",
                serde_json::json!({
                    "handle": handle.into(),
                    "scrollIntoViewIfNeeded": scroll_into_view_if_needed,
                    "clipToViewport": clip_to_viewport,
                }),
            )
            .await?;
        let data = res.get("data").and_then(|v| v.as_str()).ok_or(IdeviceError::Failed)?;
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|_| IdeviceError::Failed)
    }

    pub async fn go_forward_in_browsing_context(&self, handle: impl Into<String>) -> Result<(), IdeviceError> {
        self.automation_call("goForwardInBrowsingContext", serde_json::json!({ "handle": handle.into() }))
            .await?;
        Ok(())
    }

    pub async fn go_back_in_browsing_context(&self, handle: impl Into<String>) -> Result<(), IdeviceError> {
        self.automation_call("goBackInBrowsingContext", serde_json::json!({ "handle": handle.into() }))
            .await?;
        Ok(())
    }

    pub async fn reload_browsing_context(&self, handle: impl Into<String>) -> Result<(), IdeviceError> {
        self.automation_call("reloadBrowsingContext", serde_json::json!({ "handle": handle.into() }))
            .await?;
        Ok(())
    }

    pub async fn close_browsing_context(&self, handle: impl Into<String>) -> Result<(), IdeviceError> {
        self.automation_call("closeBrowsingContext", serde_json::json!({ "handle": handle.into() }))
            .await?;
        Ok(())
    }

    /// Lists the pages currently known on the tracked automation target.
    pub async fn list_pages(&self) -> Result<Vec<Page>, IdeviceError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Request(QueuedRequest::ListPages(reply)))
            .await
            .map_err(|_| IdeviceError::PeerDisconnected)?;
        rx.await.map_err(|_| IdeviceError::PeerDisconnected)?
    }

    /// Waits until the session reaches `Connected` or `Failed`, or `deadline` elapses.
    pub async fn wait_for_session(&self, deadline: Duration) -> Result<(), IdeviceError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::WaitForSession(deadline, reply))
            .await
            .map_err(|_| IdeviceError::PeerDisconnected)?;
        rx.await.map_err(|_| IdeviceError::PeerDisconnected)?
    }
}

impl Drop for WebInspectorSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Actor {
    socket: Box<dyn ReadWrite>,
    session_id: String,
    state: State,
    safari_app_id: Option<String>,
    current_page_id: Option<String>,
    page_out: u64,
    pending: HashMap<u64, PendingAutomationCall>,
    queue: Vec<QueuedRequest>,
    waiters: Vec<oneshot::Sender<Result<(), IdeviceError>>>,
    pages: HashMap<String, Page>,
}

async fn run(socket: Box<dyn ReadWrite>, mut cmd_rx: mpsc::Receiver<Command>) {
    let mut actor = Actor {
        socket,
        session_id: Uuid::new_v4().to_string().to_uppercase(),
        state: State::Created,
        safari_app_id: None,
        current_page_id: None,
        page_out: 0,
        pending: HashMap::new(),
        queue: Vec::new(),
        waiters: Vec::new(),
        pages: HashMap::new(),
    };

    if let Err(e) = actor.handshake().await {
        warn!("webinspector handshake failed: {e:?}");
        actor.fail(IdeviceError::NoAutomation);
        drain_with_failure(&mut cmd_rx).await;
        return;
    }

    let deadline = tokio::time::Instant::now() + SESSION_START_TIMEOUT;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline), if actor.state != State::Connected && actor.state != State::Failed => {
                actor.fail(IdeviceError::Timeout);
            }
            frame = read_frame(&mut actor.socket) => {
                match frame {
                    Ok(Some(msg)) => actor.handle_inbound(msg).await,
                    Ok(None) => {
                        actor.fail(IdeviceError::PeerDisconnected);
                        break;
                    }
                    Err(e) => {
                        actor.fail(e);
                        break;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => actor.handle_command(cmd).await,
                    None => break,
                }
            }
        }
        if actor.state == State::Failed {
            break;
        }
    }
}

async fn drain_with_failure(cmd_rx: &mut mpsc::Receiver<Command>) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            Command::Request(QueuedRequest::Automation { reply, .. }) => {
                let _ = reply.send(Err(IdeviceError::NoAutomation));
            }
            Command::Request(QueuedRequest::ListPages(reply)) => {
                let _ = reply.send(Err(IdeviceError::NoAutomation));
            }
            Command::WaitForSession(_, reply) => {
                let _ = reply.send(Err(IdeviceError::NoAutomation));
            }
        }
    }
}

impl Actor {
    async fn handshake(&mut self) -> Result<(), IdeviceError> {
        self.send_selector(
            "_rpc_reportIdentifier:",
            plist_dict(&[("WIRConnectionIdentifierKey", plist::Value::String(self.session_id.clone()))]),
        )
        .await?;

        let (selector, argument) = self.recv_selector().await?;
        if selector != "_rpc_reportCurrentState:" {
            return Err(IdeviceError::UnexpectedResponse);
        }
        let available = argument
            .get("WIRAutomationAvailabilityKey")
            .and_then(|v| v.as_string())
            == Some("WIRAutomationAvailabilityAvailable");
        if !available {
            return Err(IdeviceError::NoAutomation);
        }
        Ok(())
    }

    async fn handle_inbound(&mut self, (selector, argument): (String, plist::Dictionary)) {
        match selector.as_str() {
            "_rpc_reportConnectedApplicationList:" => {
                if let Some(plist::Value::Dictionary(apps)) = argument.get("WIRApplicationDictionaryKey") {
                    for (app_id, info) in apps {
                        if info
                            .as_dictionary()
                            .and_then(|d| d.get("WIRApplicationBundleIdentifierKey"))
                            .and_then(|v| v.as_string())
                            == Some("com.apple.mobilesafari")
                        {
                            self.safari_app_id = Some(app_id.clone());
                            if self.state == State::Created {
                                self.transition(State::Initialized).await;
                            }
                            break;
                        }
                    }
                }
            }
            "_rpc_applicationConnected:" | "_rpc_applicationUpdated:" => {
                let bundle = argument
                    .get("WIRApplicationBundleIdentifierKey")
                    .and_then(|v| v.as_string());
                if bundle == Some("com.apple.mobilesafari") {
                    if let Some(app_id) = argument.get("WIRApplicationIdentifierKey").and_then(|v| v.as_string()) {
                        self.safari_app_id = Some(app_id.to_string());
                    }
                    let ready = argument
                        .get("WIRIsApplicationReadyKey")
                        .and_then(|v| v.as_boolean())
                        .unwrap_or(false);
                    if self.state == State::Initialized && ready {
                        self.transition(State::Ready).await;
                    }
                }
            }
            "_rpc_applicationSentListing:" => {
                let target_app = argument.get("WIRApplicationIdentifierKey").and_then(|v| v.as_string());
                if target_app.is_some() && target_app == self.safari_app_id.as_deref() {
                    if let Some(plist::Value::Dictionary(listing)) = argument.get("WIRListingKey") {
                        for (page_id, info) in listing {
                            let Some(info) = info.as_dictionary() else { continue };
                            let is_automation = info.get("WIRTypeKey").and_then(|v| v.as_string())
                                == Some("WIRTypeAutomation");
                            let matches_session = info
                                .get("WIRSessionIdentifierKey")
                                .and_then(|v| v.as_string())
                                == Some(self.session_id.as_str());
                            if !is_automation || !matches_session {
                                continue;
                            }
                            if self.current_page_id.is_none() {
                                self.current_page_id = Some(page_id.clone());
                                let _ = self.forward_socket_setup(page_id).await;
                            }
                            let confirmed = info
                                .get("WIRConnectionIdentifierKey")
                                .and_then(|v| v.as_string())
                                == Some(self.session_id.as_str());
                            self.pages.insert(
                                page_id.clone(),
                                Page {
                                    id: page_id.clone(),
                                    active: confirmed,
                                    url: info.get("WIRURLKey").and_then(|v| v.as_string()).map(|s| s.to_string()),
                                },
                            );
                            if confirmed && self.current_page_id.as_deref() == Some(page_id.as_str()) {
                                self.transition(State::Connected).await;
                            }
                        }
                    }
                }
            }
            "_rpc_applicationDisconnected:" => {
                self.safari_app_id = None;
                self.current_page_id = None;
                self.pages.clear();
            }
            "_rpc_applicationSentData:" => {
                let dest = argument.get("WIRDestinationKey").and_then(|v| v.as_string());
                if dest != Some(self.session_id.as_str()) {
                    return;
                }
                if let Some(plist::Value::Data(data)) = argument.get("WIRMessageDataKey") {
                    if let Ok(msg) = serde_json::from_slice::<serde_json::Value>(data) {
                        if let Some(id) = msg.get("id").and_then(|v| v.as_u64()) {
                            if let Some(pending) = self.pending.remove(&id) {
                                let result = if let Some(err) = msg.get("error") {
                                    Err(IdeviceError::InternalError(err.to_string()))
                                } else {
                                    Ok(msg.get("result").cloned().unwrap_or(serde_json::Value::Null))
                                };
                                let _ = pending.reply.send(result);
                            }
                        }
                    }
                }
            }
            _ => debug!("unhandled webinspector selector: {selector}"),
        }
    }

    async fn transition(&mut self, state: State) {
        debug!("webinspector session transitioning to {state:?}");
        self.state = state;
        if state == State::Ready {
            if self.forward_automation_session_request().await.is_err() {
                self.fail(IdeviceError::NoAutomation);
                return;
            }
        }
        if state == State::Connected {
            let queued = std::mem::take(&mut self.queue);
            for req in queued {
                self.dispatch(req).await;
            }
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(Ok(()));
            }
        }
    }

    fn fail(&mut self, err: IdeviceError) {
        if self.state == State::Failed {
            return;
        }
        self.state = State::Failed;
        for pending in self.pending.drain() {
            let _ = pending.1.reply.send(Err(IdeviceError::Failed));
        }
        for req in self.queue.drain(..) {
            fail_queued(req, err.clone_for_queue());
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(err.clone_for_queue()));
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Request(req) => {
                if self.state == State::Connected {
                    self.dispatch(req).await;
                } else if self.state == State::Failed {
                    fail_queued(req, IdeviceError::NoAutomation);
                } else {
                    self.queue.push(req);
                }
            }
            Command::WaitForSession(deadline, reply) => match self.state {
                State::Connected => {
                    let _ = reply.send(Ok(()));
                }
                State::Failed => {
                    let _ = reply.send(Err(IdeviceError::NoAutomation));
                }
                _ => {
                    self.waiters.push(reply);
                    tokio::spawn(async move {
                        tokio::time::sleep(deadline).await;
                    });
                }
            },
        }
    }

    async fn dispatch(&mut self, req: QueuedRequest) {
        match req {
            QueuedRequest::Automation { method, params, reply } => {
                let id = self.page_out;
                self.page_out += 1;
                let body = serde_json::json!({
                    "method": format!("Automation.{method}"),
                    "params": params,
                    "id": id,
                });
                let bytes = match serde_json::to_vec(&body) {
                    Ok(b) => b,
                    Err(_) => {
                        let _ = reply.send(Err(IdeviceError::Failed));
                        return;
                    }
                };
                self.pending.insert(id, PendingAutomationCall { reply });
                let arg = plist_dict(&[
                    ("WIRSocketDataKey", plist::Value::Data(bytes)),
                    (
                        "WIRConnectionIdentifierKey",
                        plist::Value::String(self.session_id.clone()),
                    ),
                ]);
                if self.send_selector("_rpc_forwardSocketData:", arg).await.is_err() {
                    if let Some(pending) = self.pending.remove(&id) {
                        let _ = pending.reply.send(Err(IdeviceError::PeerDisconnected));
                    }
                }
            }
            QueuedRequest::ListPages(reply) => {
                let _ = reply.send(Ok(self.pages.values().cloned().collect()));
            }
        }
    }

    async fn forward_socket_setup(&mut self, page_id: &str) -> Result<(), IdeviceError> {
        let Some(app_id) = self.safari_app_id.clone() else {
            return Err(IdeviceError::NoAutomation);
        };
        let arg = plist_dict(&[
            ("WIRApplicationIdentifierKey", plist::Value::String(app_id)),
            ("WIRPageIdentifierKey", plist::Value::String(page_id.to_string())),
            (
                "WIRSessionIdentifierKey",
                plist::Value::String(self.session_id.clone()),
            ),
            (
                "WIRConnectionIdentifierKey",
                plist::Value::String(self.session_id.clone()),
            ),
        ]);
        self.send_selector("_rpc_forwardSocketSetup:", arg).await
    }

    async fn forward_automation_session_request(&mut self) -> Result<(), IdeviceError> {
        let capabilities = plist_dict(&[
            ("org.webkit.webdriver.webrtc.allow-insecure-media-capture", plist::Value::Boolean(true)),
            ("org.webkit.webdriver.webrtc.suppress-ice-candidate-filtering", plist::Value::Boolean(false)),
        ]);
        let arg = plist_dict(&[
            (
                "WIRConnectionIdentifierKey",
                plist::Value::String(self.session_id.clone()),
            ),
            ("WIRSessionCapabilitiesKey", plist::Value::Dictionary(capabilities)),
        ]);
        self.send_selector("_rpc_forwardAutomationSessionRequest:", arg).await
    }

    async fn send_selector(&mut self, selector: &str, argument: plist::Dictionary) -> Result<(), IdeviceError> {
        let mut msg = plist::Dictionary::new();
        msg.insert("__selector".to_string(), plist::Value::String(selector.to_string()));
        msg.insert("__argument".to_string(), plist::Value::Dictionary(argument));

        let mut buf = Vec::new();
        plist::to_writer_binary(&mut buf, &plist::Value::Dictionary(msg))?;
        let len = buf.len() as u32;
        self.socket.write_all(&len.to_be_bytes()).await?;
        self.socket.write_all(&buf).await?;
        self.socket.flush().await?;
        Ok(())
    }

    async fn recv_selector(&mut self) -> Result<(String, plist::Dictionary), IdeviceError> {
        match read_frame(&mut self.socket).await? {
            Some(msg) => Ok(msg),
            None => Err(IdeviceError::PeerDisconnected),
        }
    }
}

fn fail_queued(req: QueuedRequest, err: IdeviceError) {
    match req {
        QueuedRequest::Automation { reply, .. } => {
            let _ = reply.send(Err(err));
        }
        QueuedRequest::ListPages(reply) => {
            let _ = reply.send(Err(err));
        }
    }
}

fn plist_dict(entries: &[(&str, plist::Value)]) -> plist::Dictionary {
    let mut dict = plist::Dictionary::new();
    for (k, v) in entries {
        dict.insert(k.to_string(), v.clone());
    }
    dict
}

async fn read_frame(
    socket: &mut Box<dyn ReadWrite>,
) -> Result<Option<(String, plist::Dictionary)>, IdeviceError> {
    let mut len_buf = [0u8; 4];
    match socket.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    socket.read_exact(&mut body).await?;

    let value: plist::Value = plist::from_bytes(&body)?;
    let dict = value.into_dictionary().ok_or(IdeviceError::UnexpectedResponse)?;
    let selector = dict
        .get("__selector")
        .and_then(|v| v.as_string())
        .ok_or(IdeviceError::UnexpectedResponse)?
        .to_string();
    let argument = dict
        .get("__argument")
        .and_then(|v| v.as_dictionary())
        .cloned()
        .unwrap_or_default();
    Ok(Some((selector, argument)))
}

impl IdeviceError {
    /// Cheap clone for fan-out to multiple queued callers on session failure.
    fn clone_for_queue(&self) -> Self {
        match self {
            IdeviceError::Timeout => IdeviceError::Timeout,
            IdeviceError::PeerDisconnected => IdeviceError::PeerDisconnected,
            IdeviceError::NoAutomation => IdeviceError::NoAutomation,
            _ => IdeviceError::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor_with_socket() -> Actor {
        let (a, _b) = tokio::io::duplex(4096);
        Actor {
            socket: Box::new(a),
            session_id: "TEST-SESSION".to_string(),
            state: State::Created,
            safari_app_id: Some("safari-app".to_string()),
            current_page_id: None,
            page_out: 0,
            pending: HashMap::new(),
            queue: Vec::new(),
            waiters: Vec::new(),
            pages: HashMap::new(),
        }
    }

    fn listing_entry(page_id: &str, session_id: &str, confirmed: bool) -> plist::Value {
        let mut entry = plist::Dictionary::new();
        entry.insert("WIRTypeKey".into(), "WIRTypeAutomation".into());
        entry.insert("WIRSessionIdentifierKey".into(), session_id.into());
        entry.insert("WIRURLKey".into(), "https://example.com".into());
        if confirmed {
            entry.insert("WIRConnectionIdentifierKey".into(), session_id.into());
        }
        let _ = page_id;
        plist::Value::Dictionary(entry)
    }

    #[tokio::test]
    async fn listing_updates_are_reflected_in_list_pages() {
        let mut actor = actor_with_socket();

        let mut listing = plist::Dictionary::new();
        listing.insert(
            "page-1".to_string(),
            listing_entry("page-1", &actor.session_id, true),
        );

        let mut argument = plist::Dictionary::new();
        argument.insert(
            "WIRApplicationIdentifierKey".into(),
            "safari-app".into(),
        );
        argument.insert("WIRListingKey".into(), plist::Value::Dictionary(listing));

        actor
            .handle_inbound(("_rpc_applicationSentListing:".to_string(), argument))
            .await;

        assert!(actor.pages.contains_key("page-1"));
        let page = &actor.pages["page-1"];
        assert!(page.active);
        assert_eq!(page.url.as_deref(), Some("https://example.com"));
        assert_eq!(actor.state, State::Connected);
    }

    #[tokio::test]
    async fn disconnect_clears_tracked_pages() {
        let mut actor = actor_with_socket();
        actor.pages.insert(
            "page-1".to_string(),
            Page {
                id: "page-1".to_string(),
                active: true,
                url: None,
            },
        );

        actor
            .handle_inbound(("_rpc_applicationDisconnected:".to_string(), plist::Dictionary::new()))
            .await;

        assert!(actor.pages.is_empty());
        assert!(actor.safari_app_id.is_none());
    }
}
