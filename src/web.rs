//! The study web server: a tokio accept loop, one request per connection,
//! cookie-keyed browser sessions and a small route table.

use std::sync::Arc;

use colored::*;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::admin::{AdminAccess, AdminGate};
use crate::assets::content_type_for;
use crate::chat::ChatOrchestrator;
use crate::conditions::ConditionRegistry;
use crate::config::StudyConfig;
use crate::error::{AdminError, StudyError};
use crate::http::{read_request, url_decode, Request, Response, SESSION_COOKIE};
use crate::phase::Phase;
use crate::providers::CompletionProvider;
use crate::render;
use crate::router::{Action, Notice, PhaseRouter};
use crate::session::{
    new_session_store, resolve_session, BrowserSession, SessionLimits, SessionStore,
};
use crate::timer::now_ms;

/// Everything a connection handler needs.
#[derive(Clone)]
pub struct AppState {
    router: Arc<PhaseRouter>,
    gate: AdminGate,
    sessions: SessionStore,
    limits: SessionLimits,
}

impl AppState {
    pub fn new(
        config: StudyConfig,
        registry: ConditionRegistry,
        provider: Arc<dyn CompletionProvider>,
        gate: AdminGate,
    ) -> Self {
        let limits = config.session_limits();
        let registry = Arc::new(registry);
        let chat = ChatOrchestrator::new(provider, Arc::clone(&registry));
        let router = PhaseRouter::new(Arc::new(config), registry, chat);
        Self {
            router: Arc::new(router),
            gate,
            sessions: new_session_store(),
            limits,
        }
    }

    pub fn router(&self) -> &PhaseRouter {
        &self.router
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

/// Bind the configured address and serve until the process is stopped.
pub async fn serve(state: AppState) -> Result<(), StudyError> {
    let addr = state.router.config().bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    eprintln!(
        "{}",
        format!("  Study server running at http://{}", addr).bright_green()
    );
    eprintln!(
        "{}",
        format!("  Researcher panel at http://{}/admin", addr).bright_cyan()
    );
    eprintln!("{}", "  Press Ctrl+C to stop.".bright_blue());
    info!(%addr, conditions = state.router.registry().len(), "study server listening");

    serve_on(listener, state).await
}

/// Accept loop on an already bound listener.
pub async fn serve_on(listener: TcpListener, state: AppState) -> Result<(), StudyError> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                warn!(%peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, state: AppState) -> Result<(), StudyError> {
    let request = match read_request(&mut stream).await {
        Ok(Some(r)) => r,
        Ok(None) => return Ok(()),
        Err(e) => {
            Response::bad_request(&e.to_string()).write_to(&mut stream).await?;
            return Err(e);
        }
    };
    let response = route(&state, request).await;
    response.write_to(&mut stream).await?;
    Ok(())
}

/// Dispatch one request.
pub async fn route(state: &AppState, req: Request) -> Response {
    debug!(method = %req.method, path = %req.path, "request");

    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/heartbeat") => return Response::no_content(),
        ("GET", path) if path.starts_with("/assets/") => {
            return serve_asset(state, &path["/assets/".len()..]).await;
        }
        _ => {}
    }

    let known = matches!(
        req.path.as_str(),
        "/" | "/login"
            | "/instruction/confirm"
            | "/chat"
            | "/finish"
            | "/admin"
            | "/admin/reset-timer"
            | "/admin/phase"
            | "/admin/export"
            | "/admin/clear"
            | "/admin/lock"
    );
    if !known {
        return Response::not_found();
    }

    let (sid, shared, created) =
        resolve_session(&state.sessions, state.limits, req.cookie(SESSION_COOKIE));
    let response = {
        let mut browser = shared.lock().await;
        dispatch(state, &req, &mut browser).await
    };
    if created {
        debug!(session = %sid, "new browser session");
        response.with_session_cookie(&sid)
    } else {
        response
    }
}

async fn dispatch(state: &AppState, req: &Request, browser: &mut BrowserSession) -> Response {
    let router = &state.router;
    let title = &router.config().title;
    let form = req.form();
    let field = |name: &str| form.get(name).cloned().unwrap_or_default();

    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/") => {
            // Every render consumes the one-shot bootstrap check, so a `pid`
            // added after the first page view is ignored.
            let pid = req.query.get("pid").map(String::as_str);
            if let Some(notice) = router.bootstrap(&mut browser.participant, pid) {
                browser.notice = Some(notice.text);
            }
            if pid.is_some() {
                return Response::redirect("/");
            }
            let notice = browser.take_notice().map(Notice::error);
            let page = router.page(&mut browser.participant, notice);
            Response::html(render::render_page(title, &page))
        }
        ("POST", "/login") => {
            act(router, browser, Action::SubmitLogin { participant_id: field("participant_id") }).await
        }
        ("POST", "/instruction/confirm") => act(router, browser, Action::ConfirmInstructions).await,
        ("POST", "/chat") => act(router, browser, Action::SendMessage { text: field("message") }).await,
        ("POST", "/finish") => act(router, browser, Action::Finish).await,

        ("GET", "/admin") => match redeem_grant(browser) {
            Ok(access) => admin_panel(router, &access, browser, None),
            Err(_) => Response::html(render::render_admin_locked(title, None)),
        },
        ("POST", "/admin/lock") => {
            browser.admin_grant = None;
            let notice = Notice::info("Admin panel locked.");
            Response::html(render::render_admin_locked(title, Some(&notice)))
        }
        ("POST", path) if path == "/admin" || path.starts_with("/admin/") => {
            let passphrase = field("passphrase");
            let access = if passphrase.is_empty() {
                redeem_grant(browser)
            } else {
                state.gate.unlock(&passphrase)
            };
            match access {
                Ok(access) => {
                    if !passphrase.is_empty() {
                        browser.admin_grant = Some(access.grant(now_ms()));
                    }
                    admin_action(router, &access, browser, path, &form)
                }
                Err(e) => {
                    let notice = Notice::error(e.to_string());
                    Response::html(render::render_admin_locked(title, Some(&notice)))
                }
            }
        }
        _ => Response::method_not_allowed(),
    }
}

/// Run a participant action and redirect back to the page; the outcome
/// notice is shown on the next render.
async fn act(router: &PhaseRouter, browser: &mut BrowserSession, action: Action) -> Response {
    let page = router.handle(&mut browser.participant, action).await;
    browser.notice = page.notice.map(|n| n.text);
    Response::redirect("/")
}

/// Access from an earlier unlock in this browser; an expired grant is dropped.
fn redeem_grant(browser: &mut BrowserSession) -> Result<AdminAccess, AdminError> {
    let grant = browser.admin_grant.ok_or(AdminError::Locked)?;
    grant.redeem(now_ms()).map_err(|e| {
        browser.admin_grant = None;
        e
    })
}

fn admin_action(
    router: &PhaseRouter,
    access: &AdminAccess,
    browser: &mut BrowserSession,
    path: &str,
    form: &std::collections::HashMap<String, String>,
) -> Response {
    let session = &mut browser.participant;
    let notice = match path {
        "/admin/reset-timer" => {
            access.reset_timer(session);
            Some("Timer reset.".to_string())
        }
        "/admin/phase" => {
            let phase = Phase::from_label_or_default(form.get("phase").map(String::as_str).unwrap_or(""));
            access.force_phase(session, phase);
            Some(format!("Phase set to {phase}."))
        }
        "/admin/export" => match access.export(session, router.registry()) {
            Ok(log) => {
                return match log.to_json() {
                    Ok(body) => Response::json(body).with_header(
                        "Content-Disposition",
                        format!("attachment; filename=\"{}\"", log.file_name()),
                    ),
                    Err(e) => {
                        warn!(error = %e, "export serialization failed");
                        Response::new(500, "text/plain; charset=utf-8", e.to_string())
                    }
                };
            }
            Err(e) => Some(e.to_string()),
        },
        "/admin/clear" => {
            access.clear(session);
            browser.notice = None;
            browser.admin_grant = None;
            let notice = Notice::info("Session data cleared. Enter the password to continue.");
            return Response::html(render::render_admin_locked(&router.config().title, Some(&notice)));
        }
        _ => None,
    };
    admin_panel(router, access, browser, notice.as_deref())
}

fn admin_panel(
    router: &PhaseRouter,
    access: &AdminAccess,
    browser: &mut BrowserSession,
    notice: Option<&str>,
) -> Response {
    let view = router.admin_view(access, &mut browser.participant);
    Response::html(render::render_admin(&router.config().title, &view, notice))
}

async fn serve_asset(state: &AppState, raw_name: &str) -> Response {
    let name = url_decode(raw_name);
    match state.router.assets().read(&name).await {
        Ok(bytes) => Response::new(200, content_type_for(&name), bytes),
        Err(e) => {
            warn!(error = %e, "asset request failed");
            Response::not_found()
        }
    }
}
