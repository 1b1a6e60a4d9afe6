//! Route access decisions, kept free of any UI or routing framework.
//!
//! The host's router calls [`resolve_navigation`] before each navigation and
//! acts on the decision. The guard attempts a storage restore first, so a
//! reloaded page reaches the chat view without a server round trip.

use crate::session::SessionStore;

pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";
pub const CHAT_PATH: &str = "/chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDecision {
    Allow,
    RedirectToLogin,
    RedirectToChat,
}

/// A navigation target as the host's route table describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub path: String,
    pub requires_auth: bool,
}

impl RouteSpec {
    pub fn public(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            requires_auth: false,
        }
    }

    pub fn protected(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            requires_auth: true,
        }
    }
}

/// Decide whether `route` may be entered with the current session.
pub fn resolve_navigation(session: &SessionStore, route: &RouteSpec) -> NavDecision {
    if !session.is_logged_in() {
        session.restore();
    }
    let logged_in = session.is_logged_in();

    // The root path is a pure dispatcher.
    if route.path == "/" {
        return if logged_in {
            NavDecision::RedirectToChat
        } else {
            NavDecision::RedirectToLogin
        };
    }
    if route.requires_auth && !logged_in {
        return NavDecision::RedirectToLogin;
    }
    // A logged-in user has no business on the auth pages.
    if logged_in && (route.path == LOGIN_PATH || route.path == REGISTER_PATH) {
        return NavDecision::RedirectToChat;
    }
    NavDecision::Allow
}
