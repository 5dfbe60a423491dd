//! Navigation targets and the navigator seam.
//!
//! In-app navigation is a presentation concern and is published on the
//! [`EventBus`]. Leaving the application for an external consent page is a
//! full top-level hand-off to the system browser.

use std::fmt;

use thiserror::Error;
use url::Url;

use super::{AppEvent, EventBus};
use crate::config::RouteSettings;

/// Screens the connection core may send the user to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// The sign-in entry point.
    SignIn,
    /// The main application screen.
    Home,
}

impl Route {
    /// Path of the route under the configured route table.
    pub fn path<'a>(&self, routes: &'a RouteSettings) -> &'a str {
        match self {
            Route::SignIn => &routes.sign_in,
            Route::Home => &routes.home,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::SignIn => f.write_str("sign-in"),
            Route::Home => f.write_str("home"),
        }
    }
}

/// Errors raised when handing control to an external page.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("failed to open browser: {0}")]
    Browser(#[from] std::io::Error),
}

/// Performs navigation on behalf of the connection core.
#[cfg_attr(test, mockall::automock)]
pub trait Navigator: Send + Sync {
    /// Hands control to an external page (the provider's consent UI).
    ///
    /// In-memory state is abandoned after this call; the flow resumes through
    /// the OAuth callback entry point.
    fn open_external(&self, url: &Url) -> Result<(), NavigationError>;

    /// Navigates within the application.
    fn navigate(&self, route: Route);
}

/// Navigator for the native client: the system browser for consent pages,
/// bus events for in-app routes.
#[derive(Debug, Clone)]
pub struct BrowserNavigator {
    events: EventBus,
}

impl BrowserNavigator {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }
}

impl Navigator for BrowserNavigator {
    fn open_external(&self, url: &Url) -> Result<(), NavigationError> {
        tracing::info!(host = url.host_str().unwrap_or_default(), "Opening consent page in browser");
        open::that(url.as_str())?;
        Ok(())
    }

    fn navigate(&self, route: Route) {
        tracing::debug!(%route, "Navigating");
        self.events.publish(AppEvent::NavigateTo(route));
    }
}
