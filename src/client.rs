//! Application entry point and configuration.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use crate::connector::{Connector, HttpConnector, OpHandlers};
use crate::error::{Error, Result};
use crate::path::Db;
use crate::protocol::PUSH_TIMEOUT_MS;
use crate::realtime::Multiplexer;
use crate::session::{Auth, CredentialStore, MemoryCredentials};

/// Which transport the app routes operations through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectorKind {
    #[default]
    Http,
    Ws,
    Local,
}

/// Configuration surface for [`App::init`].
///
/// # Example
/// ```no_run
/// use acorndb::{App, Config, ConnectorKind};
///
/// # fn main() -> acorndb::Result<()> {
/// let app = App::init(
///     Config::new(ConnectorKind::Http)
///         .with_server_url("https://db.example.com")
///         .with_api_key("secret"),
/// )?;
/// # let _ = app; Ok(())
/// # }
/// ```
pub struct Config {
    pub server_url: Option<String>,
    pub api_key: Option<String>,
    pub connector: ConnectorKind,
    pub op_handlers: Option<Arc<dyn OpHandlers>>,
    pub credentials: Option<Arc<dyn CredentialStore>>,
    pub push_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(ConnectorKind::Http)
    }
}

impl Config {
    pub fn new(connector: ConnectorKind) -> Self {
        Self {
            server_url: None,
            api_key: None,
            connector,
            op_handlers: None,
            credentials: None,
            push_timeout: Duration::from_millis(PUSH_TIMEOUT_MS),
        }
    }

    /// In-process configuration over the given handlers.
    pub fn local(op_handlers: Arc<dyn OpHandlers>) -> Self {
        let mut config = Self::new(ConnectorKind::Local);
        config.op_handlers = Some(op_handlers);
        config
    }

    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = Some(server_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }
}

/// Context every surface object hangs on to: the active connector and the
/// realtime multiplexer.
pub(crate) struct Shared {
    pub connector: Connector,
    pub realtime: Multiplexer,
}

/// One configured AcornDB application.
pub struct App {
    shared: Arc<Shared>,
    auth: Auth,
    http: Arc<HttpConnector>,
    connector_kind: ConnectorKind,
}

impl App {
    /// Wire an application from its configuration.
    ///
    /// With a `server_url` and a remote connector this opens the persistent
    /// realtime socket, so it must run inside a tokio runtime.
    pub fn init(config: Config) -> Result<App> {
        let store: Arc<dyn CredentialStore> = config
            .credentials
            .unwrap_or_else(|| Arc::new(MemoryCredentials::default()));
        let (session_tx, session_rx) = watch::channel(store.load());

        let http = Arc::new(HttpConnector::new(
            config.server_url.clone().unwrap_or_default(),
            config.api_key.clone(),
            session_rx.clone(),
        ));
        let realtime = Multiplexer::new(session_rx);

        let connector = match config.connector {
            ConnectorKind::Http => Connector::Http(Arc::clone(&http)),
            ConnectorKind::Ws => Connector::Ws {
                http: Arc::clone(&http),
                realtime: realtime.clone(),
                push_timeout: config.push_timeout,
            },
            ConnectorKind::Local => {
                let handlers = config
                    .op_handlers
                    .ok_or_else(|| Error::Config("local connector needs op_handlers".to_string()))?;
                Connector::Local(handlers)
            }
        };

        if let Some(url) = &config.server_url {
            if config.connector != ConnectorKind::Local {
                realtime.start(ws_url(url));
            }
        }

        let auth = Auth::new(session_tx, store, Arc::clone(&http));

        Ok(App {
            shared: Arc::new(Shared {
                connector,
                realtime,
            }),
            auth,
            http,
            connector_kind: config.connector,
        })
    }

    /// Database surface: collections, locations, pipelines.
    pub fn db(&self) -> Db {
        Db::new(Arc::clone(&self.shared))
    }

    /// Authentication surface.
    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Named server-side functions.
    pub fn functions(&self) -> Functions {
        Functions {
            http: Arc::clone(&self.http),
        }
    }

    /// Point the app at a different server. A changed URL restarts the
    /// realtime socket; an identical one is a no-op.
    pub fn set_server_url(&self, server_url: impl Into<String>) {
        let server_url = server_url.into();
        if self.http.base_url() == server_url {
            return;
        }
        info!("switching server to {server_url}");
        self.http.set_base_url(server_url.clone());
        if self.connector_kind != ConnectorKind::Local {
            self.shared.realtime.start(ws_url(&server_url));
        }
    }

    pub fn set_api_key(&self, api_key: impl Into<String>) {
        self.http.set_api_key(Some(api_key.into()));
    }
}

/// Invoker for named server-side functions: `POST /functions/<name>`.
pub struct Functions {
    http: Arc<HttpConnector>,
}

impl Functions {
    pub async fn call(&self, name: &str, payload: &Value) -> Result<Value> {
        self.http.call_function(name, payload).await
    }
}

/// Derive the socket endpoint from the HTTP base URL.
fn ws_url(base: &str) -> String {
    base.replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_maps_schemes() {
        assert_eq!(ws_url("http://localhost:3000"), "ws://localhost:3000");
        assert_eq!(ws_url("https://db.example.com"), "wss://db.example.com");
    }

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert_eq!(config.connector, ConnectorKind::Http);
        assert!(config.server_url.is_none());
        assert!(config.api_key.is_none());
        assert_eq!(config.push_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn config_builder_chain() {
        let config = Config::new(ConnectorKind::Ws)
            .with_server_url("https://db.example.com")
            .with_api_key("key123")
            .with_push_timeout(Duration::from_secs(1));
        assert_eq!(config.connector, ConnectorKind::Ws);
        assert_eq!(config.server_url.as_deref(), Some("https://db.example.com"));
        assert_eq!(config.api_key.as_deref(), Some("key123"));
        assert_eq!(config.push_timeout, Duration::from_secs(1));
    }

    #[test]
    fn local_without_handlers_is_a_config_error() {
        let result = App::init(Config::new(ConnectorKind::Local));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
