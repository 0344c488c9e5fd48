//! Supervised chat worker runtime.
//!
//! A [`Supervisor`] hosts one [`ChatWorker`] on a dedicated thread and relays
//! [`WorkerMessage`](chatpilot_protocol::WorkerMessage)s between them. The
//! worker drives a [`Driver`] through its lifecycle (launch, sign-in, ready,
//! converse) and recovers from failures by retrying or reloading. While a turn
//! is streaming, the [`StreamWatcher`] polls the driven surface and turns its
//! slowly mutating text into `Start`/`Replying`/`End` events.

pub mod config;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod page;
pub mod supervisor;
pub mod surface;
pub mod watcher;
pub mod worker;

pub use config::{ConfigSource, Credentials, SessionKind, WorkerConfig};
pub use credentials::CredentialStore;
pub use driver::{Driver, DriverFactory, SignIn};
pub use error::{ConfigError, DriverError, SupervisorError, WorkerError};
pub use page::{BrowserLauncher, LaunchOptions, Page};
pub use supervisor::{ErrorReport, EventName, HandlerId, ReplyStream, Supervisor, SupervisorEvent};
pub use watcher::{StreamWatcher, Tick, WatcherState};
pub use worker::{ChatWorker, LifecycleState, RetryState, WorkerExit, WorkerLink};
