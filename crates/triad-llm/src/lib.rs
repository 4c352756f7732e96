pub mod converter;
pub mod dispatcher;
pub mod provider;
pub mod registry;

pub mod mock;

pub use dispatcher::{DispatchOutcome, FallbackDispatcher, SENTINEL_TEXT};
pub use mock::{MockBackend, MockResponse};
pub use provider::{ChatCompletionsBackend, HttpBackendConfig};
pub use registry::{BackendRegistry, RegistryError};
