//! Process-wide client context.
//!
//! [`BleCore`] holds at most one [`BleClient`] and can live in a `static`.
//! The first successful [`initialize`](BleCore::initialize) wins; later calls
//! return the existing client unchanged.
//!
//! ```ignore
//! use blecore::{BleConfig, BleCore, BtleplugRadio};
//!
//! static BLE: BleCore = BleCore::new();
//!
//! #[tokio::main]
//! async fn main() -> blecore::Result<()> {
//!     let radio = Arc::new(BtleplugRadio::new().await?);
//!     BLE.initialize(radio, BleConfig::default())?;
//!
//!     let client = BLE.client()?;
//!     client.connect("AA:BB:CC:DD:EE:FF").await;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, OnceLock};

use tokio::runtime::Handle;
use tracing::debug;

use crate::client::BleClient;
use crate::config::BleConfig;
use crate::error::{Error, Result};
use crate::radio::Radio;

/// Lazily initialised holder of the process-wide [`BleClient`].
#[derive(Debug, Default)]
pub struct BleCore {
    client: OnceLock<BleClient>,
}

impl BleCore {
    /// An uninitialised context. Usable in `static` items.
    pub const fn new() -> Self {
        Self {
            client: OnceLock::new(),
        }
    }

    /// Initialise from within a Tokio runtime.
    ///
    /// Returns [`Error::NoRuntime`] when called outside a runtime and
    /// [`Error::InvalidConfig`] for an invalid `config`. If already
    /// initialised, returns the existing client and ignores the arguments.
    pub fn initialize(&self, radio: Arc<dyn Radio>, config: BleConfig) -> Result<&BleClient> {
        if let Some(client) = self.client.get() {
            debug!("BleCore already initialized");
            return Ok(client);
        }
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        self.initialize_with_runtime(radio, config, runtime)
    }

    /// Initialise with an explicit runtime handle.
    pub fn initialize_with_runtime(
        &self,
        radio: Arc<dyn Radio>,
        config: BleConfig,
        runtime: Handle,
    ) -> Result<&BleClient> {
        if let Some(client) = self.client.get() {
            debug!("BleCore already initialized");
            return Ok(client);
        }
        let client = BleClient::new(radio, config, runtime)?;
        // A concurrent initialiser may have won; theirs is kept.
        Ok(self.client.get_or_init(|| client))
    }

    /// The initialised client.
    ///
    /// Returns [`Error::NotInitialized`] before initialisation.
    pub fn client(&self) -> Result<&BleClient> {
        self.client.get().ok_or(Error::NotInitialized)
    }

    /// Whether [`initialize`](Self::initialize) has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.client.get().is_some()
    }
}
