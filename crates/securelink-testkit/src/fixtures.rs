//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use securelink::envelope::MasterKey;
use securelink::store::MemoryStore;
use securelink::{FileRef, LinkId, PolicyParams, Result, Vault, VaultConfig};

use crate::clock::ManualClock;
use crate::ids::SequentialIds;

/// Start time of every fixture clock: 2025-06-15T14:40:00Z.
pub const FIXTURE_START: i64 = 1_750_000_800_000;

/// Master key used by fixtures.
pub const FIXTURE_MASTER_KEY: [u8; 32] = [0x5a; 32];

/// A vault over a memory store, a manual clock and sequential ids.
pub struct TestFixture {
    pub vault: Vault<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestFixture {
    /// Create a new test fixture with default configuration.
    pub fn new() -> Self {
        Self::with_config(VaultConfig::default())
    }

    /// Create with a specific configuration.
    pub fn with_config(config: VaultConfig) -> Self {
        let clock = Arc::new(ManualClock::new(FIXTURE_START));
        let vault = Vault::builder(MemoryStore::new(), MasterKey::from_bytes(FIXTURE_MASTER_KEY))
            .config(config)
            .clock(clock.clone())
            .ids(Arc::new(SequentialIds::new()))
            .build();

        Self { vault, clock }
    }

    /// Upload a small text file.
    pub async fn upload_text(&self, name: &str, body: &str) -> Result<FileRef> {
        let upload = self
            .vault
            .upload(body.as_bytes().to_vec(), name, "text/plain")
            .await?;
        Ok(upload.file_ref)
    }

    /// Upload a file and mint a link for it in one step.
    pub async fn shared(&self, body: &str, params: PolicyParams) -> Result<LinkId> {
        let file_ref = self.upload_text("shared.txt", body).await?;
        self.vault.create_link(&file_ref, params).await
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
