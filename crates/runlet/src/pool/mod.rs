//! Pre-warmed per-language sandbox pools
//!
//! Long-lived isolated environments (by default docker containers) leased
//! per language and returned after use, amortizing environment start-up
//! cost. The pools are an independent subsystem: they are provisioned and
//! drained on their own, without coupling to the process lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum PoolError {
    /// The language has no pool at all (distinct from an empty pool, on
    /// which `lease` simply blocks)
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("failed to provision sandbox for {language}: {message}")]
    ProvisionFailed { language: String, message: String },

    #[error("pool is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to one long-lived isolated environment.
///
/// A handle is in exactly one place at a time: queued in its language's
/// pool, or leased to one session. It is never duplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxHandle {
    id: String,
    language: String,
}

impl SandboxHandle {
    pub(crate) fn new(id: String, language: String) -> Self {
        Self { id, language }
    }

    /// Environment identifier as reported by the provision command
    /// (e.g. a container id)
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

/// One language's FIFO of ready handles. The unbounded sender side takes
/// releases; leases drain the receiver behind a lock, preserving order and
/// blocking while the queue is empty.
#[derive(Debug)]
struct LanguagePool {
    image: String,
    tx: mpsc::UnboundedSender<SandboxHandle>,
    rx: Mutex<mpsc::UnboundedReceiver<SandboxHandle>>,
}

/// Per-language pools of pre-started sandboxes.
#[derive(Debug)]
pub struct SandboxPool {
    pools: HashMap<String, LanguagePool>,
    provision_command: Vec<String>,
}

impl SandboxPool {
    /// Create empty pools for every configured language that carries a
    /// sandbox image.
    pub fn new(config: &Config) -> Self {
        let pools = config
            .languages
            .iter()
            .filter_map(|(id, lang)| {
                lang.sandbox_image.as_ref().map(|image| {
                    let (tx, rx) = mpsc::unbounded_channel();
                    (
                        id.clone(),
                        LanguagePool {
                            image: image.clone(),
                            tx,
                            rx: Mutex::new(rx),
                        },
                    )
                })
            })
            .collect();

        Self {
            pools,
            provision_command: config.pool.provision_command.clone(),
        }
    }

    /// Pre-start sandboxes for every pooled language.
    ///
    /// Population is independent per language: provisioning runs in
    /// parallel with bounded concurrency under one overall timeout, and a
    /// slow or failing language is logged without holding up the others.
    #[instrument(skip(self, config))]
    pub async fn prewarm(self: &Arc<Self>, config: &Config) {
        let count = config.pool.prewarm_count;
        if count == 0 {
            debug!("pre-warming disabled");
            return;
        }

        let semaphore = Arc::new(Semaphore::new(config.pool.start_concurrency.max(1)));
        let mut tasks = tokio::task::JoinSet::new();

        for (language, pool) in &self.pools {
            for _ in 0..count {
                let semaphore = Arc::clone(&semaphore);
                let this = Arc::clone(self);
                let language = language.clone();
                let image = pool.image.clone();

                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };
                    match provision(&this.provision_command, &language, &image).await {
                        Ok(handle) => {
                            info!(language = %language, id = %handle.id(), "sandbox ready");
                            let _ = this.release(handle);
                        }
                        Err(e) => {
                            warn!(language = %language, error = %e, "sandbox provisioning failed");
                        }
                    }
                });
            }
        }

        let drained = tokio::time::timeout(config.pool.startup_timeout(), async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!("not all sandboxes started within the startup timeout");
            tasks.abort_all();
        }
    }

    /// Lease a handle for `language`, blocking until one is available.
    #[instrument(skip(self))]
    pub async fn lease(&self, language: &str) -> Result<SandboxHandle, PoolError> {
        let pool = self
            .pools
            .get(language)
            .ok_or_else(|| PoolError::UnsupportedLanguage(language.to_owned()))?;

        let mut rx = pool.rx.lock().await;
        let handle = rx.recv().await.ok_or(PoolError::Closed)?;
        debug!(id = %handle.id(), "leased sandbox");
        Ok(handle)
    }

    /// Return a handle to the back of its language's queue.
    ///
    /// Reused environments are handed out as-is, without validation or
    /// reset between leases.
    pub fn release(&self, handle: SandboxHandle) -> Result<(), PoolError> {
        let pool = self
            .pools
            .get(&handle.language)
            .ok_or_else(|| PoolError::UnsupportedLanguage(handle.language.clone()))?;

        debug!(id = %handle.id(), language = %handle.language, "released sandbox");
        pool.tx.send(handle).map_err(|_| PoolError::Closed)
    }

    /// Whether `language` has a pool at all.
    pub fn supports(&self, language: &str) -> bool {
        self.pools.contains_key(language)
    }

    /// Number of pooled languages.
    pub fn language_count(&self) -> usize {
        self.pools.len()
    }
}

/// Run the provision command for one sandbox; the handle id is the first
/// line of its stdout.
async fn provision(
    template: &[String],
    language: &str,
    image: &str,
) -> Result<SandboxHandle, PoolError> {
    let argv: Vec<String> = template
        .iter()
        .map(|arg| arg.replace("{image}", image))
        .collect();

    let Some((program, args)) = argv.split_first() else {
        return Err(PoolError::ProvisionFailed {
            language: language.to_owned(),
            message: "empty provision command".to_owned(),
        });
    };

    debug!(command = ?argv, "provisioning sandbox");

    let output = Command::new(program).args(args).output().await?;

    if !output.status.success() {
        return Err(PoolError::ProvisionFailed {
            language: language.to_owned(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let id = stdout.lines().next().unwrap_or("").trim().to_owned();
    if id.is_empty() {
        return Err(PoolError::ProvisionFailed {
            language: language.to_owned(),
            message: "provision command produced no handle id".to_owned(),
        });
    }

    Ok(SandboxHandle::new(id, language.to_owned()))
}
