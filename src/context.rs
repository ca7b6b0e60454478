use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cli::Config;
use crate::iface::types::{IfType, DEFAULT_POWERSAVE_MS};

/// Set from the signal task, observed by the command loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// 每次命令调用都会传入的运行时上下文
#[derive(Debug, Clone)]
pub struct Context {
    pub verbose: bool,
    pub privileged: bool,
    pub powersave_timeout_ms: u32,
    /// per-type MTU overrides keyed by type label
    pub mtu_defaults: BTreeMap<String, u32>,
    pub cancel: CancelToken,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            verbose: false,
            privileged: true,
            powersave_timeout_ms: DEFAULT_POWERSAVE_MS,
            mtu_defaults: BTreeMap::new(),
            cancel: CancelToken::new(),
        }
    }
}

impl Context {
    pub fn from_config(config: &Config, verbose: bool, privileged: bool, cancel: CancelToken) -> Self {
        Self {
            verbose: verbose || config.verbose,
            privileged,
            powersave_timeout_ms: config.powersave_timeout_ms,
            mtu_defaults: config.mtu_defaults.clone(),
            cancel,
        }
    }

    pub fn default_mtu(&self, if_type: IfType) -> u32 {
        self.mtu_defaults
            .get(if_type.label())
            .copied()
            .unwrap_or_else(|| if_type.default_mtu())
    }
}
