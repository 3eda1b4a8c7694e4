// src/runtime/quota.rs
//! Per-session side-effect quotas
//!
//! Each quota class is a monotonic counter bounded by a static ceiling:
//! - File writes (ceiling 2: one visual and one audio artifact)
//! - Asset uploads (ceiling 20)
//!
//! Counters start at zero when the session is built and never go down.

use crate::exception::{ExceptionKey, ExceptionRecord};
use crate::observability::names;
use crate::protocol::message::DetailKey;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Side-effecting operation classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaClass {
    FileWrite,
    AssetUpload,
}

impl QuotaClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaClass::FileWrite => "file_write",
            QuotaClass::AssetUpload => "asset_upload",
        }
    }

    /// Key raised when the class is exhausted
    pub fn exhausted_key(&self) -> ExceptionKey {
        match self {
            QuotaClass::FileWrite => ExceptionKey::TooManyWrites,
            QuotaClass::AssetUpload => ExceptionKey::TooManyUploads,
        }
    }
}

/// Ceilings for every quota class
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaLimits {
    /// Maximum file writes per session
    pub file_writes: u32,

    /// Maximum asset uploads per session
    pub asset_uploads: u32,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            file_writes: 2,
            asset_uploads: 20,
        }
    }
}

impl QuotaLimits {
    /// Ceiling for one class
    pub fn ceiling(&self, class: QuotaClass) -> u32 {
        match class {
            QuotaClass::FileWrite => self.file_writes,
            QuotaClass::AssetUpload => self.asset_uploads,
        }
    }

    /// Validate quota limits
    pub fn validate(&self) -> Result<(), String> {
        if self.file_writes == 0 {
            return Err("File write quota cannot be 0".to_string());
        }
        if self.asset_uploads == 0 {
            return Err("Asset upload quota cannot be 0".to_string());
        }
        if self.file_writes > 100 {
            return Err("File write quota cannot exceed 100".to_string());
        }
        if self.asset_uploads > 1000 {
            return Err("Asset upload quota cannot exceed 1000".to_string());
        }
        Ok(())
    }
}

/// One bounded counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceQuota {
    counter: u32,
    ceiling: u32,
}

impl ResourceQuota {
    pub fn new(ceiling: u32) -> Self {
        Self { counter: 0, ceiling }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn remaining(&self) -> u32 {
        self.ceiling.saturating_sub(self.counter)
    }
}

/// Session-owned quota counters
///
/// Hosted programs may be multi-threaded, so check-and-increment happens
/// under one lock per class.
#[derive(Debug)]
pub struct ResourceQuotaGuard {
    file_writes: Mutex<ResourceQuota>,
    asset_uploads: Mutex<ResourceQuota>,
}

impl ResourceQuotaGuard {
    pub fn new(limits: &QuotaLimits) -> Self {
        Self {
            file_writes: Mutex::new(ResourceQuota::new(limits.file_writes)),
            asset_uploads: Mutex::new(ResourceQuota::new(limits.asset_uploads)),
        }
    }

    fn slot(&self, class: QuotaClass) -> &Mutex<ResourceQuota> {
        match class {
            QuotaClass::FileWrite => &self.file_writes,
            QuotaClass::AssetUpload => &self.asset_uploads,
        }
    }

    /// Consume one unit of `class`
    ///
    /// Returns the new counter value. When the ceiling is reached the
    /// counter is left untouched and a user-initiated error is returned.
    pub fn try_consume(&self, class: QuotaClass) -> Result<u32, ExceptionRecord> {
        let mut quota = self.slot(class).lock();

        if quota.counter >= quota.ceiling {
            metrics::counter!(names::QUOTA_REJECTIONS, "quota" => class.as_str())
                .increment(1);
            return Err(ExceptionRecord::user(class.exhausted_key())
                .with_fallback(format!(
                    "Limit of {} reached for this session.",
                    quota.ceiling
                ))
                .with_detail(DetailKey::Status, format!("{}/{}", quota.counter, quota.ceiling)));
        }

        quota.counter += 1;
        debug!(quota = class.as_str(), used = quota.counter, ceiling = quota.ceiling, "quota consumed");
        Ok(quota.counter)
    }

    /// Current state of one class
    pub fn snapshot(&self, class: QuotaClass) -> ResourceQuota {
        *self.slot(class).lock()
    }
}

impl Default for ResourceQuotaGuard {
    fn default() -> Self {
        Self::new(&QuotaLimits::default())
    }
}
