//! # Calibra Core Library
//!
//! Estimate calibration for a project/task tracker. Given a snapshot of an
//! organization's historical tasks, the engine learns how far each person's
//! estimates drift from the time actually spent, per global, project, stage
//! and tag context, and uses that bias to adjust new estimates, gate risky
//! done-transitions and report portfolio-level estimate inflation.
//!
//! ## Architecture
//!
//! - **Calibration**: profile computation, adjustment blending, approval
//!   policy and portfolio reporting, all pure over a profile repository
//! - **Storage**: profile repositories (in-memory, SQLite, JSON document) and
//!   TOML-based configuration
//! - **Task**: the read-only task record model consumed from the task store
//!
//! ## Key Components
//!
//! - [`CalibrationService`]: entry point for the task workflow and reporting
//! - [`ProfileComputer`]: task snapshot to bias profiles
//! - [`ProfileRepository`]: wholesale-replace profile persistence
//! - [`Config`]: application configuration management

pub mod calibration;
pub mod error;
pub mod storage;
pub mod task;

pub use calibration::{
    AdjustmentEngine, AdjustmentPreview, ApprovalGate, BiasProfile, CalibrationService,
    CalibrationSettings, Clock, Confidence, ContextType, FixedClock, ProfileComputer, RiskRow,
    SystemClock, WindowOrder,
};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use storage::{
    Config, MemoryProfileStore, ProfileDb, ProfileFile, ProfileRepository, StorageBackend,
    Versioned,
};
pub use task::{EstimateContext, Project, TaskRecord};
