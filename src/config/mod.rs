//! Configuration types and loading.
//!
//! - `WorkConfig`: top-level configuration with validation
//! - `PipelineConfig`, `GenerationConfig`: interpretation and backend settings
//! - `BulkConfig`, `TurnConfig`, `StoreConfig`: execution settings

mod settings;

pub use settings::{
    BackendKind, BulkConfig, GenerationConfig, KindMultipliers, PipelineConfig, SizeBudgets,
    StoreConfig, TurnConfig, WorkConfig, WorkPaths,
};
