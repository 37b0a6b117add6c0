//! Risk and formula engine for perpline.
//!
//! - `formula`: pure leveraged-perpetual math over `Decimal`
//! - `constraints`: per-pair order limits, all violations reported at once
//! - `cooldown`: per-account trade cooldown (in memory)
//! - `engine`: order preparation into microunit transaction parameters
//! - `position`: snapshot derivation from raw position rows

pub mod config;
pub mod constraints;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod formula;
pub mod position;

pub use config::RiskConfig;
pub use constraints::{ConstraintTable, ConstraintViolation, MarketConstraints};
pub use cooldown::{TradeCooldown, DEFAULT_COOLDOWN_MS};
pub use engine::{EntryEstimate, PositionHealth, RiskEngine};
pub use error::{FormulaError, FormulaResult, RiskError, RiskResult};
pub use position::derive_snapshot;
