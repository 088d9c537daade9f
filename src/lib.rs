//! # raf-rs
//!
//! A Rust library for computing CMS Hierarchical Condition Category (HCC)
//! risk adjustment factors from claims and diagnosis data.
//!
//! Given ICD-10 diagnosis codes and beneficiary demographics, the library
//! produces a deterministic Risk Adjustment Factor (RAF) together with the
//! intermediate mappings and coefficients that justify it: which condition
//! categories each diagnosis mapped to, which survived hierarchical
//! suppression, which interactions fired, and which coefficient rows were
//! applied or found missing.
//!
//! Inputs arrive three ways, all converging on the same scoring stages:
//!
//! - raw X12 837 claim envelopes, parsed by [`parser::ClaimParser`]
//! - pre-normalized [`types::ServiceRecord`]s, e.g. from a FHIR EOB adapter
//! - bare diagnosis code lists
//!
//! All scoring state comes from the immutable CMS reference CSVs loaded
//! once by [`tables::ReferenceTables`] and shared read-only; a scoring call
//! is a pure function of `(inputs, tables, variant)` and calls are safely
//! parallelizable across beneficiaries.
//!
//! # Examples
//!
//! ```no_run
//! use raf_rs::{Demographics, ModelVariant, RafPipeline, ScoringOptions, Sex, TableConfig};
//!
//! let config = TableConfig::from_dir("reference/tables", 2026, ModelVariant::V28);
//! let pipeline = RafPipeline::new(ModelVariant::V28, &config, ScoringOptions::default())?;
//!
//! let mut demographics = Demographics::new(67, Sex::Female);
//! demographics.low_income = true;
//!
//! let result = pipeline.calculate_from_diagnosis(&["E11.9", "I10", "N18.3"], &demographics)?;
//! println!("RAF {:.3} via segment-level coefficients {:?}", result.risk_score, result.coefficients);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod filter;
pub mod parser;
pub mod scoring;
pub mod tables;
pub mod types;

// Re-export the primary surface for convenient access
pub use filter::ScoringOptions;
pub use scoring::{RafPipeline, ScoreError};
pub use tables::{ConfigError, ReferenceTables, TableConfig};
pub use types::{Demographics, DualStatus, ModelVariant, RafResult, ServiceRecord, Sex};
