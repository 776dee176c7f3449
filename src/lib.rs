#![doc = "seer-pas-sdk: client SDK for the Seer Proteograph Analysis Suite."]

//! This crate wraps the PAS REST API: session handling with tenant
//! switching, plates, projects, samples, MS data files, analyses, and
//! group-analysis statistics with the derived plot data.
//!
//! # Usage
//! Log in with [`SeerClient::login`] (or [`SeerClient::from_env`]) and
//! call the per-area methods on the client. Tabular results come back as
//! [`table::Table`]; everything else is typed in [`model`].

pub mod auth;
pub mod client;
pub mod common;
pub mod error;
pub mod model;
pub mod platemap;
pub mod storage;
pub mod table;
pub mod transfer;
pub mod volcano;

pub use auth::MfaChallenge;
pub use client::{
    AnalysisQuery, AnalysisSearch, AnalyteType, GroupAnalysisPlots, GroupAnalysisQuery,
    PlateMapFile, Rollup, SampleFilter, SampleQuery, SeerClient, StatTest,
};
pub use error::{Error, Result};
pub use platemap::PlateMap;
pub use table::Table;
pub use volcano::{LabelBy, VolcanoPlotBuilder, VolcanoPlotSettings, VolcanoPoint};
