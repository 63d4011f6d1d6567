//! Live recognition of a camera-captured battle screen: latest-frame capture,
//! temporally masked OCR of fixed regions, and dHash identification of the
//! six team icons.

pub mod artifacts;
pub mod capture;
pub mod config;
pub mod display;
pub mod error;
pub mod icon;
pub mod pipeline;
pub mod reference;
pub mod region;
pub mod temporal;
pub mod text;
pub mod type_chart;
