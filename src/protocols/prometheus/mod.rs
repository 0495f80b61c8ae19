//! The protocols for prometheus, defined here:
//! https://prometheus.io/docs/instrumenting/exposition_formats/

pub mod text;
