pub mod arena;
pub mod clip;
pub mod config;
pub mod control;
pub mod error;
pub mod geom;
pub mod obstructed;
pub mod obstruction;
pub mod output;
pub mod poly;
pub mod problem;
pub mod quadrature;
pub mod result;
pub mod settings;
pub mod transform;
pub mod unobstructed;
