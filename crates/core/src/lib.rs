pub mod capture;
pub mod detection;
pub mod heuristics;
pub mod pipeline;
pub mod session;
pub mod shared;
