pub mod ct_eq;

pub use ct_eq::ct_eq;
