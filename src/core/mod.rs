// Core modules: item encoding, outcome correlation, failure taxonomy, and error modeling.
pub mod correlate;
pub mod encode;
pub mod error;
pub mod item;
pub mod outcome;
pub mod result;
pub mod taxonomy;
