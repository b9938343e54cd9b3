//! Static knowledge merged into reports

mod conditions;

pub use conditions::ConditionCatalog;
